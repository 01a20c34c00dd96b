use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use tarefas_shared::Visual;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

const VISUALS_FILE: &str = "category_visuals.json";

/// `(label, value)` pairs a category color may take.
pub const AVAILABLE_COLORS: &[(&str, &str)] = &[
    ("Blue", "bg-blue-500"),
    ("Green", "bg-green-500"),
    ("Purple", "bg-purple-500"),
    ("Red", "bg-red-500"),
    ("Yellow", "bg-yellow-500"),
    ("Pink", "bg-pink-500"),
    ("Indigo", "bg-indigo-500"),
    ("Orange", "bg-orange-500"),
    ("Cyan", "bg-cyan-500"),
    ("Lime", "bg-lime-500"),
];

pub const AVAILABLE_ICONS: &[(&str, &str)] = &[
    ("Work", "Briefcase"),
    ("Personal", "User"),
    ("Shopping", "ShoppingBag"),
    ("Health", "Heart"),
    ("Education", "BookOpen"),
    ("Home", "Home"),
    ("Travel", "Plane"),
    ("Finance", "DollarSign"),
    ("Leisure", "Music"),
    ("Sport", "Dumbbell"),
    ("Food", "Utensils"),
    ("Technology", "Smartphone"),
];

const DEFAULT_VISUALS: &[(&str, &str, &str)] = &[
    ("work", "bg-blue-500", "Briefcase"),
    ("personal", "bg-green-500", "User"),
    ("shopping", "bg-purple-500", "ShoppingBag"),
    ("health", "bg-red-500", "Heart"),
    ("education", "bg-yellow-500", "BookOpen"),
];

fn default_map() -> BTreeMap<String, Visual> {
    DEFAULT_VISUALS
        .iter()
        .map(|(id, color, icon)| {
            (
                id.to_string(),
                Visual {
                    color: color.to_string(),
                    icon: icon.to_string(),
                },
            )
        })
        .collect()
}

fn random_visual() -> Visual {
    let mut rng = rand::rng();
    let color = AVAILABLE_COLORS
        .choose(&mut rng)
        .map(|(_, value)| *value)
        .unwrap_or("bg-blue-500");
    let icon = AVAILABLE_ICONS
        .choose(&mut rng)
        .map(|(_, value)| *value)
        .unwrap_or("Briefcase");
    Visual {
        color: color.to_string(),
        icon: icon.to_string(),
    }
}

pub fn is_known_color(color: &str) -> bool {
    AVAILABLE_COLORS.iter().any(|(_, value)| *value == color)
}

pub fn is_known_icon(icon: &str) -> bool {
    AVAILABLE_ICONS.iter().any(|(_, value)| *value == icon)
}

/// Color/icon pairing per category id. Client-owned, never sent to the API.
#[derive(Debug)]
pub struct VisualStore {
    path: Option<PathBuf>,
    map: Mutex<BTreeMap<String, Visual>>,
}

impl VisualStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            map: Mutex::new(default_map()),
        }
    }

    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(VISUALS_FILE);
        let mut map = default_map();

        match fs::read_to_string(&path) {
            Ok(raw) if !raw.trim().is_empty() => {
                match serde_json::from_str::<BTreeMap<String, Visual>>(&raw) {
                    Ok(stored) => {
                        debug!(file = %path.display(), count = stored.len(), "loaded category visuals");
                        map.extend(stored);
                    }
                    Err(err) => {
                        error!(file = %path.display(), error = %err, "failed parsing category visuals; using defaults");
                    }
                }
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                error!(file = %path.display(), error = %err, "failed reading category visuals; using defaults");
            }
        }

        Self {
            path: Some(path),
            map: Mutex::new(map),
        }
    }

    /// Returns the pairing for `category_id`, generating and persisting a
    /// random one the first time an unknown id is seen.
    pub fn get(&self, category_id: &str) -> Visual {
        let mut map = self.map.lock();
        if let Some(visual) = map.get(category_id) {
            return visual.clone();
        }

        let visual = random_visual();
        info!(category = category_id, color = %visual.color, icon = %visual.icon, "assigned category visual");
        map.insert(category_id.to_string(), visual.clone());
        self.persist(&map);
        visual
    }

    pub fn set(&self, category_id: &str, color: &str, icon: &str) -> Result<Visual> {
        if !is_known_color(color) {
            return Err(Error::Validation(format!("unknown color: {color}")));
        }
        if !is_known_icon(icon) {
            return Err(Error::Validation(format!("unknown icon: {icon}")));
        }

        let visual = Visual {
            color: color.to_string(),
            icon: icon.to_string(),
        };
        let mut map = self.map.lock();
        map.insert(category_id.to_string(), visual.clone());
        self.persist(&map);
        Ok(visual)
    }

    pub fn contains(&self, category_id: &str) -> bool {
        self.map.lock().contains_key(category_id)
    }

    pub fn remove(&self, category_id: &str) {
        let mut map = self.map.lock();
        if map.remove(category_id).is_some() {
            self.persist(&map);
        }
    }

    fn persist(&self, map: &BTreeMap<String, Visual>) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(err) = save_json_atomic(path, map) {
            error!(file = %path.display(), error = %err, "failed saving category visuals");
        }
    }
}

fn save_json_atomic(path: &Path, map: &BTreeMap<String, Visual>) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, map)?;
    temp.flush()?;
    temp.persist(path)
        .map_err(|err| Error::Storage(format!("failed to persist {}: {}", path.display(), err)))?;
    Ok(())
}
