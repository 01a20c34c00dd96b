use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tarefas_shared::{Category, CategoryCreate, CategoryRename, Visual};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::cache::LocalCache;
use crate::error::{Error, Result};
use crate::notify::{report_failure, report_success};
use crate::transport::{ApiClient, Body, Method};
use crate::visuals::VisualStore;

type FetchFuture = Shared<BoxFuture<'static, Result<Vec<Category>>>>;

struct Inner {
    api: ApiClient,
    visuals: Arc<VisualStore>,
    cache: Mutex<LocalCache>,
    in_flight: Mutex<Option<FetchFuture>>,
}

/// Categories with their nested tasks, backed by the remote API and held in
/// a [`LocalCache`]. Cloning hands out another handle to the same store.
#[derive(Clone)]
pub struct CategoryStore {
    inner: Arc<Inner>,
}

impl CategoryStore {
    pub fn new(api: ApiClient, visuals: Arc<VisualStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                visuals,
                cache: Mutex::new(LocalCache::default()),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub(crate) fn cache(&self) -> &Mutex<LocalCache> {
        &self.inner.cache
    }

    pub fn visuals(&self) -> &VisualStore {
        &self.inner.visuals
    }

    pub fn is_cached(&self) -> bool {
        self.inner.cache.lock().is_populated()
    }

    /// Drops the working set so the next read goes to the server.
    pub fn invalidate(&self) {
        self.inner.cache.lock().invalidate();
    }

    /// Fetches every category with its tasks in one round-trip and replaces
    /// the cache with the result. Callers arriving while a fetch is running
    /// share its outcome instead of issuing another request.
    pub async fn fetch_all_with_tasks(&self) -> Result<Vec<Category>> {
        let fetch = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(running) => {
                    debug!("joining in-flight category fetch");
                    running.clone()
                }
                None => {
                    let started = fetch_remote(self.inner.clone()).boxed().shared();
                    *slot = Some(started.clone());
                    started
                }
            }
        };
        fetch.await
    }

    pub async fn ensure_loaded(&self) -> Result<()> {
        if self.is_cached() {
            return Ok(());
        }
        self.fetch_all_with_tasks().await.map(|_| ())
    }

    /// Cached categories, fetching first when the cache is empty.
    pub async fn all(&self) -> Result<Vec<Category>> {
        self.ensure_loaded().await?;
        Ok(self.inner.cache.lock().categories().to_vec())
    }

    pub async fn get(&self, id: &str) -> Result<Category> {
        self.ensure_loaded().await?;
        self.inner
            .cache
            .lock()
            .category(id)
            .cloned()
            .ok_or_else(|| Error::category_not_found(id))
    }

    /// Creates a category under a client-generated id. The working set is
    /// loaded first so the id can dodge existing ones; afterwards the cache
    /// is invalidated rather than patched and the next read refetches.
    #[instrument(skip(self, visual))]
    pub async fn add(&self, name: &str, visual: Option<Visual>) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("category name cannot be empty".to_string()));
        }
        if let Some(visual) = visual.as_ref() {
            validate_visual(visual)?;
        }

        self.ensure_loaded().await?;
        let id = {
            let cache = self.inner.cache.lock();
            unique_category_id(name, |candidate| cache.contains_category(candidate))
        };
        let body = Body::json(&CategoryCreate {
            id: id.clone(),
            name: name.to_string(),
        })?;

        let payload = match self.inner.api.call("/categories", Method::Post, Some(body), false).await {
            Ok(payload) => payload,
            Err(err) => {
                report_failure(self.inner.api.notifier().as_ref(), "Failed to add category", &err);
                return Err(err);
            }
        };

        let category = decode_category(payload).unwrap_or_else(|| Category {
            id: id.clone(),
            name: name.to_string(),
            created_at: Utc::now(),
            owner: String::new(),
            tasks: Vec::new(),
        });

        self.invalidate();
        report_success(self.inner.api.notifier().as_ref(), "Category added", category.name.clone());

        match visual {
            Some(visual) => {
                self.inner.visuals.set(&category.id, &visual.color, &visual.icon)?;
            }
            None => {
                self.inner.visuals.get(&category.id);
            }
        }

        info!(id = %category.id, "category created");
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn update(&self, id: &str, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("category name cannot be empty".to_string()));
        }

        let body = Body::json(&CategoryRename {
            name: name.to_string(),
        })?;
        let endpoint = format!("/categories/{id}");
        let payload = match self.inner.api.call(&endpoint, Method::Put, Some(body), false).await {
            Ok(payload) => payload,
            Err(err) => {
                report_failure(self.inner.api.notifier().as_ref(), "Failed to update category", &err);
                return Err(err);
            }
        };

        if let Some(renamed) = self.inner.cache.lock().rename_category(id, name) {
            return Ok(renamed);
        }

        decode_category(payload).ok_or_else(|| Error::category_not_found(id))
    }

    /// Deletes a category. `Ok(true)` when the entry was in the working set,
    /// `Ok(false)` when the server confirmed an id the last fetch did not
    /// return. Member tasks leave the cache with their category.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.ensure_loaded().await?;
        let endpoint = format!("/categories/{id}");
        if let Err(err) = self.inner.api.call(&endpoint, Method::Delete, None, false).await {
            report_failure(self.inner.api.notifier().as_ref(), "Failed to delete category", &err);
            return Err(err);
        }

        let removed = self.inner.cache.lock().remove_category(id);
        self.inner.visuals.remove(id);
        if let Some(category) = removed.as_ref() {
            info!(id, orphaned = category.tasks.len(), "category deleted");
        }
        Ok(removed.is_some())
    }
}

async fn fetch_remote(inner: Arc<Inner>) -> Result<Vec<Category>> {
    debug!("fetching categories with tasks");
    let result = inner
        .api
        .call_as::<Vec<Category>>("/categories_with_todos", Method::Get, None, false)
        .await;

    let outcome = match result {
        Ok(categories) => {
            inner.cache.lock().replace(categories.clone());
            Ok(categories)
        }
        Err(err) => {
            report_failure(inner.api.notifier().as_ref(), "Failed to load categories", &err);
            Err(err)
        }
    };

    inner.in_flight.lock().take();
    outcome
}

fn decode_category(payload: Value) -> Option<Category> {
    if !payload.is_object() {
        return None;
    }
    serde_json::from_value(payload).ok()
}

fn validate_visual(visual: &Visual) -> Result<()> {
    if !crate::visuals::is_known_color(&visual.color) {
        return Err(Error::Validation(format!("unknown color: {}", visual.color)));
    }
    if !crate::visuals::is_known_icon(&visual.icon) {
        return Err(Error::Validation(format!("unknown icon: {}", visual.icon)));
    }
    Ok(())
}

/// Lower-case ASCII slug of `name`: accents transliterated, punctuation
/// dropped, whitespace runs collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode::deunicode(name).to_lowercase();
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for ch in ascii.chars() {
        if ch.is_whitespace() {
            pending_dash = !slug.is_empty();
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash {
                slug.push('-');
                pending_dash = false;
            }
            slug.push(ch);
        }
    }

    slug
}

fn unique_category_id(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let base = slugify(name);
    if base.is_empty() {
        return Uuid::new_v4().to_string();
    }
    if !taken(&base) {
        return base;
    }

    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
