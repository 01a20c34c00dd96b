use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::Local;
use tarefas_shared::{Category, Task, User, Visual};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::notify::{Level, Notification, SessionEvent};
use crate::visuals::VisualStore;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, categories, visuals))]
    pub fn print_categories(&self, categories: &[Category], visuals: &VisualStore) -> anyhow::Result<()> {
        self.write_categories(io::stdout().lock(), categories, visuals)
    }

    fn write_categories<W: Write>(
        &self,
        out: W,
        categories: &[Category],
        visuals: &VisualStore,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Icon".to_string(),
            "Done".to_string(),
            "Tasks".to_string(),
        ];

        let rows = categories
            .iter()
            .map(|category| {
                let visual = visuals.get(&category.id);
                let done = category.tasks.iter().filter(|t| t.completed).count();
                vec![
                    self.paint(&category.id, "33"),
                    self.paint(&category.name, ansi_for(&visual)),
                    visual.icon,
                    done.to_string(),
                    category.tasks.len().to_string(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    /// `names` maps category ids to display names; unknown ids print as-is.
    #[tracing::instrument(skip(self, tasks, names))]
    pub fn print_task_table(&self, tasks: &[Task], names: &HashMap<String, String>) -> anyhow::Result<()> {
        self.write_task_table(io::stdout().lock(), tasks, names)
    }

    fn write_task_table<W: Write>(
        &self,
        out: W,
        tasks: &[Task],
        names: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            " ".to_string(),
            "Category".to_string(),
            "Created".to_string(),
            "Content".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let mark = if task.completed {
                    self.paint("x", "32")
                } else {
                    " ".to_string()
                };
                let category = names
                    .get(&task.category_id)
                    .cloned()
                    .unwrap_or_else(|| task.category_id.clone());
                let content = if task.completed {
                    self.paint(&task.content, "2")
                } else {
                    task.content.clone()
                };
                vec![
                    self.paint(&task.id, "33"),
                    mark,
                    category,
                    task.created_at.with_timezone(&Local).format("%Y-%m-%d").to_string(),
                    content,
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "content   {}", task.content)?;
        writeln!(out, "category  {}", task.category_id)?;
        writeln!(out, "completed {}", if task.completed { "yes" } else { "no" })?;
        writeln!(out, "created   {}", task.created_at.format("%Y-%m-%dT%H:%M:%SZ"))?;
        Ok(())
    }

    pub fn print_user(&self, user: &User) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "username  {}", user.username)?;
        if let Some(name) = user.name.as_deref() {
            writeln!(out, "name      {name}")?;
        }
        if let Some(email) = user.email.as_deref() {
            writeln!(out, "email     {email}")?;
        }
        Ok(())
    }

    pub fn print_visual(&self, category_id: &str, visual: &Visual) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{}  color={} icon={}",
            self.paint(category_id, ansi_for(visual)),
            visual.color,
            visual.icon
        )?;
        Ok(())
    }

    /// Notifications go to stderr so table output stays pipeable.
    pub fn print_notifications(&self, notifications: &[Notification], events: &[SessionEvent]) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        for notification in notifications {
            let title = match notification.level {
                Level::Info => notification.title.clone(),
                Level::Error => self.paint(&notification.title, "31"),
            };
            if notification.description.is_empty() {
                writeln!(err, "{title}")?;
            } else {
                writeln!(err, "{title}: {}", notification.description)?;
            }
        }
        for event in events {
            match event {
                SessionEvent::Expired => writeln!(err, "session expired; run `tarefas login` again")?,
            }
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn ansi_for(visual: &Visual) -> &'static str {
    match visual.color.as_str() {
        "bg-blue-500" | "bg-indigo-500" => "34",
        "bg-green-500" | "bg-lime-500" => "32",
        "bg-purple-500" | "bg-pink-500" => "35",
        "bg-red-500" => "31",
        "bg-yellow-500" | "bg-orange-500" => "33",
        "bg-cyan-500" => "36",
        _ => "0",
    }
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| UnicodeWidthStr::width(h.as_str())).collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let line = |cells: Vec<String>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
            })
            .collect();
        padded.join(" ").trim_end().to_string()
    };

    writeln!(writer, "{}", line(headers))?;
    writeln!(
        writer,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join(" ")
    )?;
    for row in rows {
        writeln!(writer, "{}", line(row))?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
