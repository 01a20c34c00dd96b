use std::collections::HashSet;

use tarefas_shared::{Category, Task};
use tracing::{debug, warn};

/// Where a task sat inside the cache, enough to put it back exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSlot {
    pub category_id: String,
    pub position: usize,
    pub task: Task,
}

/// Working set of categories with their nested tasks, mirroring the last
/// known server state. Owned by the category store.
#[derive(Debug, Default, Clone)]
pub struct LocalCache {
    categories: Vec<Category>,
    populated: bool,
}

impl LocalCache {
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Installs a fresh fetch result. Wholesale replacement, never a merge.
    pub fn replace(&mut self, mut categories: Vec<Category>) {
        let mut seen = HashSet::new();
        for category in &mut categories {
            let before = category.tasks.len();
            category.tasks.retain(|task| seen.insert(task.id.clone()));
            if category.tasks.len() != before {
                warn!(
                    category = %category.id,
                    dropped = before - category.tasks.len(),
                    "dropped tasks already listed under another category"
                );
            }
        }
        debug!(count = categories.len(), "cache replaced");
        self.categories = categories;
        self.populated = true;
    }

    pub fn invalidate(&mut self) {
        debug!("cache invalidated");
        self.categories.clear();
        self.populated = false;
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn contains_category(&self, id: &str) -> bool {
        self.category(id).is_some()
    }

    pub fn rename_category(&mut self, id: &str, name: &str) -> Option<Category> {
        let category = self.categories.iter_mut().find(|c| c.id == id)?;
        category.name = name.to_string();
        Some(category.clone())
    }

    pub fn remove_category(&mut self, id: &str) -> Option<Category> {
        let idx = self.categories.iter().position(|c| c.id == id)?;
        Some(self.categories.remove(idx))
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        self.categories
            .iter()
            .flat_map(|c| c.tasks.iter().cloned())
            .collect()
    }

    /// Tasks of one category. Entries whose `category_id` disagrees with
    /// their parent are left out.
    pub fn tasks_in(&self, category_id: &str) -> Vec<Task> {
        self.category(category_id)
            .map(|c| {
                c.tasks
                    .iter()
                    .filter(|t| t.category_id == category_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find_task(&self, id: &str) -> Option<TaskSlot> {
        self.categories.iter().find_map(|category| {
            category
                .tasks
                .iter()
                .position(|t| t.id == id)
                .map(|position| TaskSlot {
                    category_id: category.id.clone(),
                    position,
                    task: category.tasks[position].clone(),
                })
        })
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.find_task(id).map(|slot| slot.task)
    }

    /// Appends to the owning category. Returns false when that category is
    /// not cached.
    pub fn append_task(&mut self, task: Task) -> bool {
        let Some(category) = self.categories.iter_mut().find(|c| c.id == task.category_id) else {
            return false;
        };
        category.tasks.retain(|t| t.id != task.id);
        category.tasks.push(task);
        true
    }

    /// Writes `task` over its cached copy. A changed `category_id` moves the
    /// task to the end of the new category's list.
    pub fn put_task(&mut self, task: Task) -> bool {
        match self.find_task(&task.id) {
            Some(slot) if slot.category_id == task.category_id => {
                if let Some(category) = self.categories.iter_mut().find(|c| c.id == slot.category_id) {
                    category.tasks[slot.position] = task;
                }
                true
            }
            Some(slot) => {
                self.drop_at(&slot);
                self.append_task(task)
            }
            None => self.append_task(task),
        }
    }

    /// Removes every listed id present in the cache and returns the slots
    /// they occupied, positions as they were before any removal.
    pub fn remove_tasks(&mut self, ids: &[String]) -> Vec<TaskSlot> {
        let slots: Vec<TaskSlot> = ids.iter().filter_map(|id| self.find_task(id)).collect();
        let doomed: HashSet<&str> = slots.iter().map(|s| s.task.id.as_str()).collect();
        for category in &mut self.categories {
            category.tasks.retain(|t| !doomed.contains(t.id.as_str()));
        }
        slots
    }

    /// Puts tasks back where [`remove_tasks`](Self::remove_tasks) or
    /// [`find_task`](Self::find_task) saw them.
    pub fn restore(&mut self, mut slots: Vec<TaskSlot>) {
        slots.sort_by_key(|s| s.position);
        for slot in slots {
            if let Some(current) = self.find_task(&slot.task.id) {
                self.drop_at(&current);
            }
            let Some(category) = self.categories.iter_mut().find(|c| c.id == slot.category_id) else {
                warn!(category = %slot.category_id, task = %slot.task.id, "cannot restore task into missing category");
                continue;
            };
            let at = slot.position.min(category.tasks.len());
            category.tasks.insert(at, slot.task);
        }
    }

    fn drop_at(&mut self, slot: &TaskSlot) {
        if let Some(category) = self.categories.iter_mut().find(|c| c.id == slot.category_id) {
            category.tasks.retain(|t| t.id != slot.task.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn task(id: &str, category: &str) -> Task {
        Task {
            id: id.to_string(),
            content: format!("task {id}"),
            completed: false,
            category_id: category.to_string(),
            created_at: Utc::now(),
            owner: "demo".to_string(),
        }
    }

    fn category(id: &str, tasks: Vec<Task>) -> Category {
        Category {
            id: id.to_string(),
            name: id.to_uppercase(),
            created_at: Utc::now(),
            owner: "demo".to_string(),
            tasks,
        }
    }

    fn seeded() -> LocalCache {
        let mut cache = LocalCache::default();
        cache.replace(vec![
            category("work", vec![task("1", "work"), task("2", "work"), task("3", "work")]),
            category("home", vec![task("4", "home")]),
        ]);
        cache
    }

    #[test]
    fn replace_drops_duplicate_task_ids() {
        let mut cache = LocalCache::default();
        cache.replace(vec![
            category("work", vec![task("1", "work")]),
            category("home", vec![task("1", "work"), task("2", "home")]),
        ]);

        assert_eq!(cache.all_tasks().len(), 2);
        assert_eq!(cache.find_task("1").map(|s| s.category_id), Some("work".to_string()));
    }

    #[test]
    fn moving_a_task_keeps_it_in_exactly_one_category() {
        let mut cache = seeded();
        let mut moved = task("2", "home");
        moved.content = "moved".to_string();

        assert!(cache.put_task(moved));

        assert_eq!(cache.tasks_in("work").len(), 2);
        let home = cache.tasks_in("home");
        assert_eq!(home.len(), 2);
        assert_eq!(home[1].content, "moved");
    }

    #[test]
    fn removal_then_restore_returns_original_order() {
        let mut cache = seeded();
        let before = cache.categories().to_vec();

        let slots = cache.remove_tasks(&["3".to_string(), "1".to_string(), "4".to_string(), "nope".to_string()]);
        assert_eq!(slots.len(), 3);
        assert_eq!(cache.all_tasks().len(), 1);

        cache.restore(slots);
        assert_eq!(cache.categories(), before.as_slice());
    }

    #[test]
    fn tasks_in_filters_mismatched_category_ids() {
        let mut cache = LocalCache::default();
        cache.replace(vec![category("work", vec![task("1", "work"), task("2", "gone")])]);

        let tasks = cache.tasks_in("work");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "1");
    }

    #[test]
    fn invalidate_empties_and_marks_unpopulated() {
        let mut cache = seeded();
        cache.invalidate();

        assert!(!cache.is_populated());
        assert!(cache.categories().is_empty());
    }
}
