use chrono::Utc;
use serde_json::Value;
use tarefas_shared::{DeleteTasksRequest, NewTask, Task, TaskCreate, TaskPatch};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::cache::TaskSlot;
use crate::category_store::CategoryStore;
use crate::error::{Error, Result};
use crate::notify::{report_failure, report_success};
use crate::optimistic::{Change, Coordinator, OptimisticTarget};
use crate::transport::{Body, Method};

/// Task operations over the category store's cache. Creation and plain
/// updates wait for the server; toggling and [`discard`](Self::discard)
/// go through the optimistic coordinator.
#[derive(Clone)]
pub struct TaskStore {
    categories: CategoryStore,
    coordinator: Coordinator,
}

impl TaskStore {
    pub fn new(categories: CategoryStore) -> Self {
        let coordinator = Coordinator::new(categories.api().notifier().clone());
        Self {
            categories,
            coordinator,
        }
    }

    pub fn categories(&self) -> &CategoryStore {
        &self.categories
    }

    pub async fn get_all(&self) -> Result<Vec<Task>> {
        self.categories.ensure_loaded().await?;
        Ok(self.categories.cache().lock().all_tasks())
    }

    /// Tasks whose `category_id` equals `category_id`. Unknown ids yield an
    /// empty list.
    pub async fn get_by_category(&self, category_id: &str) -> Result<Vec<Task>> {
        self.categories.ensure_loaded().await?;
        Ok(self.categories.cache().lock().tasks_in(category_id))
    }

    pub async fn get(&self, id: &str) -> Result<Task> {
        self.categories.ensure_loaded().await?;
        self.cached(id)
    }

    fn cached(&self, id: &str) -> Result<Task> {
        self.categories
            .cache()
            .lock()
            .task(id)
            .ok_or_else(|| Error::task_not_found(id))
    }

    /// Creates a task. Nothing is shown before the server accepts it; a
    /// failure leaves the cache untouched.
    #[instrument(skip(self, create), fields(category = %create.category_id))]
    pub async fn add(&self, create: TaskCreate) -> Result<Task> {
        let content = create.content.trim();
        if content.is_empty() {
            return Err(Error::Validation("task content cannot be empty".to_string()));
        }

        self.categories.ensure_loaded().await?;
        let owner = self
            .categories
            .cache()
            .lock()
            .category(&create.category_id)
            .map(|c| c.owner.clone())
            .ok_or_else(|| Error::category_not_found(&create.category_id))?;

        let task = Task {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            completed: create.completed,
            category_id: create.category_id.clone(),
            created_at: Utc::now(),
            owner,
        };

        let body = Body::json(&NewTask::from(&task))?;
        let payload = match self.categories.api().call("/todos", Method::Post, Some(body), false).await {
            Ok(payload) => payload,
            Err(err) => {
                report_failure(self.notifier(), "Failed to add task", &err);
                return Err(err);
            }
        };

        let created = merge_task(&task, &payload).unwrap_or(task);
        if !self.categories.cache().lock().append_task(created.clone()) {
            debug!(id = %created.id, "owning category not cached; next fetch will include task");
        }
        report_success(self.notifier(), "Task added", created.content.clone());
        info!(id = %created.id, "task created");
        Ok(created)
    }

    /// Sends a partial update and merges it into the cached task once the
    /// server accepts it.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        if patch.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(Error::Validation("task content cannot be empty".to_string()));
        }
        self.categories.ensure_loaded().await?;
        if patch.is_empty() {
            return self.cached(id);
        }
        if let Some(category_id) = patch.category_id.as_deref()
            && !self.categories.cache().lock().contains_category(category_id)
        {
            return Err(Error::category_not_found(category_id));
        }

        let payload = match self.send_update(id, &patch).await {
            Ok(payload) => payload,
            Err(err) => {
                report_failure(self.notifier(), "Failed to update task", &err);
                return Err(err);
            }
        };

        let mut cache = self.categories.cache().lock();
        let merged = match cache.task(id) {
            Some(mut current) => {
                patch.apply_to(&mut current);
                merge_task(&current, &payload).unwrap_or(current)
            }
            None => serde_json::from_value::<Task>(payload).map_err(|_| Error::task_not_found(id))?,
        };
        cache.put_task(merged.clone());
        Ok(merged)
    }

    /// Flips `completed`, showing the new value before the server answers
    /// and restoring the old one if it refuses. `NotFound` means the cache
    /// is stale; refetch and retry.
    #[instrument(skip(self))]
    pub async fn toggle_completed(&self, id: &str) -> Result<Task> {
        self.categories.ensure_loaded().await?;
        let mut next = self.cached(id)?;
        next.completed = !next.completed;

        let patch = TaskPatch::completed(next.completed);
        let base = next.clone();
        let request = async {
            let payload = self.send_update(id, &patch).await?;
            Ok::<_, Error>(merge_task(&base, &payload))
        };

        match self
            .coordinator
            .run(self, Change::Replace(next.clone()), request, "Failed to update task status")
            .await?
        {
            Some(confirmed) => Ok(confirmed),
            None => Ok(next),
        }
    }

    /// Removes one task once the server confirms. Ids missing from the
    /// cache fail with `NotFound` without a request.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.delete_many(&[id.to_string()]).await
    }

    /// Bulk delete; the cache changes only after server confirmation, so a
    /// failure removes nothing.
    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn delete_many(&self, ids: &[String]) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        self.categories.ensure_loaded().await?;
        self.require_cached(ids)?;

        if let Err(err) = self.send_delete(ids).await {
            report_failure(self.notifier(), "Failed to delete tasks", &err);
            return Err(err);
        }

        let removed = self.categories.cache().lock().remove_tasks(ids);
        report_success(self.notifier(), "Tasks deleted", format!("{} task(s) removed", removed.len()));
        info!(removed = removed.len(), "tasks deleted");
        Ok(true)
    }

    /// Optimistic bulk delete: tasks disappear at once and come back in
    /// their original positions if the server refuses.
    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn discard(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.categories.ensure_loaded().await?;

        let request = async {
            self.send_delete(ids).await?;
            Ok::<Option<Task>, Error>(None)
        };
        self.coordinator
            .run(self, Change::Remove(ids.to_vec()), request, "Failed to delete tasks")
            .await?;
        Ok(())
    }

    fn require_cached(&self, ids: &[String]) -> Result<()> {
        let cache = self.categories.cache().lock();
        match ids.iter().find(|id| cache.find_task(id).is_none()) {
            Some(missing) => Err(Error::task_not_found(missing.as_str())),
            None => Ok(()),
        }
    }

    async fn send_update(&self, id: &str, patch: &TaskPatch) -> Result<Value> {
        let endpoint = format!("/todos/{id}");
        self.categories
            .api()
            .call(&endpoint, Method::Put, Some(Body::json(patch)?), false)
            .await
    }

    async fn send_delete(&self, ids: &[String]) -> Result<Value> {
        let body = Body::json(&DeleteTasksRequest { ids: ids.to_vec() })?;
        self.categories
            .api()
            .call("/todos/", Method::Delete, Some(body), false)
            .await
    }

    fn notifier(&self) -> &dyn crate::notify::Notifier {
        self.categories.api().notifier().as_ref()
    }
}

impl OptimisticTarget<Task> for TaskStore {
    type Snapshot = Vec<TaskSlot>;

    fn capture(&self, change: &Change<Task>) -> Result<Vec<TaskSlot>> {
        let cache = self.categories.cache().lock();
        let ids: Vec<&str> = match change {
            Change::Replace(task) => vec![task.id.as_str()],
            Change::Remove(ids) => ids.iter().map(String::as_str).collect(),
        };
        ids.into_iter()
            .map(|id| cache.find_task(id).ok_or_else(|| Error::task_not_found(id)))
            .collect()
    }

    fn apply(&self, change: &Change<Task>) {
        let mut cache = self.categories.cache().lock();
        match change {
            Change::Replace(task) => {
                cache.put_task(task.clone());
            }
            Change::Remove(ids) => {
                cache.remove_tasks(ids);
            }
        }
    }

    fn confirm(&self, authoritative: Task) {
        self.categories.cache().lock().put_task(authoritative);
    }

    fn revert(&self, snapshot: Vec<TaskSlot>) {
        self.categories.cache().lock().restore(snapshot);
    }
}

/// Overlays the fields present in a server payload on `base`. Fields the
/// server omitted keep their current value. `None` when the payload is not
/// an object or the result does not form a task.
fn merge_task(base: &Task, payload: &Value) -> Option<Task> {
    let Value::Object(fields) = payload else {
        return None;
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(base) else {
        return None;
    };
    for (key, value) in fields {
        if !value.is_null() {
            merged.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(Value::Object(merged)).ok()
}
