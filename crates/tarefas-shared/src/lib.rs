use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

fn unix_epoch() -> DateTime<Utc> {
  DateTime::<Utc>::UNIX_EPOCH
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Task {
  pub id:          String,
  pub content:     String,
  #[serde(default)]
  pub completed:   bool,
  pub category_id: String,
  #[serde(default = "unix_epoch")]
  pub created_at:  DateTime<Utc>,
  #[serde(
    default,
    rename = "username"
  )]
  pub owner:       String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Category {
  pub id:         String,
  pub name:       String,
  #[serde(default = "unix_epoch")]
  pub created_at: DateTime<Utc>,
  #[serde(
    default,
    rename = "username"
  )]
  pub owner:      String,
  #[serde(
    default,
    rename = "todos"
  )]
  pub tasks:      Vec<Task>
}

/// Body of `POST /todos`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct NewTask {
  pub id:          String,
  pub content:     String,
  pub completed:   bool,
  pub category_id: String,
  pub created_at:  DateTime<Utc>
}

impl From<&Task> for NewTask {
  fn from(task: &Task) -> Self {
    Self {
      id:          task.id.clone(),
      content:     task.content.clone(),
      completed:   task.completed,
      category_id: task
        .category_id
        .clone(),
      created_at:  task.created_at
    }
  }
}

/// What a caller supplies to create a
/// task; id and timestamp are assigned
/// by the store.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TaskCreate {
  pub content:     String,
  pub category_id: String,
  #[serde(default)]
  pub completed:   bool
}

/// Partial update for `PUT /todos/{id}`.
/// Omitted fields keep their current
/// value.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
  Eq,
)]
pub struct TaskPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub content:     Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub completed:   Option<bool>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub category_id: Option<String>
}

impl TaskPatch {
  pub fn completed(
    completed: bool
  ) -> Self {
    Self {
      completed: Some(completed),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.content.is_none()
      && self.completed.is_none()
      && self.category_id.is_none()
  }

  pub fn apply_to(
    &self,
    task: &mut Task
  ) {
    if let Some(content) =
      self.content.as_ref()
    {
      task.content = content.clone();
    }
    if let Some(completed) =
      self.completed
    {
      task.completed = completed;
    }
    if let Some(category_id) =
      self.category_id.as_ref()
    {
      task.category_id =
        category_id.clone();
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct CategoryCreate {
  pub id:   String,
  pub name: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct CategoryRename {
  pub name: String
}

/// Body of the bulk `DELETE /todos/`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct DeleteTasksRequest {
  pub ids: Vec<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct User {
  #[serde(default)]
  pub id:       String,
  pub username: String,
  #[serde(default)]
  pub name:     Option<String>,
  #[serde(default)]
  pub email:    Option<String>,
  #[serde(default)]
  pub disabled: Option<bool>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct Credentials {
  pub username: String,
  pub password: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct Registration {
  pub username: String,
  pub password: String,
  pub name:     String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TokenResponse {
  #[serde(default)]
  pub access_token: String,
  #[serde(default)]
  pub token_type:   String
}

/// Client-only color/icon pairing for a
/// category. Never sent to the API.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Visual {
  pub color: String,
  pub icon:  String
}
