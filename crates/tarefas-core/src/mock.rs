//! In-memory stand-in for the task API.
//!
//! Serves the same routes as the real backend from process memory, so data
//! resets whenever the process restarts. Latency, injected faults and a
//! request log make it usable as a test double.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tarefas_shared::{
    Category, CategoryCreate, CategoryRename, DeleteTasksRequest, NewTask, Registration, Task,
    TaskPatch, User,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::transport::{FORM_CONTENT_TYPE, Method, Wire, WireFailure, WireRequest, WireResponse};

pub const DEMO_USERNAME: &str = "demo";
pub const DEMO_PASSWORD: &str = "password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The request never reaches the server.
    Connection,
    /// The server answers with this status and a JSON `detail`.
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRequest {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password: String,
}

#[derive(Debug, Default)]
struct MockState {
    accounts: Vec<Account>,
    sessions: HashMap<String, String>,
    categories: Vec<Category>,
    tasks: Vec<Task>,
    faults: VecDeque<Fault>,
    log: Vec<LoggedRequest>,
}

#[derive(Debug, Default)]
pub struct MockApi {
    state: Mutex<MockState>,
    latency: Mutex<Duration>,
}

type Reply = (u16, Value);

fn detail(status: u16, message: &str) -> Reply {
    (status, json!({ "detail": message }))
}

impl MockApi {
    /// No categories or tasks; only the demo account.
    pub fn empty() -> Self {
        let api = Self::default();
        api.state.lock().accounts.push(Account {
            user: User {
                id: "u-demo".to_string(),
                username: DEMO_USERNAME.to_string(),
                name: Some("Demo User".to_string()),
                email: Some("demo@tarefas.com".to_string()),
                disabled: Some(false),
            },
            password: DEMO_PASSWORD.to_string(),
        });
        api
    }

    /// Five categories and eleven tasks owned by the demo account.
    pub fn seeded() -> Self {
        let api = Self::empty();
        for (id, name) in [
            ("work", "Work"),
            ("personal", "Personal"),
            ("shopping", "Shopping"),
            ("health", "Health"),
            ("education", "Education"),
        ] {
            api.with_category(id, name);
        }
        for (id, content, completed, category) in [
            ("1", "Prepare presentation", false, "work"),
            ("2", "Answer emails", true, "work"),
            ("3", "Client meeting", false, "work"),
            ("4", "Buy milk", false, "shopping"),
            ("5", "Buy fruit", true, "shopping"),
            ("6", "Book doctor appointment", false, "health"),
            ("7", "Run 5km", false, "health"),
            ("8", "Read a book", false, "education"),
            ("9", "Study Rust", true, "education"),
            ("10", "Call mom", false, "personal"),
            ("11", "Organize photos", false, "personal"),
        ] {
            api.with_task(id, content, completed, category);
        }
        api
    }

    pub fn with_category(&self, id: &str, name: &str) -> &Self {
        self.state.lock().categories.push(Category {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            owner: DEMO_USERNAME.to_string(),
            tasks: Vec::new(),
        });
        self
    }

    pub fn with_task(&self, id: &str, content: &str, completed: bool, category_id: &str) -> &Self {
        self.state.lock().tasks.push(Task {
            id: id.to_string(),
            content: content.to_string(),
            completed,
            category_id: category_id.to_string(),
            created_at: Utc::now(),
            owner: DEMO_USERNAME.to_string(),
        });
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Queues a fault for the next request. Faults are consumed in order.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Creates a session for `username` as if it had logged in.
    pub fn issue_token(&self, username: &str) -> String {
        let token = format!("mock-{}", Uuid::new_v4());
        self.accept_token(&token, username);
        token
    }

    /// Treats an existing token as a live session, e.g. one persisted by an
    /// earlier process.
    pub fn accept_token(&self, token: &str, username: &str) {
        self.state
            .lock()
            .sessions
            .insert(token.to_string(), username.to_string());
    }

    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.state.lock().log.clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Server-side copy of a task.
    pub fn task(&self, id: &str) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn category_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .categories
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    fn route(&self, request: &WireRequest) -> Reply {
        let mut state = self.state.lock();
        let path = request.path.as_str();

        match (request.method, path) {
            (Method::Post, "/token") => return state.login(request),
            (Method::Post, "/register") => return state.register(request),
            _ => {}
        }

        let Some(username) = request
            .bearer
            .as_deref()
            .and_then(|token| state.sessions.get(token))
            .cloned()
        else {
            return detail(401, "Could not validate credentials");
        };

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["users", "me"]) => state.me(&username),
            (Method::Post, ["logout"]) => {
                if let Some(token) = request.bearer.as_deref() {
                    state.sessions.remove(token);
                }
                (200, json!({ "success": true }))
            }
            (Method::Get, ["categories_with_todos"]) => state.categories_with_todos(&username),
            (Method::Get, ["categories"]) => {
                let categories: Vec<Value> = state
                    .owned_categories(&username)
                    .map(|c| json!({ "id": c.id, "name": c.name, "username": c.owner, "created_at": c.created_at }))
                    .collect();
                (200, Value::Array(categories))
            }
            (Method::Post, ["categories"]) => state.create_category(&username, request),
            (Method::Put, ["categories", id]) => state.rename_category(&username, id, request),
            (Method::Delete, ["categories", id]) => state.delete_category(&username, id),
            (Method::Post, ["todos"]) => state.create_task(&username, request),
            (Method::Put, ["todos", id]) => state.update_task(&username, id, request),
            (Method::Delete, ["todos"]) => state.delete_tasks(&username, request),
            _ => detail(404, "Not Found"),
        }
    }
}

#[async_trait]
impl Wire for MockApi {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, WireFailure> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let fault = {
            let mut state = self.state.lock();
            state.log.push(LoggedRequest {
                method: request.method,
                path: request.path.clone(),
            });
            state.faults.pop_front()
        };

        match fault {
            Some(Fault::Connection) => {
                debug!(path = %request.path, "mock injecting connection failure");
                return Err(WireFailure("connection refused (injected)".to_string()));
            }
            Some(Fault::Status(status)) => {
                debug!(path = %request.path, status, "mock injecting error status");
                let (_, body) = detail(status, "injected failure");
                return Ok(WireResponse::json(status, &body));
            }
            None => {}
        }

        let (status, body) = self.route(&request);
        debug!(method = %request.method, path = %request.path, status, "mock handled request");
        Ok(WireResponse::json(status, &body))
    }
}

fn parse_json<T: DeserializeOwned>(request: &WireRequest) -> Result<T, Reply> {
    serde_json::from_slice(&request.body).map_err(|err| detail(422, &err.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl MockState {
    fn owned_categories<'a>(&'a self, username: &'a str) -> impl Iterator<Item = &'a Category> + 'a {
        self.categories.iter().filter(move |c| c.owner == username)
    }

    fn owns_category(&self, username: &str, id: &str) -> bool {
        self.owned_categories(username).any(|c| c.id == id)
    }

    fn login(&mut self, request: &WireRequest) -> Reply {
        if request.content_type != Some(FORM_CONTENT_TYPE) {
            return detail(422, "expected form-encoded credentials");
        }
        let form: HashMap<String, String> = url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect();
        let username = form.get("username").cloned().unwrap_or_default();
        let password = form.get("password").cloned().unwrap_or_default();

        let valid = self
            .accounts
            .iter()
            .any(|a| a.user.username == username && a.password == password);
        if !valid {
            return detail(401, "Incorrect username or password");
        }

        let token = format!("mock-{}", Uuid::new_v4());
        self.sessions.insert(token.clone(), username.clone());
        info!(username = %username, "mock login");
        (200, json!({ "access_token": token, "token_type": "bearer" }))
    }

    fn register(&mut self, request: &WireRequest) -> Reply {
        let registration: Registration = match parse_json(request) {
            Ok(registration) => registration,
            Err(reply) => return reply,
        };
        if registration.username.trim().is_empty() || registration.password.is_empty() {
            return detail(422, "username and password are required");
        }
        if self.accounts.iter().any(|a| a.user.username == registration.username) {
            return detail(400, "Username already registered");
        }

        let user = User {
            id: format!("u-{}", Uuid::new_v4()),
            username: registration.username,
            name: Some(registration.name),
            email: None,
            disabled: Some(false),
        };
        self.accounts.push(Account {
            user: user.clone(),
            password: registration.password,
        });
        (200, to_json(&user))
    }

    fn me(&self, username: &str) -> Reply {
        match self.accounts.iter().find(|a| a.user.username == username) {
            Some(account) => (200, to_json(&account.user)),
            None => detail(404, "User not found"),
        }
    }

    fn categories_with_todos(&self, username: &str) -> Reply {
        let categories: Vec<Category> = self
            .owned_categories(username)
            .map(|c| {
                let mut category = c.clone();
                category.tasks = self
                    .tasks
                    .iter()
                    .filter(|t| t.category_id == c.id)
                    .cloned()
                    .collect();
                category
            })
            .collect();
        (200, to_json(&categories))
    }

    fn create_category(&mut self, username: &str, request: &WireRequest) -> Reply {
        let create: CategoryCreate = match parse_json(request) {
            Ok(create) => create,
            Err(reply) => return reply,
        };
        if create.name.trim().is_empty() {
            return detail(422, "name is required");
        }
        if self.categories.iter().any(|c| c.id == create.id) {
            return detail(409, "Category already exists");
        }

        let category = Category {
            id: create.id,
            name: create.name,
            created_at: Utc::now(),
            owner: username.to_string(),
            tasks: Vec::new(),
        };
        self.categories.push(category.clone());
        (200, to_json(&category))
    }

    fn rename_category(&mut self, username: &str, id: &str, request: &WireRequest) -> Reply {
        let rename: CategoryRename = match parse_json(request) {
            Ok(rename) => rename,
            Err(reply) => return reply,
        };
        match self
            .categories
            .iter_mut()
            .find(|c| c.id == id && c.owner == username)
        {
            Some(category) => {
                category.name = rename.name;
                (200, to_json(category))
            }
            None => detail(404, "Category not found"),
        }
    }

    fn delete_category(&mut self, username: &str, id: &str) -> Reply {
        if !self.owns_category(username, id) {
            return detail(404, "Category not found");
        }
        self.categories.retain(|c| c.id != id);
        self.tasks.retain(|t| t.category_id != id);
        (200, json!({ "success": true }))
    }

    fn create_task(&mut self, username: &str, request: &WireRequest) -> Reply {
        let new: NewTask = match parse_json(request) {
            Ok(new) => new,
            Err(reply) => return reply,
        };
        if !self.owns_category(username, &new.category_id) {
            return detail(404, "Category not found");
        }
        if self.tasks.iter().any(|t| t.id == new.id) {
            return detail(409, "Task already exists");
        }

        let task = Task {
            id: new.id,
            content: new.content,
            completed: new.completed,
            category_id: new.category_id,
            created_at: new.created_at,
            owner: username.to_string(),
        };
        self.tasks.push(task.clone());
        (200, to_json(&task))
    }

    fn update_task(&mut self, username: &str, id: &str, request: &WireRequest) -> Reply {
        let patch: TaskPatch = match parse_json(request) {
            Ok(patch) => patch,
            Err(reply) => return reply,
        };
        if let Some(category_id) = patch.category_id.as_deref()
            && !self.owns_category(username, category_id)
        {
            return detail(404, "Category not found");
        }
        match self
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.owner == username)
        {
            Some(task) => {
                patch.apply_to(task);
                (200, to_json(task))
            }
            None => detail(404, "Task not found"),
        }
    }

    fn delete_tasks(&mut self, username: &str, request: &WireRequest) -> Reply {
        let delete: DeleteTasksRequest = match parse_json(request) {
            Ok(delete) => delete,
            Err(reply) => return reply,
        };
        let before = self.tasks.len();
        self.tasks
            .retain(|t| !(t.owner == username && delete.ids.contains(&t.id)));
        (200, json!({ "deleted": before - self.tasks.len() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, path: &str, bearer: Option<&str>, body: Option<Value>) -> WireRequest {
        WireRequest {
            method,
            path: path.to_string(),
            bearer: bearer.map(str::to_string),
            content_type: body.as_ref().map(|_| crate::transport::JSON_CONTENT_TYPE),
            body: body
                .map(|b| serde_json::to_vec(&b).unwrap_or_default())
                .unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        let api = MockApi::seeded();

        let response = api
            .send(request(Method::Get, "/categories_with_todos", None, None))
            .await
            .expect("response");

        assert_eq!(response.status, 401);
    }

    #[tokio::test]
    async fn nests_tasks_under_their_categories() {
        let api = MockApi::seeded();
        let token = api.issue_token(DEMO_USERNAME);

        let response = api
            .send(request(Method::Get, "/categories_with_todos", Some(token.as_str()), None))
            .await
            .expect("response");
        let categories: Vec<Category> = serde_json::from_slice(&response.body).expect("decode");

        assert_eq!(categories.len(), 5);
        let work = categories.iter().find(|c| c.id == "work").expect("work");
        assert_eq!(work.tasks.len(), 3);
        assert!(work.tasks.iter().all(|t| t.category_id == "work"));
    }

    #[tokio::test]
    async fn deleting_a_category_cascades_server_side() {
        let api = MockApi::seeded();
        let token = api.issue_token(DEMO_USERNAME);

        let response = api
            .send(request(Method::Delete, "/categories/work", Some(token.as_str()), None))
            .await
            .expect("response");

        assert_eq!(response.status, 200);
        assert!(api.task("1").is_none());
        assert!(api.task("4").is_some());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let api = MockApi::seeded();
        let token = api.issue_token(DEMO_USERNAME);
        api.fail_next(Fault::Connection);
        api.fail_next(Fault::Status(500));

        let first = api
            .send(request(Method::Get, "/users/me", Some(token.as_str()), None))
            .await;
        let second = api
            .send(request(Method::Get, "/users/me", Some(token.as_str()), None))
            .await
            .expect("response");
        let third = api
            .send(request(Method::Get, "/users/me", Some(token.as_str()), None))
            .await
            .expect("response");

        assert!(first.is_err());
        assert_eq!(second.status, 500);
        assert_eq!(third.status, 200);
        assert_eq!(api.count(Method::Get, "/users/me"), 3);
    }

    #[tokio::test]
    async fn rejects_task_for_unknown_category() {
        let api = MockApi::seeded();
        let token = api.issue_token(DEMO_USERNAME);
        let body = json!({
            "id": "x",
            "content": "Orphan",
            "completed": false,
            "category_id": "nowhere",
            "created_at": Utc::now(),
        });

        let response = api
            .send(request(Method::Post, "/todos", Some(token.as_str()), Some(body)))
            .await
            .expect("response");

        assert_eq!(response.status, 404);
    }
}
