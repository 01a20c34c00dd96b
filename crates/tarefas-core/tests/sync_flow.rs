use std::sync::Arc;
use std::time::Duration;

use tarefas_core::Error;
use tarefas_core::mock::{DEMO_USERNAME, Fault, MockApi};
use tarefas_core::notify::{Level, SessionEvent};
use tarefas_core::session::Session;
use tarefas_core::token::{MemoryTokenStore, TokenStore};
use tarefas_core::transport::Method;
use tarefas_core::visuals::{VisualStore, is_known_color};
use tarefas_shared::{TaskCreate, TaskPatch};

fn logged_in() -> (Session, Arc<MockApi>) {
    let mock = Arc::new(MockApi::seeded());
    let token = mock.issue_token(DEMO_USERNAME);
    let session = Session::with_wire(
        mock.clone(),
        Arc::new(MemoryTokenStore::with_token(&token)),
        Arc::new(VisualStore::in_memory()),
    );
    (session, mock)
}

fn ids(tasks: &[tarefas_shared::Task]) -> Vec<String> {
    tasks.iter().map(|t| t.id.clone()).collect()
}

#[tokio::test]
async fn concurrent_reads_share_one_fetch() {
    let (session, mock) = logged_in();
    mock.set_latency(Duration::from_millis(30));

    let (all, shopping, categories) = tokio::join!(
        session.tasks.get_all(),
        session.tasks.get_by_category("shopping"),
        session.categories.all(),
    );

    assert_eq!(all.expect("all").len(), 11);
    assert_eq!(ids(&shopping.expect("shopping")), vec!["4", "5"]);
    assert_eq!(categories.expect("categories").len(), 5);
    assert_eq!(mock.count(Method::Get, "/categories_with_todos"), 1);

    session.tasks.get_all().await.expect("cached read");
    assert_eq!(mock.count(Method::Get, "/categories_with_todos"), 1);
}

#[tokio::test]
async fn category_filter_only_returns_member_tasks() {
    let (session, _mock) = logged_in();

    let work = session.tasks.get_by_category("work").await.expect("work");
    let unknown = session.tasks.get_by_category("garden").await.expect("unknown");

    assert_eq!(ids(&work), vec!["1", "2", "3"]);
    assert!(work.iter().all(|t| t.category_id == "work"));
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn toggling_twice_restores_the_original_value() {
    let (session, mock) = logged_in();
    let before = session.tasks.get("4").await.expect("task");

    let once = session.tasks.toggle_completed("4").await.expect("first toggle");
    assert_eq!(once.completed, !before.completed);
    let twice = session.tasks.toggle_completed("4").await.expect("second toggle");

    assert_eq!(twice.completed, before.completed);
    assert_eq!(session.tasks.get("4").await.expect("task").completed, before.completed);
    assert_eq!(mock.task("4").expect("server copy").completed, before.completed);
    assert_eq!(mock.count(Method::Put, "/todos/4"), 2);
}

#[tokio::test]
async fn failed_toggle_is_rolled_back_and_reported_once() {
    let (session, mock) = logged_in();
    let milk = session.tasks.get("4").await.expect("task");
    assert_eq!(milk.content, "Buy milk");
    assert!(!milk.completed);

    mock.fail_next(Fault::Connection);
    let err = session.tasks.toggle_completed("4").await.expect_err("network down");

    assert!(err.is_connection());
    assert!(!session.tasks.get("4").await.expect("task").completed);
    let errors = session.recorder.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Failed to update task status");
    assert!(!mock.task("4").expect("server copy").completed);
}

#[tokio::test]
async fn toggle_is_visible_while_the_request_is_in_flight() {
    let (session, mock) = logged_in();
    session.tasks.get_all().await.expect("load");
    mock.set_latency(Duration::from_millis(50));

    let (toggled, during) = tokio::join!(session.tasks.toggle_completed("4"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.tasks.get("4").await
    });

    assert!(toggled.expect("toggle").completed);
    assert!(during.expect("mid-flight read").completed);
    assert!(session.recorder.errors().is_empty());
}

#[tokio::test]
async fn failed_toggle_shows_the_change_then_reverts_it() {
    let (session, mock) = logged_in();
    session.tasks.get_all().await.expect("load");
    mock.set_latency(Duration::from_millis(50));
    mock.fail_next(Fault::Connection);

    let (toggled, during) = tokio::join!(session.tasks.toggle_completed("4"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.tasks.get("4").await
    });

    assert!(during.expect("mid-flight read").completed);
    assert!(toggled.expect_err("network down").is_connection());
    assert!(!session.tasks.get("4").await.expect("task").completed);
    assert_eq!(session.recorder.errors().len(), 1);
    assert_eq!(session.recorder.errors()[0].title, "Failed to update task status");
}

#[tokio::test]
async fn toggling_an_unknown_task_sends_nothing() {
    let (session, mock) = logged_in();

    let err = session.tasks.toggle_completed("999").await.expect_err("missing");

    assert!(err.is_not_found());
    assert_eq!(mock.count(Method::Put, "/todos/999"), 0);
    assert!(session.recorder.notifications().is_empty());
}

#[tokio::test]
async fn deleted_task_disappears_from_every_view() {
    let (session, mock) = logged_in();
    session.tasks.get_all().await.expect("load");

    assert!(session.tasks.delete("4").await.expect("delete"));

    assert!(!ids(&session.tasks.get_all().await.expect("all")).contains(&"4".to_string()));
    assert_eq!(ids(&session.tasks.get_by_category("shopping").await.expect("shopping")), vec!["5"]);
    assert!(session.tasks.get("4").await.expect_err("gone").is_not_found());
    assert!(mock.task("4").is_none());
}

#[tokio::test]
async fn deleting_an_unknown_id_fails_without_touching_anything() {
    let (session, mock) = logged_in();
    session.tasks.get_all().await.expect("load");

    let err = session.tasks.delete("999").await.expect_err("missing");

    assert_eq!(
        err,
        Error::NotFound {
            kind: "task",
            id: "999".to_string()
        }
    );
    assert_eq!(mock.count(Method::Delete, "/todos/"), 0);
    assert_eq!(session.tasks.get_all().await.expect("all").len(), 11);
}

#[tokio::test]
async fn bulk_delete_spans_categories() {
    let (session, mock) = logged_in();
    let doomed: Vec<String> = ["1", "4", "6"].iter().map(|s| s.to_string()).collect();

    session.tasks.delete_many(&doomed).await.expect("delete");

    let remaining = ids(&session.tasks.get_all().await.expect("all"));
    assert_eq!(remaining.len(), 8);
    assert!(doomed.iter().all(|id| !remaining.contains(id)));
    assert!(doomed.iter().all(|id| mock.task(id).is_none()));
    assert_eq!(mock.count(Method::Delete, "/todos/"), 1);
}

#[tokio::test]
async fn failed_bulk_delete_keeps_every_task() {
    let (session, mock) = logged_in();
    session.tasks.get_all().await.expect("load");
    let doomed = vec!["1".to_string(), "4".to_string()];

    mock.fail_next(Fault::Status(500));
    let err = session.tasks.delete_many(&doomed).await.expect_err("server error");

    assert_eq!(err.status(), Some(500));
    assert_eq!(session.tasks.get_all().await.expect("all").len(), 11);
    assert_eq!(session.recorder.errors().len(), 1);
    assert_eq!(session.recorder.errors()[0].title, "Failed to delete tasks");
}

#[tokio::test]
async fn discard_hides_tasks_and_restores_them_in_place_on_failure() {
    let (session, mock) = logged_in();
    session.tasks.get_all().await.expect("load");

    mock.fail_next(Fault::Connection);
    session
        .tasks
        .discard(&["4".to_string(), "5".to_string()])
        .await
        .expect_err("network down");

    assert_eq!(ids(&session.tasks.get_by_category("shopping").await.expect("shopping")), vec!["4", "5"]);
    assert_eq!(session.recorder.errors().len(), 1);

    session.tasks.discard(&["5".to_string()]).await.expect("discard");
    assert_eq!(ids(&session.tasks.get_by_category("shopping").await.expect("shopping")), vec!["4"]);
    assert!(mock.task("5").is_none());
}

#[tokio::test]
async fn added_task_shows_up_after_server_accepts_it() {
    let (session, mock) = logged_in();

    let task = session
        .tasks
        .add(TaskCreate {
            content: "  Buy eggs ".to_string(),
            category_id: "shopping".to_string(),
            completed: false,
        })
        .await
        .expect("add");

    assert_eq!(task.content, "Buy eggs");
    assert_eq!(task.owner, DEMO_USERNAME);
    assert!(ids(&session.tasks.get_by_category("shopping").await.expect("shopping")).contains(&task.id));
    assert_eq!(mock.task(&task.id).expect("server copy").content, "Buy eggs");
    let notes = session.recorder.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Info);
    assert_eq!(notes[0].title, "Task added");
}

#[tokio::test]
async fn failed_add_leaves_cache_alone() {
    let (session, mock) = logged_in();
    session.tasks.get_all().await.expect("load");

    mock.fail_next(Fault::Status(500));
    session
        .tasks
        .add(TaskCreate {
            content: "Buy eggs".to_string(),
            category_id: "shopping".to_string(),
            completed: false,
        })
        .await
        .expect_err("server error");

    assert_eq!(session.tasks.get_all().await.expect("all").len(), 11);
    assert_eq!(session.recorder.errors()[0].title, "Failed to add task");
}

#[tokio::test]
async fn adding_to_an_unknown_category_sends_nothing() {
    let (session, mock) = logged_in();

    let err = session
        .tasks
        .add(TaskCreate {
            content: "Weed the beds".to_string(),
            category_id: "garden".to_string(),
            completed: false,
        })
        .await
        .expect_err("missing category");

    assert!(err.is_not_found());
    assert_eq!(mock.count(Method::Post, "/todos"), 0);
}

#[tokio::test]
async fn update_moves_task_between_categories() {
    let (session, mock) = logged_in();

    let moved = session
        .tasks
        .update(
            "1",
            TaskPatch {
                category_id: Some("personal".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .expect("update");

    assert_eq!(moved.category_id, "personal");
    assert_eq!(moved.content, "Prepare presentation");
    assert!(!ids(&session.tasks.get_by_category("work").await.expect("work")).contains(&"1".to_string()));
    assert!(ids(&session.tasks.get_by_category("personal").await.expect("personal")).contains(&"1".to_string()));
    assert_eq!(mock.task("1").expect("server copy").category_id, "personal");
}

#[tokio::test]
async fn empty_patch_is_answered_from_cache() {
    let (session, mock) = logged_in();

    let task = session.tasks.update("2", TaskPatch::default()).await.expect("noop");

    assert_eq!(task.content, "Answer emails");
    assert_eq!(mock.count(Method::Put, "/todos/2"), 0);
}

#[tokio::test]
async fn rejected_token_is_cleared_and_session_expires() {
    let mock = Arc::new(MockApi::seeded());
    let tokens = Arc::new(MemoryTokenStore::with_token("stale"));
    let session = Session::with_wire(mock.clone(), tokens.clone(), Arc::new(VisualStore::in_memory()));

    let err = session.tasks.get_all().await.expect_err("rejected");

    assert!(err.is_unauthorized());
    assert!(tokens.load().is_none());
    assert_eq!(session.recorder.events(), vec![SessionEvent::Expired]);
    assert_eq!(session.recorder.errors().len(), 1);
    assert!(!session.auth.is_authenticated());
}

#[tokio::test]
async fn adding_a_category_invalidates_the_cache() {
    let (session, mock) = logged_in();
    assert_eq!(session.categories.all().await.expect("all").len(), 5);

    let created = session.categories.add("Casa", None).await.expect("add");

    assert_eq!(created.id, "casa");
    assert!(!session.categories.is_cached());
    let categories = session.categories.all().await.expect("refetch");
    assert_eq!(categories.len(), 6);
    assert_eq!(mock.count(Method::Get, "/categories_with_todos"), 2);
    assert!(is_known_color(&session.visuals().get("casa").color));
}

#[tokio::test]
async fn colliding_category_name_gets_a_suffixed_id_on_a_cold_cache() {
    let (session, mock) = logged_in();
    assert!(!session.categories.is_cached());

    let created = session.categories.add("Work", None).await.expect("add");

    assert_eq!(created.id, "work-2");
    assert!(mock.category_ids().contains(&"work-2".to_string()));
    assert_eq!(mock.count(Method::Post, "/categories"), 1);
}

#[tokio::test]
async fn adding_the_same_name_twice_yields_distinct_ids() {
    let (session, mock) = logged_in();

    let first = session.categories.add("Casa", None).await.expect("first");
    let second = session.categories.add("Casa", None).await.expect("second");

    assert_eq!(first.id, "casa");
    assert_eq!(second.id, "casa-2");
    assert_eq!(mock.count(Method::Get, "/categories_with_todos"), 2);
    assert!(session.recorder.errors().is_empty());
}

#[tokio::test]
async fn deleting_a_category_from_a_cold_session_reports_the_removal() {
    let (session, mock) = logged_in();
    assert!(!session.categories.is_cached());

    assert!(session.categories.delete("personal").await.expect("delete"));

    assert!(!mock.category_ids().contains(&"personal".to_string()));
    assert!(session.categories.get("personal").await.expect_err("gone").is_not_found());
}

#[tokio::test]
async fn deleting_a_category_drops_its_tasks_and_visual() {
    let (session, _mock) = logged_in();
    session.visuals().set("health", "bg-cyan-500", "Dumbbell").expect("set");
    session.tasks.get_all().await.expect("load");

    assert!(session.categories.delete("health").await.expect("delete"));

    assert!(session.categories.get("health").await.expect_err("gone").is_not_found());
    assert!(session.tasks.get_by_category("health").await.expect("health").is_empty());
    assert_eq!(session.tasks.get_all().await.expect("all").len(), 9);
    assert!(!session.visuals().contains("health"));
}

#[tokio::test]
async fn renaming_updates_the_cached_category() {
    let (session, _mock) = logged_in();
    session.categories.all().await.expect("load");

    let renamed = session.categories.update("work", " Trabalho ").await.expect("rename");

    assert_eq!(renamed.name, "Trabalho");
    assert_eq!(session.categories.get("work").await.expect("get").name, "Trabalho");
    assert_eq!(session.categories.get("work").await.expect("get").tasks.len(), 3);
}
