use std::sync::Arc;

use tarefas_core::auth::confirm_password;
use tarefas_core::mock::{DEMO_PASSWORD, DEMO_USERNAME, Fault, MockApi};
use tarefas_core::session::Session;
use tarefas_core::token::{FileTokenStore, MemoryTokenStore, TokenStore};
use tarefas_core::transport::Method;
use tarefas_core::visuals::VisualStore;
use tarefas_core::Error;
use tarefas_shared::{Credentials, Registration};

fn anonymous(tokens: Arc<dyn TokenStore>) -> (Session, Arc<MockApi>) {
    let mock = Arc::new(MockApi::seeded());
    let session = Session::with_wire(mock.clone(), tokens, Arc::new(VisualStore::in_memory()));
    (session, mock)
}

fn demo() -> Credentials {
    Credentials {
        username: DEMO_USERNAME.to_string(),
        password: DEMO_PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn login_stores_token_and_loads_profile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tokens = Arc::new(FileTokenStore::new(dir.path()));
    let (session, mock) = anonymous(tokens.clone());

    let user = session.auth.login(&demo()).await.expect("login");

    assert_eq!(user.username, DEMO_USERNAME);
    assert_eq!(session.auth.current_user(), Some(user));
    assert!(tokens.path().exists());
    assert!(session.auth.is_authenticated());
    assert_eq!(mock.count(Method::Get, "/users/me"), 1);
    assert_eq!(session.tasks.get_all().await.expect("tasks").len(), 11);
}

#[tokio::test]
async fn wrong_password_leaves_no_token_and_no_expiry_event() {
    let (session, _mock) = anonymous(Arc::new(MemoryTokenStore::default()));

    let err = session
        .auth
        .login(&Credentials {
            username: DEMO_USERNAME.to_string(),
            password: "nope".to_string(),
        })
        .await
        .expect_err("rejected");

    assert!(err.is_unauthorized());
    assert!(!session.auth.is_authenticated());
    assert!(session.recorder.events().is_empty());
}

#[tokio::test]
async fn token_response_without_token_is_rejected() {
    let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::default());
    let (session, mock) = anonymous(tokens.clone());

    // a 200 whose body carries only a `detail`
    mock.fail_next(Fault::Status(200));
    let err = session.auth.login(&demo()).await.expect_err("no token");

    assert!(matches!(err, Error::Decode(_)));
    assert!(tokens.load().is_none());
    assert_eq!(mock.count(Method::Get, "/users/me"), 0);
}

#[tokio::test]
async fn empty_credentials_are_rejected_locally() {
    let (session, mock) = anonymous(Arc::new(MemoryTokenStore::default()));

    let err = session
        .auth
        .login(&Credentials {
            username: "  ".to_string(),
            password: "x".to_string(),
        })
        .await
        .expect_err("invalid");

    assert!(matches!(err, Error::Validation(_)));
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn register_then_login_with_new_account() {
    let (session, mock) = anonymous(Arc::new(MemoryTokenStore::default()));

    let user = session
        .auth
        .register(&Registration {
            username: "ana".to_string(),
            password: "s3cret".to_string(),
            name: "Ana".to_string(),
        })
        .await
        .expect("register");

    assert_eq!(user.username, "ana");
    assert!(session.auth.is_authenticated());
    assert_eq!(mock.count(Method::Post, "/register"), 1);
    assert_eq!(mock.count(Method::Post, "/token"), 1);
    assert!(session.categories.all().await.expect("categories").is_empty());
}

#[tokio::test]
async fn duplicate_registration_is_a_bad_request() {
    let (session, _mock) = anonymous(Arc::new(MemoryTokenStore::default()));

    let err = session
        .auth
        .register(&Registration {
            username: DEMO_USERNAME.to_string(),
            password: "whatever".to_string(),
            name: "Someone".to_string(),
        })
        .await
        .expect_err("taken");

    assert_eq!(err.status(), Some(400));
    assert!(!session.auth.is_authenticated());
}

#[tokio::test]
async fn logout_clears_token_even_when_server_is_unreachable() {
    let (session, mock) = anonymous(Arc::new(MemoryTokenStore::default()));
    session.auth.login(&demo()).await.expect("login");

    mock.fail_next(Fault::Connection);
    session.auth.logout().await;

    assert!(!session.auth.is_authenticated());
    assert_eq!(session.auth.current_user(), None);
    assert_eq!(mock.count(Method::Post, "/logout"), 1);
}

#[tokio::test]
async fn logout_makes_protected_calls_fail_locally() {
    let (session, mock) = anonymous(Arc::new(MemoryTokenStore::default()));
    session.auth.login(&demo()).await.expect("login");
    session.auth.logout().await;

    let err = session.tasks.get_all().await.expect_err("no token");

    assert_eq!(err, Error::Unauthenticated);
    assert_eq!(mock.count(Method::Get, "/categories_with_todos"), 0);
}

#[test]
fn password_confirmation_must_match() {
    assert!(confirm_password("abc", "abc").is_ok());
    assert!(matches!(confirm_password("abc", "abd"), Err(Error::Validation(_))));
}
