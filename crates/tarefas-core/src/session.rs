use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::auth::AuthService;
use crate::category_store::CategoryStore;
use crate::config::{Backend, Config};
use crate::http::HttpWire;
use crate::mock::{DEMO_USERNAME, MockApi};
use crate::notify::Recorder;
use crate::task_store::TaskStore;
use crate::token::{FileTokenStore, TokenStore};
use crate::transport::{ApiClient, Wire};
use crate::visuals::VisualStore;

/// Everything one front end needs, wired once. Stores share the same
/// client, cache and notifier.
pub struct Session {
    pub auth: AuthService,
    pub categories: CategoryStore,
    pub tasks: TaskStore,
    pub recorder: Arc<Recorder>,
    mock: Option<Arc<MockApi>>,
}

impl Session {
    /// Opens a session against the configured backend, with the token and
    /// visual preferences kept under `data_dir`.
    #[tracing::instrument(skip(cfg))]
    pub fn open(cfg: &Config, data_dir: &Path, backend: Backend) -> anyhow::Result<Self> {
        let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(data_dir));
        let visuals = Arc::new(VisualStore::open(data_dir));

        match backend {
            Backend::Http => {
                let url = cfg.api_url();
                let wire = HttpWire::new(&url, cfg.api_timeout()?)
                    .with_context(|| format!("failed to build HTTP client for {url}"))?;
                info!(url = %url, "using HTTP backend");
                Ok(Self::assemble(Arc::new(wire), tokens, visuals, None))
            }
            Backend::Mock => {
                let mock = Arc::new(MockApi::seeded());
                mock.set_latency(cfg.mock_latency()?);
                // The mock forgets its sessions between runs; honor a
                // token left by an earlier `login --mock`.
                if let Some(token) = tokens.load() {
                    debug!("re-admitting stored token in mock backend");
                    mock.accept_token(&token, DEMO_USERNAME);
                }
                info!("using in-memory mock backend");
                Ok(Self::assemble(mock.clone(), tokens, visuals, Some(mock)))
            }
        }
    }

    /// A session over an arbitrary wire.
    pub fn with_wire(wire: Arc<dyn Wire>, tokens: Arc<dyn TokenStore>, visuals: Arc<VisualStore>) -> Self {
        Self::assemble(wire, tokens, visuals, None)
    }

    fn assemble(
        wire: Arc<dyn Wire>,
        tokens: Arc<dyn TokenStore>,
        visuals: Arc<VisualStore>,
        mock: Option<Arc<MockApi>>,
    ) -> Self {
        let recorder = Recorder::new();
        let api = ApiClient::new(wire, tokens, recorder.clone());
        let categories = CategoryStore::new(api.clone(), visuals);
        let tasks = TaskStore::new(categories.clone());
        Self {
            auth: AuthService::new(api),
            categories,
            tasks,
            recorder,
            mock,
        }
    }

    pub fn visuals(&self) -> &VisualStore {
        self.categories.visuals()
    }

    /// The in-memory backend, when the session runs against it.
    pub fn mock(&self) -> Option<&Arc<MockApi>> {
        self.mock.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_session_honors_stored_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        FileTokenStore::new(dir.path()).save("left-over").expect("save");

        let session = Session::open(&Config::default(), dir.path(), Backend::Mock).expect("open");

        assert!(session.mock().is_some());
        let categories = session.categories.all().await.expect("fetch");
        assert_eq!(categories.len(), 5);
    }

    #[tokio::test]
    async fn mock_session_without_token_is_unauthenticated() {
        let dir = tempfile::tempdir().expect("tempdir");

        let session = Session::open(&Config::default(), dir.path(), Backend::Mock).expect("open");

        assert!(!session.auth.is_authenticated());
        let err = session.categories.all().await.expect_err("no token");
        assert!(matches!(err, crate::error::Error::Unauthenticated));
    }
}
