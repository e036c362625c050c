//! Main client entry point.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::auth::{LogNavigator, Navigator, RefreshCoordinator, SessionController, TokenStore};
use crate::config::{ClientConfig, SessionConfig, StorageBackend};
use crate::error::Result;
use crate::models::{SessionStatus, User};
use crate::storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
use crate::transport::{HttpTransport, RequestExecutor};

/// Authenticated dashboard API client.
///
/// Every call attaches the stored access token. When the server answers 401
/// the client refreshes the token once for all concurrent callers and replays
/// the affected requests.
///
/// # Examples
///
/// ```rust,no_run
/// use dash_api::{ApiClient, ClientConfig};
///
/// # async fn example() -> dash_api::Result<()> {
/// let client = ApiClient::builder()
///     .config(ClientConfig::with_base_url("https://dash.example.com/api"))
///     .build()?;
///
/// client.login("ada", "correct horse").await?;
/// let metrics: serde_json::Value = client.get("/metrics/org-1/summary").await?;
/// println!("{metrics}");
/// client.logout().await;
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    store: Arc<TokenStore>,
    refresh: Arc<RefreshCoordinator>,
    executor: Arc<RequestExecutor>,
    session: SessionController,
}

impl ApiClient {
    /// Create a builder for configuring the client.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// Send a request with an optional JSON body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        self.executor.execute(method, path, body).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(serde_json::to_value(body)?))
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(serde_json::to_value(body)?))
            .await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(serde_json::to_value(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::DELETE, path, None).await
    }

    /// Sign in. See [`SessionController::login`].
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<User>> {
        self.session.login(username, password).await
    }

    /// Sign out. See [`SessionController::logout`].
    pub async fn logout(&self) {
        self.session.logout().await
    }

    /// Restore the cached user from `/auth/me` when a token is stored.
    pub async fn rehydrate(&self) -> Result<Option<User>> {
        self.session.rehydrate().await
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Get a reference to the token store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Get a reference to the refresh coordinator.
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("executor", &self.executor)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: Option<ClientConfig>,
    storage: Option<Arc<dyn SessionStorage>>,
    navigator: Option<Arc<dyn Navigator>>,
    reqwest_client: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            storage: None,
            navigator: None,
            reqwest_client: None,
        }
    }

    /// Use this configuration instead of the defaults.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Shorthand for a default configuration pointing at `base_url`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut config = self.config.take().unwrap_or_default();
        config.api.base_url = base_url.into();
        self.config = Some(config);
        self
    }

    /// Set a session storage backend, overriding `session.storage_backend`.
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the hook called when the user has to go back to the login view.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Set a custom reqwest client. It should keep a cookie store.
    pub fn reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.reqwest_client = Some(client);
        self
    }

    /// Build the client, restoring any stored session.
    pub fn build(self) -> Result<ApiClient> {
        let config = self.config.unwrap_or_default();

        let transport = Arc::new(match self.reqwest_client {
            Some(client) => {
                HttpTransport::with_client(client, config.base_url()?, config.api.user_agent.clone())
            }
            None => HttpTransport::from_config(&config)?,
        });

        let storage = self
            .storage
            .unwrap_or_else(|| default_storage(&config.session));
        let store = Arc::new(TokenStore::open(storage, config.session.profile.clone()));
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(LogNavigator));

        let refresh = Arc::new(RefreshCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&navigator),
        ));
        let executor = Arc::new(RequestExecutor::new(
            transport,
            Arc::clone(&store),
            Arc::clone(&refresh),
            config.session.max_auth_replays,
        ));
        let session = SessionController::new(Arc::clone(&executor), Arc::clone(&store), navigator);

        info!(
            base_url = %config.api.base_url,
            profile = %config.session.profile,
            authenticated = store.is_authenticated(),
            "ApiClient initialized"
        );
        Ok(ApiClient {
            store,
            refresh,
            executor,
            session,
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage backend named by the session configuration.
///
/// An unavailable keyring falls back to file storage.
fn default_storage(session: &SessionConfig) -> Arc<dyn SessionStorage> {
    match session.storage_backend {
        StorageBackend::Memory => Arc::new(MemorySessionStorage::new()),
        StorageBackend::File => Arc::new(FileSessionStorage::new(session.storage_dir.clone())),
        StorageBackend::Keyring => {
            #[cfg(feature = "system-keyring")]
            {
                if crate::storage::KeyringSessionStorage::is_available() {
                    return Arc::new(crate::storage::KeyringSessionStorage::new());
                }
                warn!("System keyring unavailable, falling back to file storage");
            }
            #[cfg(not(feature = "system-keyring"))]
            warn!("Built without system-keyring support, falling back to file storage");

            Arc::new(FileSessionStorage::new(session.storage_dir.clone()))
        }
    }
}
