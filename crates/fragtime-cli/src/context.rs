//! Wiring shared by every command: storage, session, data and auth.

use std::sync::Arc;

use async_trait::async_trait;
use fragtime_core::auth::{AuthProvider, ProviderSession, SignUpOutcome};
use fragtime_core::error::AuthError;
use fragtime_core::remote::RemoteBackend;
use fragtime_core::storage::{Config, Database, KeyValueStore, LocalStore};
use fragtime_core::{
    AccountService, AuthStore, DataService, MemoryBackend, MigrationService, RestAuthProvider,
    RestBackend, SessionContext, TaskCatalog,
};
use tracing::debug;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const OFFLINE_MESSAGE: &str =
    "no backend configured; set backend.url and backend.anon_key (or FRAGTIME_BACKEND_URL / FRAGTIME_ANON_KEY)";

/// Stands in for the identity service when no backend is configured.
/// Offline runs are always guest runs; account operations fail with a hint.
struct OfflineAuth;

#[async_trait]
impl AuthProvider for OfflineAuth {
    async fn current_session(&self) -> Result<Option<ProviderSession>, AuthError> {
        Ok(None)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<ProviderSession, AuthError> {
        Err(AuthError::SignInFailed(OFFLINE_MESSAGE.to_string()))
    }

    async fn sign_up(
        &self,
        _email: &str,
        _password: &str,
        _name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        Err(AuthError::SignUpFailed(OFFLINE_MESSAGE.to_string()))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn reset_password(&self, _email: &str) -> Result<(), AuthError> {
        Err(AuthError::Request(OFFLINE_MESSAGE.to_string()))
    }
}

pub struct AppContext {
    pub db: Arc<Database>,
    pub config: Config,
    pub data: Arc<DataService>,
    pub migration: MigrationService,
    pub auth: AuthStore,
    pub account: AccountService,
    /// `None` when no backend is configured.
    pub catalog: Option<TaskCatalog>,
}

impl AppContext {
    /// Open the database, restore the session and build the services.
    pub async fn open() -> CliResult<Self> {
        let db = Arc::new(Database::open()?);
        let config = Config::load_or_default();
        let kv: Arc<dyn KeyValueStore> = db.clone();
        let session = SessionContext::default();
        let local = LocalStore::with_retention(kv.clone(), config.guest_retention());

        let online = config.backend.is_configured();
        let (backend, provider): (Arc<dyn RemoteBackend>, Arc<dyn AuthProvider>) =
            if online {
                let backend = RestBackend::from_config(&config.backend, session.clone())?;
                let provider = RestAuthProvider::from_config(&config.backend, kv.clone())?;
                (Arc::new(backend), Arc::new(provider))
            } else {
                debug!("backend not configured, running offline");
                (Arc::new(MemoryBackend::new()), Arc::new(OfflineAuth))
            };

        let catalog = online.then(|| TaskCatalog::new(backend.clone()));
        let data = Arc::new(DataService::new(session.clone(), local.clone(), backend.clone()));
        let account = AccountService::new(data.clone(), backend, session.clone());
        let migration = MigrationService::new(local.clone(), data.clone(), session.clone());
        let auth = AuthStore::new(session.clone(), provider, local.clone(), migration.clone())
            .with_persistence(kv);
        let restored = auth.initialize().await?;
        if !online && !restored.guest_mode {
            auth.set_guest_mode(true);
        }

        Ok(Self {
            db,
            config,
            data,
            migration,
            auth,
            account,
            catalog,
        })
    }

    pub fn catalog(&self) -> CliResult<&TaskCatalog> {
        self.catalog
            .as_ref()
            .ok_or_else(|| OFFLINE_MESSAGE.into())
    }

    /// Let background points refreshes finish before the process exits.
    pub async fn finish(self) {
        self.data.settle().await;
    }
}

/// Print any serializable value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
