use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{AuthProvider, SignUpOutcome};
use crate::error::Result;
use crate::migration::{MigrationReport, MigrationService};
use crate::session::{Session, SessionContext};
use crate::storage::{KeyValueStore, LocalStore};

/// Key holding the persisted guest flag.
pub const AUTH_STATE_KEY: &str = "auth_state";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    guest_mode: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthOutcome {
    /// Sign-up succeeded but the email must be confirmed before signing in.
    pub needs_verification: bool,
    /// Present when guest data was migrated as part of the flow.
    pub migration: Option<MigrationReport>,
}

/// Owns the session lifecycle and writes it into the shared context.
pub struct AuthStore {
    session: SessionContext,
    provider: Arc<dyn AuthProvider>,
    local: LocalStore,
    migration: MigrationService,
    state: Option<Arc<dyn KeyValueStore>>,
}

impl AuthStore {
    pub fn new(
        session: SessionContext,
        provider: Arc<dyn AuthProvider>,
        local: LocalStore,
        migration: MigrationService,
    ) -> Self {
        Self {
            session,
            provider,
            local,
            migration,
            state: None,
        }
    }

    /// Remember the guest flag across runs in `kv`.
    pub fn with_persistence(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.state = Some(kv);
        self
    }

    pub fn session(&self) -> Session {
        self.session.snapshot()
    }

    pub fn context(&self) -> &SessionContext {
        &self.session
    }

    /// Restore the provider session; without one, fall back to guest mode
    /// when guest mode was chosen before or guest data exists.
    pub async fn initialize(&self) -> Result<Session> {
        let session = match self.provider.current_session().await? {
            Some(provider_session) => {
                Session::signed_in(provider_session.user, provider_session.access_token)
            }
            None => {
                let guest = self.persisted().guest_mode || self.local.has_guest_data();
                if guest {
                    info!("no account session, continuing in guest mode");
                }
                Session {
                    guest_mode: guest,
                    ..Session::default()
                }
            }
        };
        self.session.set(session.clone());
        self.persist();
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthOutcome> {
        let provider_session = self.provider.sign_in(email, password).await?;
        info!(user = %provider_session.user.id, "signed in");
        self.session.set(Session::signed_in(
            provider_session.user,
            provider_session.access_token,
        ));
        self.persist();

        let migration = if self.migration.should_show_migration_prompt() {
            self.migration.silent_migration_report().await
        } else {
            None
        };
        if let Some(report) = migration.as_ref().filter(|r| !r.success) {
            warn!(error = ?report.error, "silent migration after sign-in failed");
        }
        Ok(AuthOutcome {
            needs_verification: false,
            migration,
        })
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<AuthOutcome> {
        let provider_session = match self.provider.sign_up(email, password, name).await? {
            SignUpOutcome::NeedsVerification { .. } => {
                info!("sign-up needs email verification");
                return Ok(AuthOutcome {
                    needs_verification: true,
                    migration: None,
                });
            }
            SignUpOutcome::SignedIn(provider_session) => provider_session,
        };
        info!(user = %provider_session.user.id, "signed up");
        self.session.set(Session::signed_in(
            provider_session.user,
            provider_session.access_token,
        ));
        self.persist();

        let migration = if self.migration.should_show_migration_prompt() {
            Some(self.migration.migrate_guest_data().await)
        } else {
            None
        };
        Ok(AuthOutcome {
            needs_verification: false,
            migration,
        })
    }

    /// Guests lose their local data; registered users are signed out at
    /// the provider.
    pub async fn sign_out(&self) -> Result<()> {
        if self.session.is_guest() {
            self.local.clear_guest_data();
            info!("guest session ended, local data cleared");
        } else {
            self.provider.sign_out().await?;
            info!("signed out");
        }
        self.session.set(Session::default());
        self.persist();
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.provider.reset_password(email).await?;
        Ok(())
    }

    /// Entering guest mode drops the current user; leaving it discards the
    /// guest data.
    pub fn set_guest_mode(&self, enabled: bool) {
        if enabled {
            self.session.set(Session::guest());
        } else {
            self.session.update(|s| s.guest_mode = false);
            self.local.clear_guest_data();
            info!("left guest mode, local data cleared");
        }
        self.persist();
    }

    fn persisted(&self) -> PersistedState {
        let Some(kv) = &self.state else {
            return PersistedState::default();
        };
        match kv.get(AUTH_STATE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => PersistedState::default(),
            Err(e) => {
                warn!(error = %e, "failed to read auth state");
                PersistedState::default()
            }
        }
    }

    fn persist(&self) {
        let Some(kv) = &self.state else {
            return;
        };
        let state = PersistedState {
            guest_mode: self.session.is_guest(),
        };
        let result = serde_json::to_string(&state)
            .map_err(|e| e.to_string())
            .and_then(|json| kv.set(AUTH_STATE_KEY, &json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(error = %e, "failed to persist auth state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ProviderSession;
    use crate::data::DataService;
    use crate::error::{AuthError, CoreError};
    use crate::models::{NewTaskRecord, TaskRecordPatch, TaskStatus};
    use crate::remote::MemoryBackend;
    use crate::session::User;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProvider {
        stored: Mutex<Option<ProviderSession>>,
        verify_sign_up: bool,
        sign_outs: AtomicUsize,
    }

    fn provider_session(id: &str) -> ProviderSession {
        ProviderSession {
            user: User {
                id: id.into(),
                email: Some(format!("{id}@example.com")),
                name: None,
            },
            access_token: format!("token-{id}"),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[async_trait]
    impl AuthProvider for FakeProvider {
        async fn current_session(&self) -> std::result::Result<Option<ProviderSession>, AuthError> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn sign_in(
            &self,
            _email: &str,
            password: &str,
        ) -> std::result::Result<ProviderSession, AuthError> {
            if password != "secret" {
                return Err(AuthError::SignInFailed("Invalid login credentials".into()));
            }
            let session = provider_session("u1");
            *self.stored.lock().unwrap() = Some(session.clone());
            Ok(session)
        }

        async fn sign_up(
            &self,
            _email: &str,
            _password: &str,
            _name: Option<&str>,
        ) -> std::result::Result<SignUpOutcome, AuthError> {
            if self.verify_sign_up {
                Ok(SignUpOutcome::NeedsVerification { user: None })
            } else {
                Ok(SignUpOutcome::SignedIn(provider_session("u2")))
            }
        }

        async fn sign_out(&self) -> std::result::Result<(), AuthError> {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = None;
            Ok(())
        }

        async fn reset_password(&self, _email: &str) -> std::result::Result<(), AuthError> {
            Ok(())
        }
    }

    struct Fixture {
        provider: Arc<FakeProvider>,
        backend: Arc<MemoryBackend>,
        local: LocalStore,
        kv: Arc<MemoryStore>,
        store: AuthStore,
    }

    fn fixture(provider: FakeProvider) -> Fixture {
        let provider = Arc::new(provider);
        let backend = Arc::new(MemoryBackend::new());
        let kv = Arc::new(MemoryStore::new());
        let local = LocalStore::new(kv.clone());
        let session = SessionContext::default();
        let data = Arc::new(DataService::new(session.clone(), local.clone(), backend.clone()));
        let migration = MigrationService::new(local.clone(), data, session.clone());
        let store = AuthStore::new(session, provider.clone(), local.clone(), migration)
            .with_persistence(kv.clone());
        Fixture {
            provider,
            backend,
            local,
            kv,
            store,
        }
    }

    fn add_guest_record(local: &LocalStore, secs: u64) {
        let record = local
            .add_task_record(NewTaskRecord::started("guest work", secs))
            .unwrap();
        local
            .update_task_record(&record.id, &TaskRecordPatch::finish(TaskStatus::Completed, secs))
            .unwrap();
    }

    #[tokio::test]
    async fn initialize_without_session_or_data_is_anonymous() {
        let f = fixture(FakeProvider::default());
        let session = f.store.initialize().await.unwrap();
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn initialize_with_guest_data_enters_guest_mode() {
        let f = fixture(FakeProvider::default());
        add_guest_record(&f.local, 60);
        let session = f.store.initialize().await.unwrap();
        assert!(session.guest_mode);
        assert_eq!(session.user_id(), Some("guest"));
    }

    #[tokio::test]
    async fn initialize_with_provider_session_is_registered() {
        let provider = FakeProvider::default();
        *provider.stored.lock().unwrap() = Some(provider_session("u9"));
        let f = fixture(provider);
        add_guest_record(&f.local, 60);
        let session = f.store.initialize().await.unwrap();
        assert!(!session.guest_mode);
        assert_eq!(session.registered_user_id(), Some("u9"));
    }

    #[tokio::test]
    async fn guest_flag_survives_restart() {
        let f = fixture(FakeProvider::default());
        f.store.set_guest_mode(true);
        assert!(f.kv.get(AUTH_STATE_KEY).unwrap().is_some());

        let session = f.store.initialize().await.unwrap();
        assert!(session.guest_mode);
    }

    #[tokio::test]
    async fn sign_in_silently_migrates_small_guest_data() {
        let f = fixture(FakeProvider::default());
        f.store.set_guest_mode(true);
        add_guest_record(&f.local, 120);

        let outcome = f.store.sign_in("a@example.com", "secret").await.unwrap();
        let report = outcome.migration.unwrap();
        assert!(report.success);
        assert_eq!(report.migrated_records, 1);
        assert!(!f.local.has_guest_data());
        assert!(!f.store.session().guest_mode);
        assert_eq!(f.backend.rows("task_records").len(), 1);
    }

    #[tokio::test]
    async fn sign_in_leaves_large_guest_data_for_prompt() {
        let f = fixture(FakeProvider::default());
        add_guest_record(&f.local, 3600);
        let outcome = f.store.sign_in("a@example.com", "secret").await.unwrap();
        assert!(outcome.migration.is_none());
        assert!(f.local.has_guest_data());
    }

    #[tokio::test]
    async fn failed_sign_in_keeps_session() {
        let f = fixture(FakeProvider::default());
        f.store.set_guest_mode(true);
        let err = f.store.sign_in("a@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, CoreError::Auth(AuthError::SignInFailed(_))));
        assert!(f.store.session().guest_mode);
    }

    #[tokio::test]
    async fn sign_up_needing_verification_changes_nothing() {
        let f = fixture(FakeProvider {
            verify_sign_up: true,
            ..FakeProvider::default()
        });
        add_guest_record(&f.local, 60);
        let outcome = f.store.sign_up("b@example.com", "pw", None).await.unwrap();
        assert!(outcome.needs_verification);
        assert!(f.store.session().user.is_none());
        assert!(f.local.has_guest_data());
    }

    #[tokio::test]
    async fn sign_up_migrates_all_guest_data() {
        let f = fixture(FakeProvider::default());
        add_guest_record(&f.local, 3600);
        let outcome = f.store.sign_up("b@example.com", "pw", Some("Bea")).await.unwrap();
        assert_eq!(outcome.migration.unwrap().migrated_records, 1);
        assert_eq!(f.store.session().registered_user_id(), Some("u2"));
        assert!(!f.local.has_guest_data());
    }

    #[tokio::test]
    async fn guest_sign_out_clears_local_data_only() {
        let f = fixture(FakeProvider::default());
        f.store.set_guest_mode(true);
        add_guest_record(&f.local, 60);
        f.store.sign_out().await.unwrap();
        assert!(!f.local.has_guest_data());
        assert!(!f.store.session().is_authenticated());
        assert_eq!(f.provider.sign_outs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registered_sign_out_calls_provider() {
        let f = fixture(FakeProvider::default());
        f.store.sign_in("a@example.com", "secret").await.unwrap();
        f.store.sign_out().await.unwrap();
        assert_eq!(f.provider.sign_outs.load(Ordering::SeqCst), 1);
        assert!(f.store.session().user.is_none());
    }

    #[tokio::test]
    async fn guest_mode_toggle() {
        let f = fixture(FakeProvider::default());
        f.store.sign_in("a@example.com", "secret").await.unwrap();
        f.store.set_guest_mode(true);
        let session = f.store.session();
        assert!(session.guest_mode);
        assert!(session.user.is_none());
        assert!(session.access_token.is_none());

        add_guest_record(&f.local, 60);
        f.store.set_guest_mode(false);
        assert!(!f.store.session().guest_mode);
        assert!(!f.local.has_guest_data());
    }
}
