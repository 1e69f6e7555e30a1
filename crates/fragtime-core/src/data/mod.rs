//! Storage-agnostic access to task records and preferences.
//!
//! Two [`DataAdapter`] implementations share one contract: the guest
//! [`LocalAdapter`] over the local document, and the [`RemoteAdapter`] over
//! the user's backend tables. [`DataService`] picks one per call from the
//! current session.

mod local;
mod remote;
mod service;

pub use local::LocalAdapter;
pub use remote::{RemoteAdapter, PREFERENCES_TABLE, TASK_RECORDS_TABLE, UNTITLED_TASK};
pub use service::DataService;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    NewTaskRecord, PointsStats, PreferencePatch, TaskRecord, TaskRecordPatch, TaskStats,
    UserPreference,
};
use crate::session::Session;

#[async_trait]
pub trait DataAdapter: Send + Sync {
    /// All records, newest first.
    async fn task_records(&self) -> Result<Vec<TaskRecord>>;

    async fn add_task_record(&self, record: NewTaskRecord) -> Result<TaskRecord>;

    /// `None` when no record has this id.
    async fn update_task_record(
        &self,
        id: &str,
        patch: &TaskRecordPatch,
    ) -> Result<Option<TaskRecord>>;

    /// `false` when nothing was deleted.
    async fn delete_task_record(&self, id: &str) -> Result<bool>;

    /// Current preferences, created with defaults when absent.
    async fn user_preferences(&self) -> Result<UserPreference>;

    async fn update_user_preferences(&self, patch: &PreferencePatch) -> Result<UserPreference>;

    async fn task_stats(&self) -> Result<TaskStats>;

    async fn user_points_stats(&self) -> Result<Option<PointsStats>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Local,
    Remote,
}

impl AdapterKind {
    /// Guest mode always means local, even when a token is also present.
    pub fn for_session(session: &Session) -> Self {
        if session.guest_mode {
            AdapterKind::Local
        } else {
            AdapterKind::Remote
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::User;

    #[test]
    fn adapter_follows_guest_flag() {
        assert_eq!(AdapterKind::for_session(&Session::guest()), AdapterKind::Local);
        assert_eq!(AdapterKind::for_session(&Session::default()), AdapterKind::Remote);

        let mut session = Session::signed_in(
            User {
                id: "u1".into(),
                email: None,
                name: None,
            },
            "token",
        );
        assert_eq!(AdapterKind::for_session(&session), AdapterKind::Remote);
        session.guest_mode = true;
        assert_eq!(AdapterKind::for_session(&session), AdapterKind::Local);
    }
}
