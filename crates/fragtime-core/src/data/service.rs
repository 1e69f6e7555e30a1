use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AdapterKind, DataAdapter, LocalAdapter, RemoteAdapter};
use crate::error::Result;
use crate::models::{
    NewTaskRecord, PointsStats, PreferencePatch, TaskRecord, TaskRecordPatch, TaskStats,
    TaskStatus, UserPreference,
};
use crate::points::PointsService;
use crate::remote::RemoteBackend;
use crate::session::SessionContext;
use crate::storage::LocalStore;

/// Routes every call to the adapter the current session calls for, and
/// refreshes points after writes that change them.
pub struct DataService {
    session: SessionContext,
    local: LocalAdapter,
    remote: RemoteAdapter,
    points: PointsService,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl DataService {
    pub fn new(
        session: SessionContext,
        local: LocalStore,
        backend: Arc<dyn RemoteBackend>,
    ) -> Self {
        Self {
            local: LocalAdapter::new(local),
            remote: RemoteAdapter::new(backend.clone(), session.clone()),
            points: PointsService::new(backend, session.clone()),
            session,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::for_session(&self.session.snapshot())
    }

    pub fn adapter(&self) -> &dyn DataAdapter {
        match self.adapter_kind() {
            AdapterKind::Local => &self.local,
            AdapterKind::Remote => &self.remote,
        }
    }

    pub fn points(&self) -> &PointsService {
        &self.points
    }

    /// Wait for background points refreshes started so far.
    pub async fn settle(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self
                .background
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Recompute points in the background for registered users. Failures are
    /// logged and never reach the caller.
    fn refresh_points(&self) {
        if !self.points.is_supported() {
            return;
        }
        let points = self.points.clone();
        let handle = tokio::spawn(async move {
            match points.recompute().await {
                Ok(()) => debug!("points recomputed"),
                Err(e) => warn!(error = %e, "failed to recompute points"),
            }
        });
        let mut pending = self
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

#[async_trait]
impl DataAdapter for DataService {
    async fn task_records(&self) -> Result<Vec<TaskRecord>> {
        self.adapter().task_records().await
    }

    async fn add_task_record(&self, record: NewTaskRecord) -> Result<TaskRecord> {
        let stored = self.adapter().add_task_record(record).await?;
        if stored.status == TaskStatus::Completed {
            self.refresh_points();
        }
        Ok(stored)
    }

    async fn update_task_record(
        &self,
        id: &str,
        patch: &TaskRecordPatch,
    ) -> Result<Option<TaskRecord>> {
        let updated = self.adapter().update_task_record(id, patch).await?;
        if updated.is_some() && patch.completes() {
            self.refresh_points();
        }
        Ok(updated)
    }

    async fn delete_task_record(&self, id: &str) -> Result<bool> {
        let deleted = self.adapter().delete_task_record(id).await?;
        if deleted {
            self.refresh_points();
        }
        Ok(deleted)
    }

    async fn user_preferences(&self) -> Result<UserPreference> {
        self.adapter().user_preferences().await
    }

    async fn update_user_preferences(&self, patch: &PreferencePatch) -> Result<UserPreference> {
        self.adapter().update_user_preferences(patch).await
    }

    async fn task_stats(&self) -> Result<TaskStats> {
        self.adapter().task_stats().await
    }

    async fn user_points_stats(&self) -> Result<Option<PointsStats>> {
        self.adapter().user_points_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, CoreError};
    use crate::remote::MemoryBackend;
    use crate::session::{Session, User};
    use crate::storage::MemoryStore;

    fn service(session: Session) -> (Arc<MemoryBackend>, LocalStore, DataService) {
        let backend = Arc::new(MemoryBackend::new());
        let store = LocalStore::new(Arc::new(MemoryStore::new()));
        let service = DataService::new(SessionContext::new(session), store.clone(), backend.clone());
        (backend, store, service)
    }

    fn registered() -> Session {
        Session::signed_in(
            User {
                id: "u1".into(),
                email: None,
                name: None,
            },
            "token",
        )
    }

    #[tokio::test]
    async fn guest_with_token_stays_local() {
        let mut session = registered();
        session.guest_mode = true;
        let (backend, store, service) = service(session);
        assert_eq!(service.adapter_kind(), AdapterKind::Local);

        let mut record = NewTaskRecord::started("Tidy desk", 300);
        record.status = TaskStatus::Completed;
        record.actual_duration = Some(300);
        service.add_task_record(record).await.unwrap();
        service.settle().await;

        assert_eq!(store.task_records().len(), 1);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn completion_triggers_recompute() {
        let (backend, _, service) = service(registered());
        let record = service
            .add_task_record(NewTaskRecord::started("Stretch", 300))
            .await
            .unwrap();
        service.settle().await;
        assert!(backend.rpc_calls().is_empty());

        service
            .update_task_record(&record.id, &TaskRecordPatch::finish(TaskStatus::Completed, 300))
            .await
            .unwrap();
        service.settle().await;
        assert_eq!(backend.rpc_calls().len(), 1);

        assert!(service.delete_task_record(&record.id).await.unwrap());
        service.settle().await;
        assert_eq!(backend.rpc_calls().len(), 2);
    }

    #[tokio::test]
    async fn recompute_failure_is_not_surfaced() {
        let (backend, _, service) = service(registered());
        backend.fail_table("rpc/update_user_points_stats", BackendError::new("boom"));
        let mut record = NewTaskRecord::started("Stretch", 300);
        record.status = TaskStatus::Completed;
        record.actual_duration = Some(120);
        let stored = service.add_task_record(record).await.unwrap();
        service.settle().await;
        assert_eq!(stored.points_earned, Some(2));
    }

    #[tokio::test]
    async fn anonymous_session_is_rejected() {
        let (_, _, service) = service(Session::default());
        assert!(matches!(
            service.task_records().await,
            Err(CoreError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn routing_follows_session_changes() {
        let backend = Arc::new(MemoryBackend::new());
        let store = LocalStore::new(Arc::new(MemoryStore::new()));
        let session = SessionContext::new(Session::guest());
        let service = DataService::new(session.clone(), store, backend.clone());
        assert_eq!(service.adapter_kind(), AdapterKind::Local);

        session.set(registered());
        assert_eq!(service.adapter_kind(), AdapterKind::Remote);
        service.task_records().await.unwrap();
        assert_eq!(backend.calls(), 1);
    }
}
