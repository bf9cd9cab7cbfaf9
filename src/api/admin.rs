use std::sync::Arc;

use super::{ApiError, Caller};
use crate::feed::BulkRefreshOutcome;
use crate::scheduler::{RefreshScheduler, SchedulerStatus};

pub const DEFAULT_CHECK_INTERVAL_MINUTES: u32 = 5;
const CHECK_INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 1..=60;

/// Scheduler controls for privileged callers.
///
/// Every operation rejects non-admin callers before touching the scheduler.
#[derive(Clone)]
pub struct AdminControl {
    scheduler: Arc<RefreshScheduler>,
}

impl AdminControl {
    pub fn new(scheduler: Arc<RefreshScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn status(&self, caller: &Caller) -> Result<SchedulerStatus, ApiError> {
        require_admin(caller)?;
        Ok(self.scheduler.status())
    }

    /// Start the scheduler; `None` uses a 5 minute interval.
    ///
    /// Starting an already running scheduler is a no-op; the returned status
    /// shows the interval actually in effect.
    pub fn start(
        &self,
        caller: &Caller,
        check_interval_minutes: Option<u32>,
    ) -> Result<SchedulerStatus, ApiError> {
        require_admin(caller)?;

        let minutes = check_interval_minutes.unwrap_or(DEFAULT_CHECK_INTERVAL_MINUTES);
        if !CHECK_INTERVAL_RANGE.contains(&minutes) {
            return Err(ApiError::InvalidInput(format!(
                "check interval must be between {} and {} minutes, got {minutes}",
                CHECK_INTERVAL_RANGE.start(),
                CHECK_INTERVAL_RANGE.end()
            )));
        }

        tracing::info!(user_id = %caller.user_id, minutes, "Admin starting scheduler");
        self.scheduler.start(minutes);
        Ok(self.scheduler.status())
    }

    pub fn stop(&self, caller: &Caller) -> Result<SchedulerStatus, ApiError> {
        require_admin(caller)?;

        tracing::info!(user_id = %caller.user_id, "Admin stopping scheduler");
        self.scheduler.stop();
        Ok(self.scheduler.status())
    }

    /// Run one refresh cycle and return its outcome; cycle errors propagate.
    pub async fn run_once(&self, caller: &Caller) -> Result<BulkRefreshOutcome, ApiError> {
        require_admin(caller)?;

        tracing::info!(user_id = %caller.user_id, "Admin triggered refresh cycle");
        Ok(self.scheduler.run_refresh_cycle().await?)
    }
}

fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.is_admin() {
        Ok(())
    } else {
        tracing::warn!(user_id = %caller.user_id, "Non-admin caller rejected");
        Err(ApiError::Forbidden("admin privileges required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::feed::{FeedClient, SyncEngine};
    use crate::storage::MemoryStore;

    fn control() -> AdminControl {
        let store = MemoryStore::new();
        let client = FeedClient::new(&HttpConfig::default()).unwrap();
        let engine = SyncEngine::new(Arc::new(store.clone()), Arc::new(store), client);
        AdminControl::new(Arc::new(RefreshScheduler::new(Arc::new(engine))))
    }

    #[tokio::test]
    async fn test_non_admin_rejected_everywhere() {
        let control = control();
        let user = Caller::user("u1");

        assert!(matches!(control.status(&user), Err(ApiError::Forbidden(_))));
        assert!(matches!(control.start(&user, None), Err(ApiError::Forbidden(_))));
        assert!(matches!(control.stop(&user), Err(ApiError::Forbidden(_))));
        assert!(matches!(
            control.run_once(&user).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(!control.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_admin_lifecycle() {
        let control = control();
        let admin = Caller::admin("root");

        let started = control.start(&admin, None).unwrap();
        assert!(started.is_running);
        assert_eq!(started.check_interval_minutes, Some(5));

        // Already running: interval stays as first configured
        let again = control.start(&admin, Some(30)).unwrap();
        assert_eq!(again.check_interval_minutes, Some(5));

        let stopped = control.stop(&admin).unwrap();
        assert!(!stopped.is_running);
    }

    #[tokio::test]
    async fn test_start_interval_bounds() {
        let control = control();
        let admin = Caller::admin("root");

        for minutes in [0, 61] {
            assert!(matches!(
                control.start(&admin, Some(minutes)),
                Err(ApiError::InvalidInput(_))
            ));
        }
        assert!(!control.status(&admin).unwrap().is_running);

        assert!(control.start(&admin, Some(60)).unwrap().is_running);
        control.stop(&admin).unwrap();
    }

    #[tokio::test]
    async fn test_run_once_with_no_sources() {
        let control = control();
        let outcome = control.run_once(&Caller::admin("root")).await.unwrap();
        assert_eq!(outcome, BulkRefreshOutcome::default());
    }
}
