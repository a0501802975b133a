//! Single-task admission.
//!
//! At most one high-level task runs at a time. Admission checks and claims
//! the busy flag in one atomic step, then hands the work to a tokio task that
//! owns a [`BusyGuard`]; the flag is released when that guard drops, whatever
//! way the task ends.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use liquidgate_core::{DeviceStatus, ExternalId};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::callback::{Completion, CompletionReporter};

/// Owns the device status of one gateway.
#[derive(Debug)]
pub struct TaskGuard {
    busy: AtomicBool,
    online: AtomicBool,
}

impl Default for TaskGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGuard {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            online: AtomicBool::new(true),
        }
    }

    /// Current status; OFFLINE overrides the busy flag.
    pub fn status(&self) -> DeviceStatus {
        if !self.online.load(Ordering::SeqCst) {
            DeviceStatus::Offline
        } else if self.busy.load(Ordering::SeqCst) {
            DeviceStatus::Busy
        } else {
            DeviceStatus::Idle
        }
    }

    /// Record the outcome of a liveness check.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Claim the busy flag if the gateway is idle.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BusyGuard, DeviceStatus> {
        let status = self.status();
        if !status.is_idle() {
            return Err(status);
        }
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| DeviceStatus::Busy)?;
        Ok(BusyGuard {
            guard: Arc::clone(self),
        })
    }

    /// Admit `work` as the single running task.
    ///
    /// Rejects with the current status unless the gateway is idle. Once
    /// admitted, the gateway reads BUSY until the worker has reported its
    /// outcome to `reporter`.
    pub fn admit<F>(
        self: &Arc<Self>,
        task_id: ExternalId,
        reporter: Arc<dyn CompletionReporter>,
        work: F,
    ) -> Result<JoinHandle<()>, DeviceStatus>
    where
        F: Future<Output = liquidgate_core::Result<Option<serde_json::Value>>> + Send + 'static,
    {
        let busy = self.try_acquire()?;
        info!("Task {} admitted", task_id);

        Ok(tokio::spawn(async move {
            let _busy = busy;
            let completion = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(data)) => {
                    info!("Task {} finished", task_id);
                    Completion::success(task_id, data)
                }
                Ok(Err(e)) => {
                    error!("Task {} failed: {}", task_id, e);
                    Completion::failure(task_id, e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Task {} panicked: {}", task_id, message);
                    Completion::failure(task_id, message)
                }
            };
            reporter.report(&completion).await;
        }))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("internal error: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("internal error: {}", s)
    } else {
        "internal error".to_string()
    }
}

/// Holds the busy flag; releases it on drop.
#[derive(Debug)]
pub struct BusyGuard {
    guard: Arc<TaskGuard>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::testing::RecordingReporter;
    use liquidgate_core::GatewayError;
    use tokio::sync::oneshot;

    #[test]
    fn test_offline_overrides_busy() {
        let guard = Arc::new(TaskGuard::new());
        let _busy = guard.try_acquire().unwrap();
        assert_eq!(guard.status(), DeviceStatus::Busy);

        guard.set_online(false);
        assert_eq!(guard.status(), DeviceStatus::Offline);
    }

    #[test]
    fn test_second_acquire_rejected_until_release() {
        let guard = Arc::new(TaskGuard::new());
        let busy = guard.try_acquire().unwrap();
        assert_eq!(guard.try_acquire().unwrap_err(), DeviceStatus::Busy);

        drop(busy);
        assert_eq!(guard.status(), DeviceStatus::Idle);
        assert!(guard.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_busy_gateway_spawns_nothing() {
        let guard = Arc::new(TaskGuard::new());
        let reporter = Arc::new(RecordingReporter::default());
        let (release, wait) = oneshot::channel::<()>();

        let first = guard
            .admit(ExternalId::new(1), reporter.clone(), async move {
                let _ = wait.await;
                Ok(None)
            })
            .unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_flag = ran.clone();
        let rejected = guard.admit(ExternalId::new(2), reporter.clone(), async move {
            ran_flag.store(true, Ordering::SeqCst);
            Ok(None)
        });
        assert_eq!(rejected.unwrap_err(), DeviceStatus::Busy);

        release.send(()).unwrap();
        first.await.unwrap();
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(reporter.completions().len(), 1);
        assert_eq!(guard.status(), DeviceStatus::Idle);
    }

    #[tokio::test]
    async fn test_admitted_task_reads_busy_before_it_runs() {
        let guard = Arc::new(TaskGuard::new());
        let reporter = Arc::new(RecordingReporter::default());
        let observed = Arc::new(std::sync::Mutex::new(None));

        let seen = observed.clone();
        let watcher = guard.clone();
        let handle = guard
            .admit(ExternalId::new(1), reporter, async move {
                *seen.lock().unwrap() = Some(watcher.status());
                Ok(None)
            })
            .unwrap();

        assert_eq!(guard.status(), DeviceStatus::Busy);
        handle.await.unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(DeviceStatus::Busy));
        assert_eq!(guard.status(), DeviceStatus::Idle);
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_reported() {
        let guard = Arc::new(TaskGuard::new());
        let reporter = Arc::new(RecordingReporter::default());

        guard
            .admit(ExternalId::new(1), reporter.clone(), async {
                Err(GatewayError::ResourceExhausted("no unused tips left".to_string()))
            })
            .unwrap()
            .await
            .unwrap();

        guard
            .admit(ExternalId::new(2), reporter.clone(), async {
                if true {
                    panic!("lid mechanism jammed");
                }
                Ok(None)
            })
            .unwrap()
            .await
            .unwrap();

        let completions = reporter.completions();
        assert_eq!(completions[0].code, 500);
        assert!(completions[0].msg.contains("no unused tips"));
        assert_eq!(completions[1].code, 500);
        assert!(completions[1].msg.contains("lid mechanism jammed"));
        assert_eq!(guard.status(), DeviceStatus::Idle);
    }

    #[tokio::test]
    async fn test_offline_gateway_rejects() {
        let guard = Arc::new(TaskGuard::new());
        guard.set_online(false);
        let reporter = Arc::new(RecordingReporter::default());

        let err = guard
            .admit(ExternalId::new(1), reporter, async { Ok(None) })
            .unwrap_err();
        assert_eq!(err, DeviceStatus::Offline);
    }
}
