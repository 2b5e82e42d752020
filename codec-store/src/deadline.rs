//! Supervisory timer for bounded-latency operations.
//!
//! Blocking work (anything that calls into a component module or reflector)
//! runs on the blocking pool while the caller waits on a timer. When the timer
//! fires first the caller gets `TimedOut`, the work's token is cancelled, and
//! whatever the work eventually returns is released or dropped.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::status::StoreError;

pub async fn run_blocking<T, F>(op: &'static str, budget: Duration, work: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Result<T, StoreError> + Send + 'static,
{
    run_blocking_or_release(op, budget, work, drop).await
}

/// Like [`run_blocking`], but a value the caller never receives is handed to
/// `release` instead of being dropped.
///
/// The result travels over a oneshot. Whichever side loses the hand-off owns
/// the value: the worker when the caller already gave up, the caller when the
/// value landed after its timer fired.
pub async fn run_blocking_or_release<T, F, R>(
    op: &'static str,
    budget: Duration,
    work: F,
    release: R,
) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Result<T, StoreError> + Send + 'static,
    R: Fn(T) + Send + Sync + 'static,
{
    let release = std::sync::Arc::new(release);
    let worker_release = release.clone();
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let (tx, mut rx) = oneshot::channel();
    let handle = tokio::task::spawn_blocking(move || {
        if let Err(Ok(late)) = tx.send(work(worker_cancel)) {
            log::warn!("{} finished after its deadline, releasing", op);
            worker_release(late);
        }
    });

    match tokio::time::timeout(budget, &mut rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => {
            // the sender only goes away without a value when the worker panicked
            let reason = match handle.await {
                Err(e) if e.is_panic() => format!("{} panicked", op),
                Err(e) => format!("{} aborted: {}", op, e),
                Ok(()) => format!("{} returned nothing", op),
            };
            log::error!("{}", reason);
            Err(StoreError::Corrupted(reason))
        }
        Err(_) => {
            cancel.cancel();
            rx.close();
            if let Ok(Ok(late)) = rx.try_recv() {
                release(late);
            }
            log::warn!("{} exceeded {:?}, abandoning worker", op, budget);
            Err(StoreError::TimedOut { op, budget })
        }
    }
}

/// Bounds a future that only waits on async state (locks, channels).
pub async fn run_async<T, F>(op: &'static str, budget: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("{} exceeded {:?}", op, budget);
            Err(StoreError::TimedOut { op, budget })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::status::Status;

    #[tokio::test]
    async fn test_fast_work_passes_through() {
        let r = run_blocking("fast", Duration::from_millis(500), |_| Ok(7)).await;
        assert_eq!(r.ok(), Some(7));
    }

    #[tokio::test]
    async fn test_overrun_cancels_worker() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let flag = saw_cancel.clone();
        let r: Result<(), StoreError> = run_blocking("slow", Duration::from_millis(20), move |cancel| {
            for _ in 0..200 {
                if cancel.is_cancelled() {
                    flag.store(true, Ordering::SeqCst);
                    return Err(StoreError::Corrupted("abandoned".to_string()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        })
        .await;
        assert_eq!(Status::of(&r), Status::TimedOut);

        for _ in 0..100 {
            if saw_cancel.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_corrupted() {
        let r: Result<(), StoreError> =
            run_blocking("boom", Duration::from_secs(1), |_| panic!("component exploded")).await;
        assert_eq!(Status::of(&r), Status::Corrupted);
    }

    #[tokio::test]
    async fn test_late_value_is_released() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let r = run_blocking_or_release(
            "late",
            Duration::from_millis(20),
            |_| {
                std::thread::sleep(Duration::from_millis(100));
                Ok(42u32)
            },
            move |v| {
                assert_eq!(v, 42);
                flag.store(true, Ordering::SeqCst);
            },
        )
        .await;
        assert_eq!(Status::of(&r), Status::TimedOut);

        for _ in 0..100 {
            if released.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_delivered_value_is_not_released() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let r = run_blocking_or_release("quick", Duration::from_secs(1), |_| Ok(1u32), move |_| {
            flag.store(true, Ordering::SeqCst)
        })
        .await;
        assert_eq!(r.ok(), Some(1));
        assert!(!released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_async_overrun() {
        let r: Result<(), StoreError> = run_async("wait", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(Status::of(&r), Status::TimedOut);
    }
}
