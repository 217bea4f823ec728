//! # Panic Safety
//!
//! The source wraps every goroutine body in `SafeFunction`, a helper that
//! recovers a panic, logs it through the event callback as an `InternalPanic`
//! (204), and lets the rest of the process keep running. `safe_spawn` is the
//! same contract built on `tokio::spawn` + `JoinHandle::is_panic`.

use std::future::Future;

use crate::error::FabricErrorCode;

/// Spawns `fut` on the runtime. If it panics, the panic is caught and logged
/// as an [`FabricErrorCode::InternalPanic`] instead of propagating and taking
/// down whatever awaited the join handle.
pub fn safe_spawn<F>(label: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let handle = tokio::spawn(fut);
        if let Err(join_err) = handle.await {
            if join_err.is_panic() {
                tracing::error!(
                    code = FabricErrorCode::InternalPanic.code(),
                    task = label,
                    "recovered panic in spawned task: {join_err}",
                );
            }
        }
    });
}
