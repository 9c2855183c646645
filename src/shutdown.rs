//! Ctrl+C handling for long uploads.
//!
//! The first SIGINT or SIGTERM cancels the returned token: no new uploads
//! start, running ones finish and queued album additions are still sent. A
//! second signal exits immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

/// Exit status after a forced shutdown (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

/// Spawn the signal listener. Must be called from within a tokio runtime.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    log::warn!("Cannot listen for SIGTERM: {e}");
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            let received = match sigterm.as_mut() {
                Some(sigterm) => tokio::select! {
                    r = tokio::signal::ctrl_c() => r,
                    _ = sigterm.recv() => Ok(()),
                },
                None => tokio::signal::ctrl_c().await,
            };
            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await;

            if let Err(e) = received {
                log::warn!("Cannot listen for Ctrl+C: {e}");
                return;
            }

            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                log::warn!("Interrupted, finishing uploads in progress...");
                log::warn!("Press Ctrl+C again to quit immediately");
                handler_token.cancel();
            } else {
                log::warn!("Forced exit");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_starts_live() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn children_see_cancellation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
