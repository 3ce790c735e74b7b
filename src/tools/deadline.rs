//! Bounded waiting on collaborator calls.
//!
//! Each call runs on its own thread; the caller waits at most `timeout` and
//! polls the case's [`CancelToken`] while waiting. A call that overruns is
//! abandoned: its thread finishes in the background and its result is
//! dropped. Collaborators are read-only, so an abandoned call leaves nothing
//! behind.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

use super::{ToolFailure, ToolOutcome};

/// How often a waiting caller checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Run `call` with a deadline, mapping overruns to [`ToolFailure::Timeout`].
pub fn run_with_deadline<T, F>(
    tool: &str,
    timeout: Duration,
    cancel: &CancelToken,
    call: F,
) -> ToolOutcome<T>
where
    T: Send + 'static,
    F: FnOnce() -> ToolOutcome<T> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(ToolFailure::Cancelled { tool: tool.into() });
    }

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("factdesk-{tool}"))
        .spawn(move || {
            // The receiver is gone if the caller already gave up.
            let _ = tx.send(call());
        })
        .map_err(|e| ToolFailure::unavailable(tool, format!("could not spawn worker: {e}")))?;

    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(ToolFailure::Cancelled { tool: tool.into() });
        }
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            tracing::warn!(tool, secs = timeout.as_secs(), "collaborator call timed out");
            return Err(ToolFailure::Timeout {
                tool: tool.into(),
                secs: timeout.as_secs(),
            });
        }
        match rx.recv_timeout(remaining.min(CANCEL_POLL)) {
            Ok(outcome) => return outcome,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ToolFailure::unavailable(
                    tool,
                    "worker exited without a result",
                ));
            }
        }
    }
}
