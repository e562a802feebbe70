use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A second signal arriving within this window of the first is treated as
/// "operator means it", per spec.md §5: "repeat signals within a grace
/// window terminate without cleanup".
const REPEAT_SIGNAL_GRACE: Duration = Duration::from_secs(5);

/// Spawns a task that triggers `cancel` on SIGINT, SIGQUIT, or SIGTERM
/// (spec.md §4.7 Cleanup, §5 Cancellation). The controller observes
/// `cancel` at its cooperative boundaries (poll sleep, retry backoff,
/// quiesce/post-compose sleeps) and performs staging cleanup itself; this
/// function only owns signal registration. A second signal within
/// `REPEAT_SIGNAL_GRACE` of the first bypasses the controller entirely and
/// exits the process immediately, without staging cleanup.
pub fn install_signal_handlers(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(event = "signals.register_failed", signal = "SIGINT", error = %e);
                return;
            }
        };
        let mut sigquit = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::quit()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(event = "signals.register_failed", signal = "SIGQUIT", error = %e);
                return;
            }
        };
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(event = "signals.register_failed", signal = "SIGTERM", error = %e);
                return;
            }
        };

        loop {
            let signal_name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigquit.recv() => "SIGQUIT",
                _ = sigterm.recv() => "SIGTERM",
            };
            tracing::warn!(event = "signals.received", signal = signal_name);
            cancel.cancel();

            let repeat_signal = tokio::select! {
                _ = sigint.recv() => true,
                _ = sigquit.recv() => true,
                _ = sigterm.recv() => true,
                _ = tokio::time::sleep(REPEAT_SIGNAL_GRACE) => false,
            };
            if repeat_signal {
                tracing::warn!(
                    event = "signals.repeat_received",
                    "second signal within grace window, terminating without cleanup"
                );
                std::process::exit(130);
            }
            break;
        }
    });
}
