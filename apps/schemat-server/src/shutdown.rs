use tokio_util::sync::CancellationToken;

/// Cancel `token` when the OS asks the process to stop. Spawns a watcher
/// task and returns immediately; if the platform signal hooks cannot be
/// installed, the watcher degrades to plain Ctrl+C.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_stop_request().await;
        tracing::info!("stop requested; shutting down");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_stop_request() {
    use tokio::signal::unix::{signal, SignalKind};

    // SIGTERM from the service manager, SIGINT from the terminal.
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut term), Ok(mut int)) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
            }
        }
        _ => {
            tracing::warn!("signal hooks unavailable; watching Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(windows)]
async fn wait_for_stop_request() {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close, ctrl_shutdown};

    match (ctrl_c(), ctrl_break(), ctrl_close(), ctrl_shutdown()) {
        (Ok(mut c), Ok(mut brk), Ok(mut close), Ok(mut shut)) => {
            tokio::select! {
                _ = c.recv() => {}
                _ = brk.recv() => {}
                _ = close.recv() => {}
                _ = shut.recv() => {}
            }
        }
        _ => {
            tracing::warn!("signal hooks unavailable; watching Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
