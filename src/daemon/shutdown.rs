use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Detects signals sent to the process and turns them into a cancellation. Returns as soon as
/// `cancelation` fires for any other reason too.
///
/// On Windows detached processes can't detect signals sent to them, there `codetally stop`
/// terminates the daemon without a final flush.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = cancelation.cancelled() => {},
        _ = ctrl_c() => {
            info!("Received ctrl-c");
            cancelation.cancel();
        },
        _ = terminate() => {
            info!("Received SIGTERM");
            cancelation.cancel();
        },
    };
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Can't listen for ctrl-c {e:?}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!("Can't listen for SIGTERM {e:?}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
