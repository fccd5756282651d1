//! Session accounting and the commit cycle.

pub mod controller;
pub mod session;

use anyhow::Result;
use controller::TrackingController;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::secret::Secret;

use super::storage::tracking_log::TrackingLog;

/// Executes the tracking event loop: starts a session, ticks until `shutdown` fires and then
/// stops the session. Cancels `shutdown` on the way out so sibling tasks end too.
pub async fn run_tracking<L: TrackingLog>(
    mut controller: TrackingController<L>,
    token: Option<Secret>,
    shutdown: CancellationToken,
) -> Result<()> {
    let result = drive(&mut controller, token, &shutdown).await;
    shutdown.cancel();
    result
}

async fn drive<L: TrackingLog>(
    controller: &mut TrackingController<L>,
    token: Option<Secret>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let clock = controller.clock();
    controller.start(token).await?;

    while let Some(deadline) = controller.next_tick() {
        let tick = tokio::select! {
            // A cycle in flight is never interrupted, cancellation is only observed between ticks.
            _ = shutdown.cancelled() => false,
            _ = clock.sleep_until(deadline) => true,
        };
        if !tick {
            info!("Shutdown requested");
            break;
        }
        // Failures were already reported to the status board, the session keeps going.
        if let Err(e) = controller.on_tick().await {
            debug!("Tick failed: {e}");
        }
    }

    controller.stop().await?;
    Ok(())
}
