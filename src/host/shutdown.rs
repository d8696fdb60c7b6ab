use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancelation` on Ctrl-C. Returns early when something else already cancelled it, so the
/// host can also stop because the browser went away.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
