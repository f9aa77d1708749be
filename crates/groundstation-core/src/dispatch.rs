//! Channel-independent delivery protocol
//!
//! [`deliver`] runs the shared connect → authenticate → send → disconnect
//! skeleton against any [`ChannelConnector`]. Each step races the caller's
//! cancellation token. Any failure after the connection is open aborts the
//! session before the error is returned, so no connection outlives the call.
//!
//! There is no retry here or anywhere else: a failed delivery is logged once
//! and handed back to the host unchanged.

use crate::error::{Error, Result};
use crate::traits::{ChannelConnector, ChannelSession, Endpoint, OutboundMessage};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Run `fut` unless `cancel` fires first
///
/// An already-cancelled token short-circuits without polling `fut`.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Deliver one message over `connector`
///
/// Credentials on the endpoint trigger an explicit authenticate step after
/// connect. Errors are logged with host and port, then returned unchanged.
pub async fn deliver(
    connector: &dyn ChannelConnector,
    endpoint: &Endpoint,
    message: &OutboundMessage,
    cancel: &CancellationToken,
) -> Result<()> {
    let channel = connector.kind();

    let result = async {
        debug!("{}: Connecting to {}:{}", channel, endpoint.host, endpoint.port);
        let mut session = cancellable(cancel, connector.connect(endpoint)).await?;

        match run_session(session.as_mut(), endpoint, message, cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                session.abort();
                Err(e)
            }
        }
    }
    .await;

    match &result {
        Ok(()) => info!("{}: Delivered to {}:{}", channel, endpoint.host, endpoint.port),
        Err(e) => log_failure(channel.as_str(), e),
    }

    result
}

async fn run_session(
    session: &mut dyn ChannelSession,
    endpoint: &Endpoint,
    message: &OutboundMessage,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(credentials) = &endpoint.credentials {
        cancellable(cancel, session.authenticate(credentials)).await?;
    }

    cancellable(cancel, session.send(message)).await?;
    cancellable(cancel, session.disconnect()).await
}

fn log_failure(channel: &str, err: &Error) {
    match err {
        Error::Connection { .. } | Error::Authentication { .. } => {
            error!("{}: {}", channel, err);
        }
        Error::Cancelled => {
            debug!("{}: Delivery cancelled", channel);
        }
        other => {
            error!("Error sending to {}: {}", channel, other);
        }
    }
}
