// Push notifications over Firebase Cloud Messaging
//
// Requests arrive as SendPushNotificationMessage (usually from Kafka), are
// shaped into a multicast message and fanned out one request per token.

pub mod client;
pub mod types;

pub use client::{FcmClient, PushGateway, MAX_MULTICAST_TOKENS};
pub use types::{BatchResponse, MulticastMessage, SendPushNotificationMessage, SendResponse};

use fiber_error::PushError;
use tracing::{info, warn};

/// Sends `request` to every token. Any per-token failure fails the call.
pub async fn send_to_tokens<G>(
    gateway: &G,
    request: SendPushNotificationMessage,
    silent: bool,
) -> Result<BatchResponse, PushError>
where
    G: PushGateway + ?Sized,
{
    let message = MulticastMessage::from_request(request, silent);
    let total = message.tokens.len();

    let response = gateway.send_each(&message).await?;

    if response.failure_count > 0 {
        warn!(
            failed = response.failure_count,
            total = total,
            "Some push notifications failed"
        );
        return Err(PushError::Partial {
            failed: response.failure_count,
            total,
        });
    }

    info!(sent = response.success_count, silent = silent, "Push notifications sent");
    Ok(response)
}
