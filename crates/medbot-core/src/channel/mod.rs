pub mod line;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::types::Reply;

/// Outbound side of a chat platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "line").
    fn name(&self) -> &str;

    /// Push a reply to a user outside of a webhook round trip.
    async fn send(&self, user_id: &str, reply: &Reply) -> Result<(), ChannelError>;
}

/// Check if a sender is allowed based on the allow list.
pub fn is_allowed(sender_id: &str, allow_from: &[String]) -> bool {
    if allow_from.is_empty() {
        return true;
    }
    allow_from.iter().any(|id| id == sender_id)
}
