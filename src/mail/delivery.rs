//! The seam between the batch pipeline and a mail provider.

use async_trait::async_trait;
use lettre::Message;

use crate::auth::StoredCredentials;
use crate::error::DeliveryError;

/// A mail provider able to transmit assembled messages on behalf of the
/// connected account.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Provider name for logs and error messages.
    fn name(&self) -> &str;

    /// Transmit one fully assembled message.
    async fn send(
        &self,
        message: &Message,
        credentials: &StoredCredentials,
    ) -> Result<(), DeliveryError>;

    /// The address of the account the credentials belong to.
    async fn resolve_sender_address(
        &self,
        credentials: &StoredCredentials,
    ) -> Result<String, DeliveryError>;
}
