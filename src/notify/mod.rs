use async_trait::async_trait;
use tracing::info;

mod telegram;
pub use telegram::TelegramNotifier;

/// Identity of a sent message, used to edit it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

/// Outbound channel to group owners.
///
/// All operations are fire-and-forget: implementations log failures and
/// never return them to the scan.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a new message; `None` when delivery failed.
    async fn send_message(&self, chat_id: i64, text: &str) -> Option<MessageId>;

    async fn edit_message(&self, chat_id: i64, message_id: MessageId, text: &str);

    async fn send_document(&self, chat_id: i64, file_name: &str, bytes: Vec<u8>, caption: &str);
}

/// Fallback used when no bot token is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Option<MessageId> {
        info!("[notify {}] {}", chat_id, text);
        None
    }

    async fn edit_message(&self, chat_id: i64, message_id: MessageId, text: &str) {
        info!("[notify {} edit {}] {}", chat_id, message_id.0, text);
    }

    async fn send_document(&self, chat_id: i64, file_name: &str, bytes: Vec<u8>, caption: &str) {
        info!(
            "[notify {}] document {} ({} bytes): {}",
            chat_id,
            file_name,
            bytes.len(),
            caption
        );
    }
}
