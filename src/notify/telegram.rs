use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::notify::{MessageId, Notifier};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API client for `sendMessage`, `editMessageText` and `sendDocument`.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramNotifier {
    pub fn new(client: Client, token: String, api_base: Option<String>) -> Self {
        Self {
            client,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base.trim_end_matches('/'), self.token, method)
    }

    async fn call<T: for<'de> Deserialize<'de>>(&self, request: reqwest::RequestBuilder) -> Result<Option<T>> {
        let response = request.send().await.context("Failed to reach Telegram")?;
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Unreadable Telegram response (HTTP {})", status))?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| "Unknown error".to_string());
            return Err(anyhow!("Telegram API failed with status {}: {}", status, description));
        }

        Ok(body.result)
    }

    async fn try_send_message(&self, chat_id: i64, text: &str) -> Result<MessageId> {
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }));

        let sent: Option<SentMessage> = self.call(request).await?;
        sent.map(|message| MessageId(message.message_id))
            .ok_or_else(|| anyhow!("Telegram returned no message"))
    }

    async fn try_edit_message(&self, chat_id: i64, message_id: MessageId, text: &str) -> Result<()> {
        let request = self.client.post(self.method_url("editMessageText")).json(&json!({
            "chat_id": chat_id,
            "message_id": message_id.0,
            "text": text,
        }));

        self.call::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn try_send_document(&self, chat_id: i64, file_name: &str, bytes: Vec<u8>, caption: &str) -> Result<()> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let request = self.client.post(self.method_url("sendDocument")).multipart(form);
        self.call::<serde_json::Value>(request).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Option<MessageId> {
        match self.try_send_message(chat_id, text).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to send Telegram message to {}: {:#}", chat_id, e);
                None
            }
        }
    }

    async fn edit_message(&self, chat_id: i64, message_id: MessageId, text: &str) {
        if let Err(e) = self.try_edit_message(chat_id, message_id, text).await {
            error!("Failed to edit Telegram message {} for {}: {:#}", message_id.0, chat_id, e);
        }
    }

    async fn send_document(&self, chat_id: i64, file_name: &str, bytes: Vec<u8>, caption: &str) {
        match self.try_send_document(chat_id, file_name, bytes, caption).await {
            Ok(()) => info!("Sent {} to {}", file_name, chat_id),
            Err(e) => error!("Failed to send {} to {}: {:#}", file_name, chat_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(Client::new(), "TOKEN".to_string(), Some(server.uri()))
    }

    #[tokio::test]
    async fn send_message_returns_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": 7, "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 555 }
            })))
            .mount(&server)
            .await;

        let id = notifier(&server).send_message(7, "hello").await;
        assert_eq!(id, Some(MessageId(555)));
    }

    #[tokio::test]
    async fn api_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let notifier = notifier(&server);
        assert_eq!(notifier.send_message(7, "hello").await, None);
        notifier.edit_message(7, MessageId(1), "again").await;
        notifier.send_document(7, "report.csv", b"a,b".to_vec(), "caption").await;
    }
}
