use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use tracing::{error, info, warn};

use claims_core::MessagingConfig;

use crate::api::{ApiError, ApiResult, AppState, bad_request_error, internal_error};
use crate::intent;

pub const MEDIA_ACK_REPLY: &str = "Documento recebido com sucesso! Estamos processando e em \
     breve entraremos em contato.";

pub const MEDIA_FAILURE_REPLY: &str =
    "Não foi possível processar o documento. Tente enviar novamente.";

/// Messaging-provider client. One attempt per call; failures are the
/// caller's to log and drop.
pub struct WhatsAppClient {
    http: reqwest::Client,
    config: MessagingConfig,
}

impl WhatsAppClient {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn verify_token(&self) -> &str {
        &self.config.verify_token
    }

    /// Sends one text message through the provider's message endpoint.
    pub async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body }
        });

        let response = self
            .http
            .post(format!("{}/messages", self.config.api_url))
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            anyhow::bail!("message send rejected with status {}", response.status());
        }
        Ok(())
    }

    /// Resolves the short-lived download URL for an inbound media id.
    pub async fn media_url(&self, media_id: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .get(format!("{}/{}", self.config.api_url, media_id))
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            anyhow::bail!("media lookup rejected with status {}", response.status());
        }

        let body: Value = response.json().await?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("media lookup response missing url"))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MediaKind {
    Image,
    Document,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Document => "document",
        })
    }
}

// Inbound webhook payload, as nested by the provider:
// entry[].changes[].value.messages[]

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextContent>,
    pub image: Option<MediaContent>,
    pub document: Option<MediaContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaContent {
    pub id: String,
}

/// GET handshake: compare the shared token and echo the challenge.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, StatusCode> {
    if params.get("hub.verify_token").map(String::as_str) == Some(state.whatsapp.verify_token()) {
        Ok(params.get("hub.challenge").cloned().unwrap_or_default())
    } else {
        warn!("webhook verification token mismatch");
        Err(StatusCode::FORBIDDEN)
    }
}

/// POST delivery: reply to each inbound message, then acknowledge.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Json<Value> {
    for message in payload
        .entry
        .iter()
        .flat_map(|entry| entry.changes.iter())
        .flat_map(|change| change.value.messages.iter())
    {
        let reply = match message.kind.as_str() {
            "text" => match &message.text {
                Some(text) => {
                    intent::respond_to_text(
                        state.store.as_ref(),
                        state.assistant.as_ref(),
                        &message.from,
                        &text.body,
                    )
                    .await
                }
                None => continue,
            },
            "image" => match &message.image {
                Some(media) => process_media(&state, &media.id, MediaKind::Image).await,
                None => continue,
            },
            "document" => match &message.document {
                Some(media) => process_media(&state, &media.id, MediaKind::Document).await,
                None => continue,
            },
            other => {
                info!(kind = %other, sender = %message.from, "ignoring unsupported message type");
                continue;
            }
        };

        if let Err(e) = state.whatsapp.send_text(&message.from, &reply).await {
            error!(recipient = %message.from, error = %e, "failed to send reply");
        }
    }

    Json(json!({ "status": "success" }))
}

/// Acknowledgment stub: resolves the download URL and stops there.
/// Download, OCR and classification are an extension point, not part of
/// the inbound path.
async fn process_media(state: &AppState, media_id: &str, kind: MediaKind) -> String {
    match state.whatsapp.media_url(media_id).await {
        Ok(url) => {
            info!(media_id = %media_id, kind = %kind, url = %url, "media received");
            MEDIA_ACK_REPLY.to_string()
        }
        Err(e) => {
            warn!(media_id = %media_id, kind = %kind, error = %e, "media url lookup failed");
            MEDIA_FAILURE_REPLY.to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub phone_number: String,
    pub message: String,
}

/// Explicit outbound send, for operators and other services.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Value> {
    validate_send_request(&request)?;

    match state
        .whatsapp
        .send_text(&request.phone_number, &request.message)
        .await
    {
        Ok(()) => Ok(Json(json!({ "status": "Message sent successfully" }))),
        Err(e) => {
            error!(recipient = %request.phone_number, error = %e, "outbound send failed");
            Err(internal_error("Failed to send message", &e.to_string()))
        }
    }
}

fn validate_send_request(request: &SendMessageRequest) -> Result<(), ApiError> {
    if request.phone_number.trim().is_empty() {
        return Err(bad_request_error("phone_number is required"));
    }
    if request.message.trim().is_empty() {
        return Err(bad_request_error("message is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_payload_parses_text_and_media() {
        let raw = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [
                            { "from": "5511999990000", "type": "text",
                              "text": { "body": "qual o status?" } },
                            { "from": "5511999990000", "type": "image",
                              "image": { "id": "media-1" } },
                            { "from": "5511999990000", "type": "document",
                              "document": { "id": "media-2" } }
                        ]
                    }
                }]
            }]
        });

        let payload: WebhookPayload = serde_json::from_value(raw).unwrap();
        let messages: Vec<&InboundMessage> = payload
            .entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .flat_map(|c| c.value.messages.iter())
            .collect();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].kind, "text");
        assert_eq!(messages[0].text.as_ref().unwrap().body, "qual o status?");
        assert_eq!(messages[1].image.as_ref().unwrap().id, "media-1");
        assert_eq!(messages[2].document.as_ref().unwrap().id, "media-2");
    }

    #[test]
    fn payload_without_messages_is_empty_not_an_error() {
        let payload: WebhookPayload =
            serde_json::from_value(json!({ "entry": [{ "changes": [{ "value": {} }] }] })).unwrap();
        assert!(payload.entry[0].changes[0].value.messages.is_empty());
    }

    #[test]
    fn statuses_only_payload_is_accepted() {
        // delivery receipts come through the same webhook with no messages
        let payload: WebhookPayload = serde_json::from_value(json!({
            "entry": [{ "changes": [{ "value": { "statuses": [{ "id": "wamid.X" }] } }] }]
        }))
        .unwrap();
        assert!(payload.entry[0].changes[0].value.messages.is_empty());
    }
}
