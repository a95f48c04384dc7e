//! Session-scoped client for the external mail API.
//!
//! Constructed fresh per request from the request's session handle, so
//! concurrent requests with different sessions never share credentials.
//! The mail API is addressed through the per-session base URL carried in
//! the handle (each cluster hosts its own).
//!
//! Handlers stay thin: typed arguments in, `ToolResult`-shaped data plus
//! `email_preview` widgets out. Schema details of the remote API are fixed
//! upstream and mirrored by the wire structs here.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::SessionInfo;
use crate::widgets::WidgetBlock;
use crate::{Error, Result};

/// Session token header expected by both downstream APIs.
pub(crate) const SESSION_HEADER: &str = "X-Session-Token";

/// Joins a base URL and an endpoint path: trailing slashes are stripped
/// from the base, a leading slash is ensured on the path.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Decoded message state bitset.
///
/// Wire layout: bit 0 unread, bit 1 starred, bit 2 draft, bit 3
/// has-attachment, bit 4 tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageState(pub u32);

impl MessageState {
    /// Message has not been read.
    pub fn is_unread(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    /// Message is starred.
    pub fn is_starred(&self) -> bool {
        self.0 & (1 << 1) != 0
    }

    /// Message is an unsent draft.
    pub fn is_draft(&self) -> bool {
        self.0 & (1 << 2) != 0
    }

    /// Message carries at least one attachment.
    pub fn has_attachment(&self) -> bool {
        self.0 & (1 << 3) != 0
    }

    /// Message is tracked for a reply.
    pub fn is_tracked(&self) -> bool {
        self.0 & (1 << 4) != 0
    }
}

/// One message as the mail API reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Stable message id
    pub id: String,

    /// Sender address
    pub from: String,

    /// Recipient addresses
    #[serde(default)]
    pub to: Vec<String>,

    /// Subject line
    #[serde(default)]
    pub subject: String,

    /// Short body preview
    #[serde(default)]
    pub snippet: String,

    /// RFC 3339 receive time
    #[serde(default)]
    pub date: String,

    /// Raw state bitset; decode via [`MessageState`]
    #[serde(default)]
    pub state: u32,
}

impl EmailMessage {
    /// Decoded state bits.
    pub fn state(&self) -> MessageState {
        MessageState(self.state)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Vec<EmailMessage>,
}

#[derive(Debug, Deserialize)]
struct CountEnvelope {
    #[serde(default)]
    count: u64,
}

/// Session-scoped mail API client.
pub struct EmailApi {
    http: reqwest::Client,
    base_url: String,
    session: String,
}

impl EmailApi {
    /// Builds a client from a session handle.
    ///
    /// # Errors
    ///
    /// Fails when the handle carries no base URL; the mail API has no
    /// fixed address, it travels with the session.
    pub fn new(session: &SessionInfo) -> Result<Self> {
        let base_url = session
            .base_url
            .as_deref()
            .ok_or_else(|| Error::bad_request("session carries no mail API base URL"))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            session: session.session.clone(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(join_url(&self.base_url, path))
            .header(SESSION_HEADER, &self.session)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::upstream("mail", format!("status {}: {}", status, body)))
        }
    }

    /// Fetches recent messages, optionally unread-only and date-filtered
    /// (`filter_date` in `YYYY-MM-DD`).
    pub async fn fetch_messages(
        &self,
        unread_only: bool,
        filter_date: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EmailMessage>> {
        let envelope: MessagesEnvelope = retry_with_backoff(read_retry(), move || async move {
            let mut request = self
                .get("/messages")
                .query(&[("limit", limit.to_string())]);
            if unread_only {
                request = request.query(&[("unreadOnly", "true")]);
            }
            if let Some(date) = filter_date {
                request = request.query(&[("date", date)]);
            }
            let response = Self::check(request.send().await?).await?;
            Ok(response.json().await?)
        })
        .await?;
        Ok(envelope.messages)
    }

    /// Full-text search over the mailbox.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<EmailMessage>> {
        let envelope: MessagesEnvelope = retry_with_backoff(read_retry(), move || async move {
            let limit_str = limit.to_string();
            let response = Self::check(
                self.get("/messages/search")
                    .query(&[("q", query), ("limit", limit_str.as_str())])
                    .send()
                    .await?,
            )
            .await?;
            Ok(response.json().await?)
        })
        .await?;
        Ok(envelope.messages)
    }

    /// Fetches one message by id.
    pub async fn get_message(&self, id: &str) -> Result<EmailMessage> {
        retry_with_backoff(read_retry(), move || async move {
            let response = Self::check(
                self.get(&format!("/messages/{}", id)).send().await?,
            )
            .await?;
            Ok(response.json().await?)
        })
        .await
    }

    /// Sends a message. Not retried: sends are not idempotent.
    pub async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<Value> {
        let response = Self::check(
            self.http
                .post(join_url(&self.base_url, "/messages/send"))
                .header(SESSION_HEADER, &self.session)
                .json(&json!({"to": to, "subject": subject, "body": body}))
                .send()
                .await?,
        )
        .await?;
        Ok(response.json().await?)
    }

    /// Cheap unread count for the context builder's activity snapshot.
    pub async fn unread_count(&self) -> Result<u64> {
        let envelope: CountEnvelope = retry_with_backoff(read_retry(), move || async move {
            let response = Self::check(
                self.get("/messages/count")
                    .query(&[("unreadOnly", "true")])
                    .send()
                    .await?,
            )
            .await?;
            Ok(response.json().await?)
        })
        .await?;
        Ok(envelope.count)
    }
}

/// Two attempts with a short delay; enough for a transient blip without
/// stretching a tool call noticeably.
fn read_retry() -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(2)
        .with_initial_delay(std::time::Duration::from_millis(200))
}

/// Builds an `email_preview` widget from one message.
pub fn message_widget(message: &EmailMessage) -> WidgetBlock {
    let state = message.state();
    WidgetBlock::new(
        "email_preview",
        json!({
            "messageId": message.id,
            "from": message.from,
            "subject": message.subject,
            "preview": message.snippet,
            "date": message.date,
            "unread": state.is_unread(),
            "hasAttachment": state.has_attachment(),
        }),
        vec!["reply".to_string(), "archive".to_string(), "open".to_string()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalization() {
        assert_eq!(
            join_url("https://mail.example.com/api/", "/messages"),
            "https://mail.example.com/api/messages"
        );
        assert_eq!(
            join_url("https://mail.example.com/api", "messages"),
            "https://mail.example.com/api/messages"
        );
        assert_eq!(
            join_url("https://mail.example.com/api///", "/messages/search"),
            "https://mail.example.com/api/messages/search"
        );
    }

    #[test]
    fn test_message_state_bits() {
        let state = MessageState(0b1_1011);
        assert!(state.is_unread());
        assert!(state.is_starred());
        assert!(!state.is_draft());
        assert!(state.has_attachment());
        assert!(state.is_tracked());

        let clean = MessageState(0);
        assert!(!clean.is_unread());
        assert!(!clean.has_attachment());
    }

    #[test]
    fn test_requires_session_base_url() {
        let session = SessionInfo {
            session: "tok".to_string(),
            base_url: None,
            cluster_id: None,
        };
        assert!(EmailApi::new(&session).is_err());

        let with_url = SessionInfo {
            session: "tok".to_string(),
            base_url: Some("https://mail.example.com/api/".to_string()),
            cluster_id: None,
        };
        let api = EmailApi::new(&with_url).unwrap();
        assert_eq!(api.base_url, "https://mail.example.com/api");
    }

    #[test]
    fn test_message_widget_shape() {
        let message = EmailMessage {
            id: "m1".to_string(),
            from: "pat@example.com".to_string(),
            to: vec![],
            subject: "Q3 invoice".to_string(),
            snippet: "Please find attached".to_string(),
            date: "2026-08-01T09:00:00Z".to_string(),
            state: 0b01001,
        };
        let widget = message_widget(&message);
        assert_eq!(widget.widget_type, "email_preview");
        assert_eq!(widget.data["from"], "pat@example.com");
        assert_eq!(widget.data["unread"], true);
        assert_eq!(widget.data["hasAttachment"], true);
        assert_eq!(widget.actions, vec!["reply", "archive", "open"]);
    }

    #[test]
    fn test_message_envelope_defaults() {
        let envelope: MessagesEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.messages.is_empty());

        let message: EmailMessage =
            serde_json::from_str(r#"{"id": "m", "from": "a@b.c"}"#).unwrap();
        assert_eq!(message.state, 0);
        assert!(message.subject.is_empty());
    }
}
