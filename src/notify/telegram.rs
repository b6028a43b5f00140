//! Telegram Bot API channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::{ChannelError, DeliveryStatus, NotificationChannel};

const API_BASE: &str = "https://api.telegram.org";
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Posts Markdown messages to one chat via the Bot API.
pub struct TelegramChannel {
    http: Client,
    token: SecretString,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(token: SecretString, chat_id: String) -> Result<Self, ChannelError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(TelegramChannel {
            http,
            token,
            chat_id,
        })
    }

    fn send_url(&self) -> String {
        format!("{API_BASE}/bot{}/sendMessage", self.token.expose_secret())
    }
}

/// Seconds to wait, from a Retry-After header value if one parses.
fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn post(&self, text: &str) -> Result<DeliveryStatus, ChannelError> {
        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let response = self.http.post(self.send_url()).json(&payload).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            return Ok(DeliveryStatus::Throttled { retry_after });
        }

        if !status.is_success() {
            return Ok(DeliveryStatus::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(chat_id = %self.chat_id, "Message delivered");
        Ok(DeliveryStatus::Delivered)
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("7")), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(Some(" 12 ")), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_send_url_embeds_token() {
        let channel = TelegramChannel::new(
            SecretString::new("123:abc".to_string()),
            "42".to_string(),
        )
        .unwrap();
        assert_eq!(
            channel.send_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_payload_shape() {
        let payload = SendMessagePayload {
            chat_id: "42",
            text: "hello",
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["chat_id"], "42");
        assert_eq!(json["parse_mode"], "Markdown");
        assert_eq!(json["disable_web_page_preview"], true);
    }
}
