//! Telegram alerting.
//!
//! Levels mirror the event feed (INFO / WARN / CRITICAL). A notifier built
//! without a token or chat id is a silent no-op, so every call site can fire
//! unconditionally. Send failures are logged and swallowed — alerting must
//! never take the control plane down. The bot token is part of the URL and
//! is never logged.

use tracing::warn;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    chat_id: Option<String>,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        Self::new_with_api_base(token, chat_id, API_BASE.to_string())
    }

    pub fn new_with_api_base(
        token: Option<String>,
        chat_id: Option<String>,
        api_base: String,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_base,
            token: token.filter(|t| !t.trim().is_empty()),
            chat_id: chat_id.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.chat_id.is_some()
    }

    /// Send one message; no-op when unconfigured.
    pub async fn send(&self, level: &str, message: &str) {
        let (Some(token), Some(chat_id)) = (&self.token, &self.chat_id) else {
            return;
        };
        let url = format!("{}/bot{}/sendMessage", self.api_base.trim_end_matches('/'), token);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format!("[{level}] {message}"),
        });
        match self.http.post(&url).json(&body).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = resp.status().as_u16(), "telegram send rejected");
            }
            Ok(_) => {}
            Err(e) => {
                // reqwest errors can embed the URL (and thus the token)
                warn!("telegram send failed: {}", e.without_url());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn unconfigured_notifier_is_a_noop() {
        let n = TelegramNotifier::disabled();
        assert!(!n.is_configured());
        n.send("INFO", "nobody hears this").await;
    }

    #[tokio::test]
    async fn blank_token_counts_as_unconfigured() {
        let n = TelegramNotifier::new(Some("  ".to_string()), Some("123".to_string()));
        assert!(!n.is_configured());
    }

    #[tokio::test]
    async fn send_posts_level_tagged_text() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/botTOKEN/sendMessage")
                .json_body_partial(r#"{"chat_id": "42", "text": "[CRITICAL] blocked"}"#);
            then.status(200).json_body(serde_json::json!({"ok": true}));
        });

        let n = TelegramNotifier::new_with_api_base(
            Some("TOKEN".to_string()),
            Some("42".to_string()),
            server.base_url(),
        );
        n.send("CRITICAL", "blocked").await;
        mock.assert();
    }

    #[tokio::test]
    async fn http_failure_is_swallowed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/botTOKEN/sendMessage");
            then.status(500);
        });
        let n = TelegramNotifier::new_with_api_base(
            Some("TOKEN".to_string()),
            Some("42".to_string()),
            server.base_url(),
        );
        // must not panic or error
        n.send("WARN", "still fine").await;
    }
}
