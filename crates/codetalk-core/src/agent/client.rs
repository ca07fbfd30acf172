use std::time::Duration;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::TurnError;
use crate::session::SessionIdentity;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    app_name: String,
    user_id: String,
    session_id: String,
    new_message: NewMessage,
    streaming: bool,
}

#[derive(Serialize)]
struct NewMessage {
    parts: Vec<TextPart>,
    role: String,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// HTTP client for the agent's session and chat turn endpoints
#[derive(Clone)]
pub struct AgentClient {
    client: Client,
    agent_url: String,
    session_base_url: String,
    app_name: String,
    streaming: bool,
    session_timeout: Duration,
}

impl AgentClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            agent_url: config.agent_url.clone(),
            session_base_url: config.session_base_url.trim_end_matches('/').to_string(),
            app_name: config.app_name.clone(),
            streaming: config.streaming,
            session_timeout: Duration::from_millis(config.session_timeout_ms),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Register a session. Returns the server's session id if it sent one.
    pub async fn establish_session(
        &self,
        identity: &SessionIdentity,
    ) -> Result<Option<String>, TurnError> {
        let url = format!(
            "{}/apps/{}/users/{}/sessions/{}",
            self.session_base_url, self.app_name, identity.user_id, identity.session_id
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(self.session_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TurnError::Transport(format!(
                "Failed to establish session: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let session_id = serde_json::from_str::<SessionResponse>(&body)
            .ok()
            .and_then(|s| s.session_id)
            .filter(|id| !id.is_empty());

        info!(user = %identity.user_id, session = ?session_id, "session established");
        Ok(session_id)
    }

    /// Send one chat turn and return the raw reply body for interpretation
    pub async fn send_turn(
        &self,
        text: &str,
        identity: &SessionIdentity,
    ) -> Result<String, TurnError> {
        let request = RunRequest {
            app_name: self.app_name.clone(),
            user_id: identity.user_id.clone(),
            session_id: identity.session_id.clone(),
            new_message: NewMessage {
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
                role: "user".to_string(),
            },
            streaming: self.streaming,
        };

        let response = self
            .client
            .post(&self.agent_url)
            .header("Accept", "text/event-stream; charset=utf-8")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("Server responded with status: {}", status.as_u16()));
            return Err(TurnError::Transport(message));
        }

        debug!(bytes = body.len(), "agent reply received");
        Ok(body)
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{serve_once, serve_silent};
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            user_id: "user-abc".to_string(),
            session_id: "session-xyz".to_string(),
        }
    }

    fn config_for(base: &str) -> Config {
        let mut config = Config::new();
        config.agent_url = format!("{}/run_sse", base);
        config.session_base_url = base.to_string();
        config
    }

    #[tokio::test]
    async fn test_send_turn_posts_payload() {
        let reply = "data: {\"content\":{\"parts\":[{\"text\":\"hi\"}]}}\n\n".to_string();
        let (base, request) = serve_once("200 OK", reply.clone()).await;
        let client = AgentClient::new(&config_for(&base));

        let body = client.send_turn("list classes", &identity()).await.unwrap();
        assert_eq!(body, reply);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /run_sse "));
        let json = request.split("\r\n\r\n").nth(1).unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["appName"], "chat_agent");
        assert_eq!(value["userId"], "user-abc");
        assert_eq!(value["sessionId"], "session-xyz");
        assert_eq!(value["newMessage"]["parts"][0]["text"], "list classes");
        assert_eq!(value["newMessage"]["role"], "user");
        assert_eq!(value["streaming"], false);
    }

    #[tokio::test]
    async fn test_send_turn_error_status_uses_error_body() {
        let (base, _request) =
            serve_once("500 Internal Server Error", r#"{"error":"agent down"}"#.to_string()).await;
        let client = AgentClient::new(&config_for(&base));

        let err = client.send_turn("hi", &identity()).await.unwrap_err();
        assert!(matches!(err, TurnError::Transport(ref m) if m == "agent down"));
    }

    #[tokio::test]
    async fn test_send_turn_error_status_without_body() {
        let (base, _request) = serve_once("502 Bad Gateway", String::new()).await;
        let client = AgentClient::new(&config_for(&base));

        let err = client.send_turn("hi", &identity()).await.unwrap_err();
        assert!(matches!(err, TurnError::Transport(ref m) if m.contains("502")));
    }

    #[tokio::test]
    async fn test_establish_session_path_and_adoption() {
        let (base, request) =
            serve_once("200 OK", r#"{"sessionId":"server-session"}"#.to_string()).await;
        let client = AgentClient::new(&config_for(&base));

        let adopted = client.establish_session(&identity()).await.unwrap();
        assert_eq!(adopted.as_deref(), Some("server-session"));

        let request = request.await.unwrap();
        assert!(request
            .starts_with("POST /apps/chat_agent/users/user-abc/sessions/session-xyz "));
    }

    #[tokio::test]
    async fn test_establish_session_without_id() {
        let (base, _request) = serve_once("200 OK", "{}".to_string()).await;
        let client = AgentClient::new(&config_for(&base));
        assert_eq!(client.establish_session(&identity()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_establish_session_times_out() {
        let base = serve_silent().await;
        let mut config = config_for(&base);
        config.session_timeout_ms = 100;
        let client = AgentClient::new(&config);

        let started = std::time::Instant::now();
        let err = client.establish_session(&identity()).await.unwrap_err();
        assert!(matches!(err, TurnError::Transport(_)));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
