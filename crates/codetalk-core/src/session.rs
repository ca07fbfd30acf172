//! Session identity and chat turn handling.
//!
//! A [`ChatSession`] is created once per launch of the chat screen and owns
//! the conversation. Turns are split into a synchronous [`ChatSession::begin_turn`]
//! (append user message and placeholder) and [`ChatSession::finish_turn`]
//! (resolve the placeholder), with the network exchange in between running
//! wherever the caller likes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::AgentClient;
use crate::config::Config;
use crate::error::TurnError;
use crate::interpret::interpret;
use crate::state::{Author, Conversation, MessageId, FALLBACK_REPLY, PLACEHOLDER_TEXT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub session_id: String,
}

fn opaque_token() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

pub fn generate_user_id() -> String {
    format!("user-{}", opaque_token())
}

pub fn generate_session_id() -> String {
    format!("session-{}", opaque_token())
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    user_id: String,
}

/// Client-local store for the user id. Read once at startup, written at most
/// once when no id exists yet.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(Config::config_dir()?.join("identity.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored user id, or a freshly generated one that is persisted
    pub fn resolve_user_id(&self) -> Result<String> {
        if let Some(user_id) = self.read() {
            return Ok(user_id);
        }

        let user_id = generate_user_id();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredIdentity {
            user_id: user_id.clone(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)
            .with_context(|| format!("Could not write {}", self.path.display()))?;

        info!(user = %user_id, "created new user id");
        Ok(user_id)
    }

    fn read(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<StoredIdentity>(&content) {
            Ok(stored) if !stored.user_id.trim().is_empty() => Some(stored.user_id),
            Ok(_) => None,
            Err(err) => {
                warn!(%err, path = %self.path.display(), "ignoring unreadable identity file");
                None
            }
        }
    }
}

/// Register the session with the agent. Any failure keeps the local id.
pub async fn establish_session(client: &AgentClient, identity: &SessionIdentity) -> String {
    match client.establish_session(identity).await {
        Ok(Some(session_id)) => session_id,
        Ok(None) => identity.session_id.clone(),
        Err(err) => {
            warn!(%err, "session error, using local session id");
            identity.session_id.clone()
        }
    }
}

/// Send a turn and interpret the reply
pub async fn run_turn(
    client: &AgentClient,
    text: &str,
    identity: &SessionIdentity,
) -> Result<String, TurnError> {
    let raw = client.send_turn(text, identity).await?;
    Ok(interpret(&raw)?)
}

/// A turn whose placeholder is waiting for a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub placeholder: MessageId,
    pub text: String,
    pub identity: SessionIdentity,
}

/// One chat view's session: identity plus conversation
#[derive(Debug)]
pub struct ChatSession {
    identity: SessionIdentity,
    conversation: Conversation,
    pending: Option<PendingTurn>,
}

impl ChatSession {
    /// New session for `user_id` with a fresh local session id
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            identity: SessionIdentity {
                user_id: user_id.into(),
                session_id: generate_session_id(),
            },
            conversation: Conversation::new(),
            pending: None,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Use the id the server assigned during establishment
    pub fn adopt_session_id(&mut self, session_id: String) {
        if session_id != self.identity.session_id {
            info!(session = %session_id, "adopting server session id");
            self.identity.session_id = session_id;
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the send control is enabled for `input`
    pub fn can_send(&self, input: &str) -> bool {
        !self.is_loading() && !input.trim().is_empty() && !self.identity.user_id.is_empty()
    }

    /// Append the user message and the placeholder. Returns `None` when
    /// sending is not allowed.
    pub fn begin_turn(&mut self, input: &str) -> Option<PendingTurn> {
        if !self.can_send(input) {
            return None;
        }

        self.conversation.push(Author::User, input);
        let placeholder = self.conversation.push(Author::Agent, PLACEHOLDER_TEXT);
        let turn = PendingTurn {
            placeholder,
            text: input.to_string(),
            identity: self.identity.clone(),
        };
        self.pending = Some(turn.clone());
        Some(turn)
    }

    /// Resolve the placeholder with the reply or the fallback text. Results
    /// for a turn that is no longer pending are discarded.
    pub fn finish_turn(&mut self, placeholder: MessageId, result: Result<String, TurnError>) -> bool {
        if self.pending.as_ref().map(|p| p.placeholder) != Some(placeholder) {
            info!(message = placeholder, "discarding reply for stale turn");
            return false;
        }
        self.pending = None;

        let text = match result {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "chat turn failed");
                FALLBACK_REPLY.to_string()
            }
        };
        self.conversation.resolve_placeholder(placeholder, text)
    }

    /// Drop the conversation and any pending turn
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.pending = None;
    }
}
