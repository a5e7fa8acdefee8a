//! Transport seam
//!
//! The chat protocol is an external collaborator. The bot only needs to
//! send text, images and documents, and to resolve a user id into a
//! profile for the reverse lookup command.

pub mod console;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{ChatId, UserId};

pub use console::ConsoleTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// Public profile of a user, as returned by the reverse lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl UserProfile {
    pub fn describe(&self) -> String {
        format!(
            "results for userID {}:\n  * username: @{}\n  * first name: {}\n  * last name: {}\n",
            self.id,
            self.username.as_deref().unwrap_or("-"),
            self.first_name.as_deref().unwrap_or("-"),
            self.last_name.as_deref().unwrap_or("-"),
        )
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The recipient stopped or blocked the bot.
    #[error("recipient {0} is not reachable")]
    Blocked(ChatId),
    #[error("user {0} not found")]
    NotFound(UserId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError>;

    async fn send_image(&self, chat: ChatId, path: &Path) -> Result<(), TransportError>;

    async fn send_document(&self, chat: ChatId, path: &Path) -> Result<(), TransportError>;

    async fn lookup_user(&self, user: UserId) -> Result<UserProfile, TransportError>;
}

/// One event received from the chat protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    pub chat: ChatId,
    pub sender: UserId,
    #[serde(flatten)]
    pub event: InboundEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// `/name args...`
    Command {
        name: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Text { text: String },
    Document {
        #[serde(default)]
        file_name: Option<String>,
        content: String,
    },
}

impl Inbound {
    /// Private-chat convenience constructor: chat and sender share the id.
    pub fn private(user: i64, event: InboundEvent) -> Self {
        Self {
            chat: ChatId(user),
            sender: UserId(user),
            event,
        }
    }

    /// Interpret a raw text line, turning `/cmd a b` into a command.
    pub fn from_text(chat: ChatId, sender: UserId, text: &str) -> Self {
        let event = match text.strip_prefix('/') {
            Some(rest) => {
                let mut parts = rest.split_whitespace();
                let name = parts
                    .next()
                    .unwrap_or_default()
                    // `/cmd@botname` as sent in some clients
                    .split('@')
                    .next()
                    .unwrap_or_default()
                    .to_lowercase();
                InboundEvent::Command {
                    name,
                    args: parts.map(str::to_string).collect(),
                }
            }
            None => InboundEvent::Text {
                text: text.to_string(),
            },
        };
        Self {
            chat,
            sender,
            event,
        }
    }
}
