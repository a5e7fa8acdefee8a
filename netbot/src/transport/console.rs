//! JSON-lines console transport.
//!
//! Inbound events are read one JSON object per line; every outbound action
//! is written as one JSON object per line.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Inbound, TextFormat, Transport, TransportError, UserProfile};
use crate::session::{ChatId, UserId};

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Outbound<'a> {
    Text {
        chat: ChatId,
        format: TextFormat,
        text: &'a str,
    },
    Image {
        chat: ChatId,
        path: &'a Path,
    },
    Document {
        chat: ChatId,
        path: &'a Path,
    },
}

pub struct ConsoleTransport<W: Write + Send> {
    out: Mutex<W>,
    blocked: HashSet<ChatId>,
}

impl<W: Write + Send> ConsoleTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            blocked: HashSet::new(),
        }
    }

    /// Chats that refuse delivery, reported as [`TransportError::Blocked`].
    pub fn with_blocked(mut self, chats: impl IntoIterator<Item = ChatId>) -> Self {
        self.blocked.extend(chats);
        self
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, chat: ChatId, action: &Outbound<'_>) -> Result<(), TransportError> {
        if self.blocked.contains(&chat) {
            return Err(TransportError::Blocked(chat));
        }
        let line = serde_json::to_string(action)?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}

/// Decode one inbound line. Lines that are not JSON are read as plain text
/// (or `/commands`) from `default_user` in a private chat.
pub fn parse_inbound(line: &str, default_user: UserId) -> Result<Inbound, TransportError> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('{') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    debug!("inbound line is not JSON; reading as text");
    Ok(Inbound::from_text(
        default_user.chat(),
        default_user,
        line.trim_end_matches(['\r', '\n']),
    ))
}

#[async_trait]
impl<W: Write + Send> Transport for ConsoleTransport<W> {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError> {
        self.emit(chat, &Outbound::Text { chat, format, text })
    }

    async fn send_image(&self, chat: ChatId, path: &Path) -> Result<(), TransportError> {
        self.emit(chat, &Outbound::Image { chat, path })
    }

    async fn send_document(&self, chat: ChatId, path: &Path) -> Result<(), TransportError> {
        self.emit(chat, &Outbound::Document { chat, path })
    }

    async fn lookup_user(&self, user: UserId) -> Result<UserProfile, TransportError> {
        Err(TransportError::NotFound(user))
    }
}
