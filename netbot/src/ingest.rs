//! Netlist ingestion from uploaded files and chat messages.

use tracing::info;

use crate::db::Result;
use crate::session::ChatId;
use crate::store::ConfigStore;

pub const ECHO_PREFIX: &str = "This is your netlist:\n\n";

/// Canonical text for a submission: `\n` line endings and a final newline.
pub fn normalize(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = text.trim_end_matches('\n');
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push_str(trimmed);
    out.push('\n');
    out
}

/// The active netlist of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetlistSubmission {
    pub chat: ChatId,
    pub text: String,
}

impl NetlistSubmission {
    /// Confirmation message echoing the stored text.
    pub fn echo(&self) -> String {
        format!("{}{}", ECHO_PREFIX, self.text)
    }
}

#[derive(Clone)]
pub struct NetlistIngestion {
    store: ConfigStore,
}

impl NetlistIngestion {
    pub fn new(store: ConfigStore) -> Self {
        Self { store }
    }

    /// Uploaded files are accepted in any state.
    pub fn ingest_from_file(&self, chat: ChatId, bytes: &[u8]) -> Result<NetlistSubmission> {
        let text = String::from_utf8_lossy(bytes);
        self.store_submission(chat, &text)
    }

    /// Returns `None` when the user is not currently capturing a netlist.
    pub fn ingest_from_text(&self, chat: ChatId, text: &str) -> Result<Option<NetlistSubmission>> {
        if !self.store.is_awaiting_netlist(chat)? {
            return Ok(None);
        }
        self.store_submission(chat, text).map(Some)
    }

    pub fn last_submission(&self, chat: ChatId) -> Result<Option<NetlistSubmission>> {
        Ok(self
            .store
            .database()
            .find_submission(chat)?
            .map(|s| NetlistSubmission {
                chat: s.chat,
                text: s.netlist,
            }))
    }

    fn store_submission(&self, chat: ChatId, raw: &str) -> Result<NetlistSubmission> {
        let text = normalize(raw);
        self.store.session(chat)?;
        self.store.database().save_submission(chat, &text)?;
        self.store.set_awaiting_netlist(chat, false)?;
        info!(user_id = chat.0, bytes = text.len(), "netlist stored");
        Ok(NetlistSubmission { chat, text })
    }
}
