//! Typed facade over the session database.

use std::sync::Arc;

use tracing::debug;

use crate::db::{Database, Result};
use crate::session::{ChatId, Preference, Preferences, UserSession};

/// Per-user preferences and the transient capture flag.
///
/// Every operation is safe to call before any other interaction with a
/// user: a missing record is created with all preferences off.
#[derive(Clone)]
pub struct ConfigStore {
    db: Arc<Database>,
}

impl ConfigStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn session(&self, chat: ChatId) -> Result<UserSession> {
        self.db.ensure_session(chat)
    }

    pub fn get(&self, chat: ChatId) -> Result<Preferences> {
        Ok(self.db.ensure_session(chat)?.preferences)
    }

    pub fn set(&self, chat: ChatId, prefs: Preferences) -> Result<()> {
        self.db.save_preferences(chat, &prefs)
    }

    /// Back to all-off. The capture flag is left alone.
    pub fn reset(&self, chat: ChatId) -> Result<Preferences> {
        let prefs = Preferences::default();
        self.db.save_preferences(chat, &prefs)?;
        Ok(prefs)
    }

    /// Flip one preference and return the stored result.
    pub fn toggle(&self, chat: ChatId, which: Preference) -> Result<Preferences> {
        let next = self.get(chat)?.toggled(which);
        self.db.save_preferences(chat, &next)?;
        debug!(user_id = chat.0, ?which, "preference toggled");
        Ok(next)
    }

    pub fn is_awaiting_netlist(&self, chat: ChatId) -> Result<bool> {
        Ok(self.db.ensure_session(chat)?.awaiting_netlist)
    }

    pub fn set_awaiting_netlist(&self, chat: ChatId, awaiting: bool) -> Result<()> {
        self.db.set_awaiting_netlist(chat, awaiting)
    }

    pub fn known_chats(&self) -> Result<Vec<ChatId>> {
        self.db.known_chats()
    }
}
