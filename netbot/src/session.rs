//! Per-user session state and the per-user serialization point.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Conversation key. Negative keys identify multi-party chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn is_group(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the person sending a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Private conversation with this user.
    pub fn chat(self) -> ChatId {
        ChatId(self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display preferences. Three independent toggles, all off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub nodal_potentials: bool,
    pub polar: bool,
    pub decibel: bool,
}

/// One of the user-toggleable preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    NodalPotentials,
    Polar,
    Decibel,
}

impl Preferences {
    pub fn get(&self, which: Preference) -> bool {
        match which {
            Preference::NodalPotentials => self.nodal_potentials,
            Preference::Polar => self.polar,
            Preference::Decibel => self.decibel,
        }
    }

    /// Flip one preference, leaving the other two untouched.
    pub fn toggled(self, which: Preference) -> Self {
        let mut next = self;
        match which {
            Preference::NodalPotentials => next.nodal_potentials = !self.nodal_potentials,
            Preference::Polar => next.polar = !self.polar,
            Preference::Decibel => next.decibel = !self.decibel,
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub chat: ChatId,
    pub preferences: Preferences,
    pub awaiting_netlist: bool,
}

/// Registry of per-chat async mutexes.
///
/// Every inbound event holds its chat's lock for the whole of its handling,
/// so a capture request and the following netlist message can never
/// interleave with another event from the same chat.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<ChatId, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries nobody holds or waits on are dropped here, so the registry
    /// only tracks chats with work in flight.
    pub async fn acquire(&self, chat: ChatId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|c, lock| *c == chat || Arc::strong_count(lock) > 1);
            map.entry(chat).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
