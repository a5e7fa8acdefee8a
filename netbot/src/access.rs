//! Ordered guards evaluated before any handler body runs.

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::session::{ChatId, UserId};

pub const GROUP_NOTICE: &str =
    "This bot is for personal use only.\n*Please remove it from this group*\n";
pub const UNAUTHORIZED_NOTICE: &str = "You are not authorized to run this command";

/// Why a guard refused an event. Rejections never mutate state and never
/// reach the audit streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("multi-party chat {0}")]
    GroupChat(ChatId),
    #[error("user {0} is not an administrator")]
    NotAdmin(UserId),
}

impl AccessDenied {
    /// The fixed notice sent back to the chat.
    pub fn notice(&self) -> &'static str {
        match self {
            AccessDenied::GroupChat(_) => GROUP_NOTICE,
            AccessDenied::NotAdmin(_) => UNAUTHORIZED_NOTICE,
        }
    }
}

/// What a guard sees of an inbound event.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext {
    pub chat: ChatId,
    pub sender: UserId,
    pub privileged: bool,
}

pub trait Guard: Send + Sync {
    fn check(&self, ctx: &GuardContext) -> Result<(), AccessDenied>;
}

/// Rejects everything coming from a multi-party chat.
pub struct GroupFilter;

impl Guard for GroupFilter {
    fn check(&self, ctx: &GuardContext) -> Result<(), AccessDenied> {
        if ctx.chat.is_group() {
            return Err(AccessDenied::GroupChat(ctx.chat));
        }
        Ok(())
    }
}

/// Lets privileged operations through only for listed users.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    admins: HashSet<UserId>,
}

impl AllowList {
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// Sorted, so fan-out order is stable.
    pub fn members(&self) -> Vec<UserId> {
        let mut members: Vec<UserId> = self.admins.iter().copied().collect();
        members.sort();
        members
    }
}

impl Guard for AllowList {
    fn check(&self, ctx: &GuardContext) -> Result<(), AccessDenied> {
        if ctx.privileged && !self.contains(ctx.sender) {
            warn!(user_id = ctx.sender.0, "unauthorized access denied");
            return Err(AccessDenied::NotAdmin(ctx.sender));
        }
        Ok(())
    }
}

/// Guards run in insertion order; the first refusal wins.
#[derive(Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    /// The group filter followed by the allow-list.
    pub fn standard(admins: AllowList) -> Self {
        Self::new().with(GroupFilter).with(admins)
    }

    pub fn check(&self, ctx: &GuardContext) -> Result<(), AccessDenied> {
        self.guards.iter().try_for_each(|g| g.check(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(chat: i64, sender: i64, privileged: bool) -> GuardContext {
        GuardContext {
            chat: ChatId(chat),
            sender: UserId(sender),
            privileged,
        }
    }

    #[test]
    fn test_group_rejected_before_allow_list() {
        let chain = GuardChain::standard(AllowList::new([UserId(1)]));
        let err = chain.check(&ctx(-100, 1, true)).unwrap_err();
        assert_eq!(err, AccessDenied::GroupChat(ChatId(-100)));
        assert_eq!(err.notice(), GROUP_NOTICE);

        let err = chain.check(&ctx(-100, 2, false)).unwrap_err();
        assert_eq!(err.notice(), GROUP_NOTICE);
    }

    #[test]
    fn test_privileged_requires_admin() {
        let chain = GuardChain::standard(AllowList::new([UserId(1)]));
        assert!(chain.check(&ctx(1, 1, true)).is_ok());
        assert!(chain.check(&ctx(2, 2, false)).is_ok());

        let err = chain.check(&ctx(2, 2, true)).unwrap_err();
        assert_eq!(err.notice(), UNAUTHORIZED_NOTICE);
    }

    #[test]
    fn test_members_sorted() {
        let list = AllowList::new([UserId(9), UserId(3), UserId(5)]);
        assert_eq!(list.members(), vec![UserId(3), UserId(5), UserId(9)]);
    }
}
