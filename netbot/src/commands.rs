//! Chat commands and their handlers.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::audit::{distinct_users, AuditStream, StatsSummary};
use crate::core::NetbotError;
use crate::dispatch::{Bot, DispatchOutcome};
use crate::session::{ChatId, Preference, UserId};
use crate::transport::{TextFormat, TransportError};

pub const WELCOME: &str = concat!(
    "*Welcome to SpicePyBot*.\n\n",
    "It allows you to solve linear:\n",
    "  \\* DC networks (.op)\n",
    "  \\* AC networks (.ac)\n",
    "  \\* dynamic networks (.tran)\n\n",
    "Run the code:\n",
    "`/help`:  to have a short guide.\n\n",
    "or\n\n",
    "Read the full [tutorial](https://github.com/giaccone/SpicePyBot/wiki) if ",
    "you are completely new to this subject."
);

pub const HELP: &str = concat!(
    "*Very short guide*.\n\n",
    "The Bot makes use of netlists to describe circuits. If you do not know what ",
    "a netlist is, please refer to  SpicePy ",
    "[documentation](https://github.com/giaccone/SpicePy/wiki/User's-guide)",
    " and [examples](https://github.com/giaccone/SpicePy/wiki/Examples).\n\n",
    "Assuming that you know how to describe a circuit by means of a netlist, you can either:\n\n",
    "1) use the command `/netlist` and write the netlist directly to the Bot (i.e. chatting with the BOT)\n\n",
    "or\n\n",
    "2) send a text file to the Bot including the netlist. The Bot will catch it and it'll solve it.\n\n",
    "*Finally*\n",
    "read the full [tutorial](https://github.com/giaccone/SpicePyBot/wiki) if ",
    "you are completely new to this subject."
);

pub const CAPTURE_PROMPT: &str = "Please write the netlist\nAll in one message.";
pub const NOT_CAPTURING: &str =
    "Come on! We are here to solve circuits and not to chat! 😀\nPlease provide me a netlist.";
pub const UNKNOWN_COMMAND: &str = "Sorry, I didn't understand that command.";
pub const RESTARTING: &str = "Bot is restarting...";
pub const NO_BROADCAST_MESSAGE: &str = "No broadcast message: pass it after the command or configure a message file.";
pub const WHO_USAGE: &str = "Usage: /who <user id>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Netlist,
    NodalPotentials,
    ComplexRepresentation,
    Decibel,
    Log,
    Stat,
    /// Broadcast to every known user. An inline message overrides the
    /// configured message file.
    SendToAll { message: Option<String> },
    SendToAdmins { message: Option<String> },
    Who { target: Option<String> },
    Restart,
    Unknown(String),
}

impl Command {
    pub fn parse(name: &str, args: &[String]) -> Self {
        let inline = || {
            let joined = args.join(" ");
            (!joined.trim().is_empty()).then_some(joined)
        };
        match name.trim_start_matches('/').to_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "netlist" => Command::Netlist,
            "nodal_pot" => Command::NodalPotentials,
            "complex_repr" => Command::ComplexRepresentation,
            "decibel" => Command::Decibel,
            "log" => Command::Log,
            "stat" => Command::Stat,
            "send2all" => Command::SendToAll { message: inline() },
            "send2admin" => Command::SendToAdmins { message: inline() },
            "who" => Command::Who {
                target: args.first().cloned(),
            },
            "restart" => Command::Restart,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// Commands reserved for allow-listed callers.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Command::Log
                | Command::Stat
                | Command::SendToAll { .. }
                | Command::SendToAdmins { .. }
                | Command::Who { .. }
                | Command::Restart
        )
    }
}

/// Outcome of a broadcast to every known user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub not_sent: usize,
}

impl BroadcastReport {
    pub fn to_markdown(&self) -> String {
        format!(
            "*{} users* notified with the above message.\n*{} users* not notified (bot is inactive).",
            self.sent, self.not_sent
        )
    }
}

impl Bot {
    pub(crate) async fn run_command(
        &self,
        command: Command,
        chat: ChatId,
        sender: UserId,
    ) -> Result<DispatchOutcome, NetbotError> {
        match command {
            Command::Start => {
                self.store.reset(chat)?;
                self.reply(chat, WELCOME, TextFormat::Markdown).await?;
            }
            Command::Help => self.reply(chat, HELP, TextFormat::Markdown).await?,
            Command::Netlist => {
                self.store.set_awaiting_netlist(chat, true)?;
                self.reply(chat, CAPTURE_PROMPT, TextFormat::Plain).await?;
            }
            Command::NodalPotentials => {
                let p = self.store.toggle(chat, Preference::NodalPotentials)?;
                let text = if p.nodal_potentials {
                    "Node potentials included in results"
                } else {
                    "Node potentials removed from results"
                };
                self.reply(chat, text, TextFormat::Plain).await?;
            }
            Command::ComplexRepresentation => {
                let p = self.store.toggle(chat, Preference::Polar)?;
                let text = if p.polar {
                    "Switched to polar representation"
                } else {
                    "Switched to cartesian representation"
                };
                self.reply(chat, text, TextFormat::Plain).await?;
            }
            Command::Decibel => {
                let p = self.store.toggle(chat, Preference::Decibel)?;
                let text = if p.decibel {
                    "bode plot: decibel enabled"
                } else {
                    "bode plot: decibel disabled"
                };
                self.reply(chat, text, TextFormat::Plain).await?;
            }
            Command::Log => {
                for stream in [AuditStream::SolverError, AuditStream::OtherError] {
                    self.transport
                        .send_document(chat, &self.audit.path(stream))
                        .await?;
                }
            }
            Command::Stat => {
                self.transport
                    .send_document(chat, &self.audit.path(AuditStream::Stat))
                    .await?;
                let events = self.audit.stat_events()?;
                let summary = StatsSummary::from_events(&events, &self.admins.members());
                self.reply(chat, &summary.to_markdown(), TextFormat::Markdown)
                    .await?;
            }
            Command::SendToAll { message } => {
                let Some(message) = self.broadcast_text(message).await? else {
                    self.reply(chat, NO_BROADCAST_MESSAGE, TextFormat::Plain).await?;
                    return Ok(DispatchOutcome::Continue);
                };
                let report = self.broadcast_to_all(&message).await?;
                self.report_to_admins(chat, &report.to_markdown()).await;
            }
            Command::SendToAdmins { message } => {
                let Some(message) = self.broadcast_text(message).await? else {
                    self.reply(chat, NO_BROADCAST_MESSAGE, TextFormat::Plain).await?;
                    return Ok(DispatchOutcome::Continue);
                };
                for admin in self.admins.members() {
                    if let Err(e) = self
                        .transport
                        .send_text(admin.chat(), &message, TextFormat::Markdown)
                        .await
                    {
                        warn!(user_id = admin.0, error = %e, "admin message not delivered");
                    }
                }
            }
            Command::Who { target } => {
                let Some(target) = target.and_then(|t| t.trim().parse::<i64>().ok()) else {
                    self.reply(chat, WHO_USAGE, TextFormat::Plain).await?;
                    return Ok(DispatchOutcome::Continue);
                };
                let target = UserId(target);
                let text = match self.transport.lookup_user(target).await {
                    Ok(profile) => profile.describe(),
                    Err(TransportError::NotFound(_)) | Err(TransportError::Blocked(_)) => {
                        format!("user {} not found", target)
                    }
                    Err(e) => return Err(e.into()),
                };
                for admin in self.admins.members() {
                    if let Err(e) = self
                        .transport
                        .send_text(admin.chat(), &text, TextFormat::Plain)
                        .await
                    {
                        warn!(user_id = admin.0, error = %e, "lookup result not delivered");
                    }
                }
            }
            Command::Restart => {
                info!(user_id = sender.0, "restart requested");
                self.reply(chat, RESTARTING, TextFormat::Plain).await?;
                return Ok(DispatchOutcome::Restart);
            }
            Command::Unknown(name) => {
                info!(user_id = sender.0, command = %name, "unknown command");
                self.reply(chat, UNKNOWN_COMMAND, TextFormat::Plain).await?;
            }
        }
        Ok(DispatchOutcome::Continue)
    }

    async fn broadcast_text(&self, inline: Option<String>) -> Result<Option<String>, NetbotError> {
        if inline.is_some() {
            return Ok(inline);
        }
        match &self.broadcast_message {
            Some(path) => Ok(Some(tokio::fs::read_to_string(path).await?)),
            None => Ok(None),
        }
    }

    /// Recipients are every user seen in the stat stream plus every user
    /// with a stored session. Delivery failures are counted, never raised.
    pub(crate) async fn broadcast_to_all(&self, message: &str) -> Result<BroadcastReport, NetbotError> {
        let mut recipients: BTreeSet<ChatId> = distinct_users(&self.audit.stat_events()?)
            .into_iter()
            .map(UserId::chat)
            .collect();
        recipients.extend(self.store.known_chats()?);
        recipients.retain(|c| !c.is_group());

        let mut report = BroadcastReport::default();
        for chat in recipients {
            match self
                .transport
                .send_text(chat, message, TextFormat::Markdown)
                .await
            {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(user_id = chat.0, error = %e, "broadcast not delivered");
                    report.not_sent += 1;
                }
            }
        }
        info!(sent = report.sent, not_sent = report.not_sent, "broadcast finished");
        Ok(report)
    }

    /// The initiator first, then every other admin.
    async fn report_to_admins(&self, initiator: ChatId, text: &str) {
        let mut targets = vec![initiator];
        targets.extend(
            self.admins
                .members()
                .into_iter()
                .map(UserId::chat)
                .filter(|c| *c != initiator),
        );
        for chat in targets {
            if let Err(e) = self.transport.send_text(chat, text, TextFormat::Markdown).await {
                warn!(user_id = chat.0, error = %e, "broadcast report not delivered");
            }
        }
    }
}
