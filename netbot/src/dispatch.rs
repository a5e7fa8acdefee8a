//! Inbound event dispatch
//!
//! `guards → per-user lock → session init → command / ingestion → analysis`.
//!
//! Guards run before the lock so a rejected event costs nothing and touches
//! no state. Errors that escape a handler are written to the other-error
//! stream; the bot keeps serving.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::access::{AllowList, GuardChain, GuardContext};
use crate::audit::AuditLog;
use crate::commands::{Command, NOT_CAPTURING};
use crate::config::BotConfig;
use crate::core::NetbotError;
use crate::db::Database;
use crate::governor::SamplingGovernor;
use crate::ingest::{NetlistIngestion, NetlistSubmission};
use crate::orchestrator::{
    AnalysisOrchestrator, AnalysisRequest, Orchestration, OrchestratorSettings, FAILURE_NOTICE,
};
use crate::plot::PlotRenderer;
use crate::session::{ChatId, SessionLocks, UserId};
use crate::solver::Solver;
use crate::store::ConfigStore;
use crate::transport::console::parse_inbound;
use crate::transport::{Inbound, InboundEvent, TextFormat, Transport};

/// What the host loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    /// An administrator asked for a process restart.
    Restart,
}

pub struct Bot {
    pub(crate) store: ConfigStore,
    pub(crate) ingestion: NetlistIngestion,
    pub(crate) orchestrator: AnalysisOrchestrator,
    pub(crate) audit: Arc<AuditLog>,
    pub(crate) admins: AllowList,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) broadcast_message: Option<PathBuf>,
    guards: GuardChain,
    locks: SessionLocks,
}

impl Bot {
    /// Open the session database and the audit streams named by `config`.
    pub fn new(
        config: &BotConfig,
        solver: Arc<dyn Solver>,
        plotter: Arc<dyn PlotRenderer>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, NetbotError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.plot_dir())?;

        let db = Arc::new(Database::new(&config.database_path())?);
        let store = ConfigStore::new(db);
        let audit = Arc::new(AuditLog::open(&config.log_dir)?);
        let admins = AllowList::new(config.admin_ids());

        let orchestrator = AnalysisOrchestrator::new(
            solver,
            plotter,
            SamplingGovernor::new(config.max_samples),
            audit.clone(),
            OrchestratorSettings {
                max_nodes: config.max_nodes,
                plot_dir: config.plot_dir(),
                plot_dpi: config.plot_dpi,
                solve_timeout: config.solver.timeout(),
                plot_timeout: config.plotter.timeout(),
            },
        );

        info!(
            data_dir = %config.data_dir.display(),
            log_dir = %config.log_dir.display(),
            admins = config.admins.len(),
            "bot initialized"
        );

        Ok(Self {
            ingestion: NetlistIngestion::new(store.clone()),
            store,
            orchestrator,
            audit,
            guards: GuardChain::standard(admins.clone()),
            admins,
            transport,
            broadcast_message: config.broadcast_message.clone(),
            locks: SessionLocks::new(),
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Handle one inbound event to completion. Never fails: escaped errors
    /// land in the other-error stream.
    pub async fn handle(&self, inbound: Inbound) -> DispatchOutcome {
        match self.try_handle(inbound).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_uncaught(&e.to_string());
                DispatchOutcome::Continue
            }
        }
    }

    pub fn record_uncaught(&self, description: &str) {
        if let Err(e) = self.audit.record_other(description) {
            error!(error = %e, %description, "failed to append other-error entry");
        }
    }

    async fn try_handle(&self, inbound: Inbound) -> Result<DispatchOutcome, NetbotError> {
        let Inbound {
            chat,
            sender,
            event,
        } = inbound;

        let command = match &event {
            InboundEvent::Command { name, args } => Some(Command::parse(name, args)),
            _ => None,
        };
        let ctx = GuardContext {
            chat,
            sender,
            privileged: command.as_ref().is_some_and(Command::is_privileged),
        };
        if let Err(denied) = self.guards.check(&ctx) {
            debug!(user_id = sender.0, reason = %denied, "event rejected");
            let format = if chat.is_group() {
                TextFormat::Markdown
            } else {
                TextFormat::Plain
            };
            self.transport.send_text(chat, denied.notice(), format).await?;
            return Ok(DispatchOutcome::Continue);
        }

        let _turn = self.locks.acquire(chat).await;
        self.store.session(chat)?;

        if let Some(command) = command {
            return self.run_command(command, chat, sender).await;
        }

        match event {
            InboundEvent::Text { text } => match self.ingestion.ingest_from_text(chat, &text)? {
                Some(submission) => self.analyze(submission, sender).await?,
                None => self.reply(chat, NOT_CAPTURING, TextFormat::Plain).await?,
            },
            InboundEvent::Document { file_name, content } => {
                debug!(user_id = sender.0, file = ?file_name, "netlist document received");
                let submission = self.ingestion.ingest_from_file(chat, content.as_bytes())?;
                self.analyze(submission, sender).await?;
            }
            InboundEvent::Command { .. } => {}
        }
        Ok(DispatchOutcome::Continue)
    }

    async fn analyze(&self, submission: NetlistSubmission, sender: UserId) -> Result<(), NetbotError> {
        let chat = submission.chat;
        self.reply(chat, &submission.echo(), TextFormat::Plain).await?;

        let request = AnalysisRequest {
            chat,
            user: sender,
            netlist_text: &submission.text,
            preferences: self.store.get(chat)?,
        };
        match self.orchestrator.run(request, self.transport.as_ref()).await {
            Ok(Orchestration::Rendered { result, .. }) => {
                result.deliver(chat, self.transport.as_ref()).await?
            }
            Ok(Orchestration::Rejected(reason)) => {
                self.reply(chat, &reason, TextFormat::Markdown).await?
            }
            Err(_) => self.reply(chat, FAILURE_NOTICE, TextFormat::Markdown).await?,
        }
        Ok(())
    }

    pub(crate) async fn reply(
        &self,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), NetbotError> {
        self.transport.send_text(chat, text, format).await?;
        Ok(())
    }
}

/// How long a chat's worker waits for another event before exiting.
pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

struct Worker {
    tx: mpsc::UnboundedSender<Inbound>,
    handle: JoinHandle<()>,
}

/// Fans events out to one worker per chat, so events from the same chat
/// are handled in arrival order while chats proceed independently.
///
/// A worker that stays idle for the configured timeout exits; the next
/// event from its chat starts a fresh one.
pub struct SessionRouter {
    bot: Arc<Bot>,
    workers: HashMap<ChatId, Worker>,
    restart_tx: mpsc::Sender<()>,
    idle_timeout: Duration,
}

impl SessionRouter {
    pub fn new(bot: Arc<Bot>, restart_tx: mpsc::Sender<()>) -> Self {
        Self {
            bot,
            workers: HashMap::new(),
            restart_tx,
            idle_timeout: WORKER_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn route(&mut self, inbound: Inbound) {
        self.workers.retain(|_, w| !w.handle.is_finished());

        let chat = inbound.chat;
        let (inbound, previous) = match self.workers.remove(&chat) {
            Some(worker) => match worker.tx.send(inbound) {
                Ok(()) => {
                    self.workers.insert(chat, worker);
                    return;
                }
                // the worker is closing on idle; it may still be draining
                Err(mpsc::error::SendError(inbound)) => (inbound, Some(worker.handle)),
            },
            None => (inbound, None),
        };

        let (tx, rx) = mpsc::unbounded_channel::<Inbound>();
        let handle = tokio::spawn(run_worker(
            self.bot.clone(),
            rx,
            self.restart_tx.clone(),
            self.idle_timeout,
            previous,
        ));
        debug!(chat_id = chat.0, "session worker started");
        if tx.send(inbound).is_ok() {
            self.workers.insert(chat, Worker { tx, handle });
        }
    }

    /// Workers that have not exited yet.
    pub fn active_workers(&self) -> usize {
        self.workers
            .values()
            .filter(|w| !w.handle.is_finished())
            .count()
    }

    /// Stop accepting events and wait for every worker to drain its queue.
    pub async fn shutdown(self) {
        let handles: Vec<_> = self
            .workers
            .into_values()
            .map(|Worker { tx, handle }| {
                drop(tx);
                handle
            })
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "session worker panicked");
            }
        }
    }
}

async fn run_worker(
    bot: Arc<Bot>,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    restart_tx: mpsc::Sender<()>,
    idle_timeout: Duration,
    previous: Option<JoinHandle<()>>,
) {
    // keep arrival order behind a predecessor that is still draining
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            error!(error = %e, "session worker panicked");
        }
    }

    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(event)) => handle_queued(&bot, &restart_tx, event).await,
            Ok(None) => return,
            Err(_) => {
                rx.close();
                while let Ok(event) = rx.try_recv() {
                    handle_queued(&bot, &restart_tx, event).await;
                }
                debug!("session worker idle; exiting");
                return;
            }
        }
    }
}

async fn handle_queued(bot: &Bot, restart_tx: &mpsc::Sender<()>, event: Inbound) {
    if bot.handle(event).await == DispatchOutcome::Restart {
        // one pending request is enough
        let _ = restart_tx.try_send(());
    }
}

/// Serve JSON-lines events from `reader` until end of input or a restart
/// request. Plain lines are attributed to `default_user`.
pub async fn serve<R>(bot: Arc<Bot>, reader: R, default_user: UserId) -> Result<DispatchOutcome, NetbotError>
where
    R: AsyncBufRead + Unpin,
{
    let (restart_tx, mut restart_rx) = mpsc::channel::<()>(1);
    let mut router = SessionRouter::new(bot.clone(), restart_tx);
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            Some(()) = restart_rx.recv() => {
                info!("restart requested; draining session workers");
                router.shutdown().await;
                return Ok(DispatchOutcome::Restart);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_inbound(&line, default_user) {
                    Ok(inbound) => router.route(inbound),
                    Err(e) => bot.record_uncaught(&format!("unreadable inbound event: {}", e)),
                }
            }
        }
    }

    router.shutdown().await;
    if restart_rx.try_recv().is_ok() {
        return Ok(DispatchOutcome::Restart);
    }
    info!("input closed");
    Ok(DispatchOutcome::Continue)
}
