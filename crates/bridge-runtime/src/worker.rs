//! Background Query Worker
//!
//! Owns a [`BridgeClient`] on its own task. Front ends send commands through
//! a cloneable [`WorkerHandle`] and await each answer on a oneshot channel.

use std::sync::Arc;

use bridge_core::{
    BridgeClient,
    error::{BridgeError, Result},
    message::Conversation,
    orchestrator::QueryOutcome,
    session::{ProviderSession, SwitchOutcome},
    tool::ToolCatalog,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 32;

enum Command {
    Query {
        text: String,
        reply: oneshot::Sender<Result<QueryOutcome>>,
    },
    Switch {
        provider: String,
        model: Option<String>,
        reply: oneshot::Sender<Result<SwitchOutcome>>,
    },
    ActiveSession {
        reply: oneshot::Sender<Arc<ProviderSession>>,
    },
    ListTools {
        reply: oneshot::Sender<Arc<ToolCatalog>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Worker task state
pub struct QueryWorker {
    client: BridgeClient,
    keep_history: bool,
    conversation: Conversation,
    commands: mpsc::Receiver<Command>,
}

impl QueryWorker {
    /// Start the worker; with `keep_history` every query continues one
    /// conversation, otherwise each query starts fresh
    pub fn spawn(client: BridgeClient, keep_history: bool) -> (WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = Self {
            client,
            keep_history,
            conversation: Conversation::new(),
            commands: rx,
        };

        let task = tokio::spawn(worker.run());
        (WorkerHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        tracing::debug!(keep_history = self.keep_history, "Query worker started");

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Query { text, reply } => {
                    let outcome = if self.keep_history {
                        self.client.process_query(&mut self.conversation, &text).await
                    } else {
                        self.client.ask(&text).await
                    };
                    let _ = reply.send(outcome);
                }
                Command::Switch { provider, model, reply } => {
                    let outcome = self.client.switch_provider(&provider, model.as_deref()).await;
                    let _ = reply.send(outcome);
                }
                Command::ActiveSession { reply } => {
                    let _ = reply.send(self.client.active_session().await);
                }
                Command::ListTools { reply } => {
                    let _ = reply.send(self.client.tools().await);
                }
                Command::Reset { reply } => {
                    self.conversation = Conversation::new();
                    let _ = reply.send(());
                }
                Command::Shutdown { reply } => {
                    let _ = reply.send(());
                    break;
                }
            }
        }

        tracing::debug!("Query worker stopped");
    }
}

/// Cloneable handle to a running [`QueryWorker`]
#[derive(Clone)]
pub struct WorkerHandle {
    commands: mpsc::Sender<Command>,
}

impl WorkerHandle {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(build(tx)).await.map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn query(&self, text: impl Into<String>) -> Result<QueryOutcome> {
        let text = text.into();
        self.call(|reply| Command::Query { text, reply }).await?
    }

    pub async fn switch(&self, provider: &str, model: Option<&str>) -> Result<SwitchOutcome> {
        let provider = provider.to_string();
        let model = model.map(str::to_string);
        self.call(|reply| Command::Switch { provider, model, reply }).await?
    }

    pub async fn active_session(&self) -> Result<Arc<ProviderSession>> {
        self.call(|reply| Command::ActiveSession { reply }).await
    }

    pub async fn list_tools(&self) -> Result<Arc<ToolCatalog>> {
        self.call(|reply| Command::ListTools { reply }).await
    }

    /// Drop kept history
    pub async fn reset(&self) -> Result<()> {
        self.call(|reply| Command::Reset { reply }).await
    }

    /// Stop the worker once earlier commands have been answered
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply }).await
    }
}

fn stopped() -> BridgeError {
    BridgeError::Other("query worker has stopped".into())
}
