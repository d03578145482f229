//! Muster Lobby Server
//!
//! Authoritative coordinator for the pre-match character selection lobby.
//! It owns:
//! - The Session Store (who is connected, what they picked, who is ready)
//! - Request validation against the Selection Catalog
//! - The one-shot transition latch and the Transition Orchestrator
//! - Roster broadcasts to every connected client
//!
//! # Architecture
//!
//! [`LobbyServer::spawn`] starts a single task that owns the
//! [`SessionCoordinator`]. Every client request, disconnect and
//! orchestration outcome is funnelled through one bounded queue, so store
//! mutations never interleave. The orchestrator runs on its own task and
//! never touches the store; it reports back through the same queue.
//!
//! ```text
//! LobbyHandle --mpsc--> LobbyServer (SessionCoordinator)
//!                           |  \--spawn--> TransitionOrchestrator
//!                           |                   | (stage: watch)
//!                           v                   v
//!                     broadcast<ServerEvent> to every subscriber
//! ```

#![deny(unsafe_code)]

pub mod collaborators;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod store;
pub mod transition;
pub mod validation;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use muster_core::{ParticipantId, ParticipantSummary, SelectionCatalog};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use collaborators::Collaborators;
use coordinator::{SessionCoordinator, TransitionLatch};
use error::LobbyError;
use protocol::{ClientRequest, SelectionRequest, ServerEvent};
use reconcile::{DEFAULT_RECONCILE_TIMEOUT_MS, LateJoinReconciler, SharedObjectRegistry};
use transition::{
    TransitionConfig, TransitionError, TransitionOrchestrator, TransitionPlan, TransitionReport,
    TransitionStage,
};
use validation::ValidationConfig;

// ============================================================================
// Lobby Parameters
// ============================================================================

/// Connected participants required before a ready-check can fire.
pub const DEFAULT_MIN_PARTICIPANTS: usize = 2;

/// Lobby capacity.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 4;

/// Pending requests before `LobbyHandle` calls wait for room.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Events kept for slow subscribers before they start lagging.
pub const EVENT_BUFFER_CAPACITY: usize = 256;

// ============================================================================
// Configuration
// ============================================================================

/// Lobby configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyConfig {
    pub min_participants: usize,
    pub max_participants: usize,
    pub validation: ValidationConfig,
    pub transition: TransitionConfig,
    pub reconcile_timeout: Duration,
    pub command_queue_capacity: usize,
    pub event_buffer_capacity: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            min_participants: DEFAULT_MIN_PARTICIPANTS,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            validation: ValidationConfig::default(),
            transition: TransitionConfig::default(),
            reconcile_timeout: Duration::from_millis(DEFAULT_RECONCILE_TIMEOUT_MS),
            command_queue_capacity: COMMAND_QUEUE_CAPACITY,
            event_buffer_capacity: EVENT_BUFFER_CAPACITY,
        }
    }
}

impl LobbyConfig {
    /// Effective quorum. Never below two.
    pub fn quorum(&self) -> usize {
        self.min_participants.max(DEFAULT_MIN_PARTICIPANTS)
    }

    /// Effective capacity. Never below the quorum, so a full lobby can
    /// always transition.
    pub fn capacity(&self) -> usize {
        self.max_participants.max(self.quorum())
    }

    /// Reconciler for a client initializing into this lobby.
    pub fn late_join_reconciler(&self, registry: Arc<SharedObjectRegistry>) -> LateJoinReconciler {
        LateJoinReconciler::new(registry, self.reconcile_timeout)
    }
}

// ============================================================================
// Server Task
// ============================================================================

enum Command {
    Request {
        participant: ParticipantId,
        request: ClientRequest,
    },
    Disconnect(ParticipantId),
    Roster(oneshot::Sender<Vec<ParticipantSummary>>),
    Latch(oneshot::Sender<TransitionLatch>),
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request {
                participant,
                request,
            } => write!(f, "Request({participant}, {})", request.name()),
            Self::Disconnect(participant) => write!(f, "Disconnect({participant})"),
            Self::Roster(_) => f.write_str("Roster"),
            Self::Latch(_) => f.write_str("Latch"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

enum Step {
    Command(Option<Command>),
    TransitionFinished(Result<TransitionReport, TransitionError>),
}

/// Owns the coordinator and applies queued commands one at a time.
pub struct LobbyServer {
    coordinator: SessionCoordinator,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<ServerEvent>,
    stage: Arc<watch::Sender<TransitionStage>>,
    transition: Option<JoinHandle<Result<TransitionReport, TransitionError>>>,
}

impl LobbyServer {
    /// Start the lobby on the current tokio runtime.
    pub fn spawn(
        config: LobbyConfig,
        catalog: Arc<SelectionCatalog>,
        collaborators: Collaborators,
    ) -> (LobbyHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::channel(config.command_queue_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_buffer_capacity.max(1));
        let (stage, stage_rx) = watch::channel(TransitionStage::Idle);

        let handle = LobbyHandle {
            commands: command_tx,
            events: events.clone(),
            stage: stage_rx,
            next_participant: Arc::new(AtomicU64::new(0)),
        };

        if config.max_participants < config.quorum() {
            tracing::warn!(
                target: "muster::lobby",
                max_participants = config.max_participants,
                quorum = config.quorum(),
                "max_participants below quorum; raising capacity to quorum"
            );
        }
        tracing::info!(
            target: "muster::lobby",
            quorum = config.quorum(),
            capacity = config.capacity(),
            characters = catalog.character_count(),
            pets = catalog.pet_count(),
            "lobby started"
        );

        let server = Self {
            coordinator: SessionCoordinator::new(config, catalog, collaborators),
            commands,
            events,
            stage: Arc::new(stage),
            transition: None,
        };
        (handle, tokio::spawn(server.run()))
    }

    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                outcome = transition_outcome(&mut self.transition, &self.stage) => {
                    Step::TransitionFinished(outcome)
                }
            };

            match step {
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => break,
                Step::Command(Some(command)) => {
                    let plan = self.dispatch(command);
                    self.flush();
                    if let Some(plan) = plan {
                        self.start_transition(plan);
                    }
                }
                Step::TransitionFinished(outcome) => {
                    self.transition = None;
                    self.coordinator.transition_finished(&outcome);
                    self.flush();
                }
            }
        }

        tracing::info!(target: "muster::lobby", "lobby stopped");
    }

    fn dispatch(&mut self, command: Command) -> Option<TransitionPlan> {
        match command {
            Command::Request {
                participant,
                request,
            } => self.coordinator.handle_request(participant, request),
            Command::Disconnect(participant) => {
                self.coordinator.handle_disconnect(participant);
                None
            }
            Command::Roster(reply) => {
                let _ = reply.send(self.coordinator.summaries());
                None
            }
            Command::Latch(reply) => {
                let _ = reply.send(self.coordinator.latch());
                None
            }
            Command::Shutdown => None,
        }
    }

    /// Forward the coordinator's outbox to subscribers, in order.
    fn flush(&mut self) {
        for event in self.coordinator.drain_events() {
            // No subscribers just means no clients are listening.
            let _ = self.events.send(event);
        }
    }

    fn start_transition(&mut self, plan: TransitionPlan) {
        let orchestrator = TransitionOrchestrator::new(
            plan,
            self.coordinator.catalog().clone(),
            self.coordinator.collaborators().clone(),
            self.coordinator.config().transition.clone(),
            self.events.clone(),
            self.stage.clone(),
        );
        self.transition = Some(tokio::spawn(orchestrator.run()));
    }
}

async fn transition_outcome(
    task: &mut Option<JoinHandle<Result<TransitionReport, TransitionError>>>,
    stage: &watch::Sender<TransitionStage>,
) -> Result<TransitionReport, TransitionError> {
    let Some(handle) = task else {
        return std::future::pending().await;
    };
    match handle.await {
        Ok(outcome) => outcome,
        Err(err) => {
            // The last published stage tells whether the phase switch ran.
            let committed = stage.borrow().is_committed();
            tracing::error!(
                target: "muster::transition",
                error = %err,
                committed,
                "transition task failed"
            );
            stage.send_replace(TransitionStage::Halted);
            Err(TransitionError::Aborted { committed })
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable front door to a running [`LobbyServer`].
///
/// Calls return once the command is queued, not once it is applied;
/// rejections are logged by the server. Only `submit` reports decode
/// failures, since those never reach the queue.
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ServerEvent>,
    stage: watch::Receiver<TransitionStage>,
    next_participant: Arc<AtomicU64>,
}

impl LobbyHandle {
    /// Allocate an id for a new connection. Ids are never reused.
    pub fn connect(&self) -> ParticipantId {
        ParticipantId::new(self.next_participant.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub async fn join(
        &self,
        participant: ParticipantId,
        display_name: &str,
    ) -> Result<(), LobbyError> {
        self.request(
            participant,
            ClientRequest::Join {
                display_name: display_name.to_string(),
            },
        )
        .await
    }

    pub async fn update_selection(
        &self,
        participant: ParticipantId,
        selection: SelectionRequest,
    ) -> Result<(), LobbyError> {
        self.request(participant, ClientRequest::UpdateSelection(selection))
            .await
    }

    pub async fn toggle_ready(&self, participant: ParticipantId) -> Result<(), LobbyError> {
        self.request(participant, ClientRequest::ToggleReady).await
    }

    /// Decode a wire frame from `participant` and queue it.
    pub async fn submit(&self, participant: ParticipantId, frame: &[u8]) -> Result<(), LobbyError> {
        let request = ClientRequest::decode(frame).inspect_err(|err| {
            tracing::warn!(
                target: "muster::lobby",
                participant = %participant,
                bytes = frame.len(),
                error = %err,
                "dropping malformed frame"
            );
        })?;
        self.request(participant, request).await
    }

    pub async fn disconnect(&self, participant: ParticipantId) -> Result<(), LobbyError> {
        self.send(Command::Disconnect(participant)).await
    }

    /// Current roster, after every previously queued command.
    pub async fn roster(&self) -> Result<Vec<ParticipantSummary>, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Roster(reply)).await?;
        rx.await.map_err(|_| LobbyError::ServerStopped)
    }

    pub async fn latch(&self) -> Result<TransitionLatch, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Latch(reply)).await?;
        rx.await.map_err(|_| LobbyError::ServerStopped)
    }

    /// Receive every broadcast from now on.
    ///
    /// A receiver more than `event_buffer_capacity` events behind gets
    /// `RecvError::Lagged` and misses the skipped roster snapshots; call
    /// [`Self::roster`] after a lag to resynchronize.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn transition_stage(&self) -> watch::Receiver<TransitionStage> {
        self.stage.clone()
    }

    pub async fn shutdown(&self) -> Result<(), LobbyError> {
        self.send(Command::Shutdown).await
    }

    async fn request(
        &self,
        participant: ParticipantId,
        request: ClientRequest,
    ) -> Result<(), LobbyError> {
        self.send(Command::Request {
            participant,
            request,
        })
        .await
    }

    async fn send(&self, command: Command) -> Result<(), LobbyError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LobbyError::ServerStopped)
    }
}

// ============================================================================
// Tests
// ============================================================================
