//! Session Coordinator.
//!
//! Applies client requests to the [`SessionStore`], emits roster broadcasts
//! and decides when the group transitions out of selection. Runs on the
//! single authoritative execution context; every method takes `&mut self`,
//! so requests are applied one at a time.

use std::sync::Arc;

use muster_core::{ParticipantId, ParticipantSummary, SelectionCatalog};

use crate::LobbyConfig;
use crate::collaborators::Collaborators;
use crate::error::LobbyError;
use crate::protocol::{ClientRequest, SelectionRequest, ServerEvent};
use crate::store::SessionStore;
use crate::transition::{TransitionError, TransitionPlan, TransitionReport};
use crate::validation::{display_name_or_placeholder, validate_selection};

/// One-shot guard around the phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionLatch {
    /// The transition may fire.
    Armed,
    /// An attempt is running.
    Fired,
    /// The transition finished; terminal.
    Completed,
}

/// Result of an accepted join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// Duplicate join; the store was left untouched.
    AlreadyJoined,
}

/// Server-side lobby state machine.
pub struct SessionCoordinator {
    config: LobbyConfig,
    catalog: Arc<SelectionCatalog>,
    catalog_digest: String,
    collaborators: Collaborators,
    store: SessionStore,
    latch: TransitionLatch,
    /// Events produced since the last `drain_events`, in emission order.
    outbox: Vec<ServerEvent>,
}

impl SessionCoordinator {
    pub fn new(
        config: LobbyConfig,
        catalog: Arc<SelectionCatalog>,
        collaborators: Collaborators,
    ) -> Self {
        let catalog_digest = catalog.digest();
        Self {
            config,
            catalog,
            catalog_digest,
            collaborators,
            store: SessionStore::new(),
            latch: TransitionLatch::Armed,
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<SelectionCatalog> {
        &self.catalog
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn latch(&self) -> TransitionLatch {
        self.latch
    }

    /// Dispatch a decoded request. Rejections are logged and dropped.
    ///
    /// Returns a plan when this request fired the transition latch.
    pub fn handle_request(
        &mut self,
        participant: ParticipantId,
        request: ClientRequest,
    ) -> Option<TransitionPlan> {
        let name = request.name();
        let result = match request {
            ClientRequest::Join { display_name } => {
                self.join(participant, &display_name).map(|_| None)
            }
            ClientRequest::UpdateSelection(selection) => {
                self.update_selection(participant, &selection).map(|_| None)
            }
            ClientRequest::ToggleReady => self.toggle_ready(participant),
        };

        match result {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(
                    target: "muster::lobby",
                    participant = %participant,
                    request = name,
                    error = %err,
                    "request rejected"
                );
                None
            }
        }
    }

    /// Admit a participant. Repeated joins are ignored, including the
    /// display name they carry.
    pub fn join(
        &mut self,
        participant: ParticipantId,
        requested_display_name: &str,
    ) -> Result<JoinOutcome, LobbyError> {
        if self.store.contains(participant) {
            tracing::debug!(target: "muster::lobby", participant = %participant, "duplicate join ignored");
            return Ok(JoinOutcome::AlreadyJoined);
        }
        if self.latch != TransitionLatch::Armed {
            return Err(LobbyError::SessionLocked);
        }
        let max = self.config.capacity();
        if self.store.len() >= max {
            return Err(LobbyError::SessionFull { max });
        }

        let display_name =
            display_name_or_placeholder(requested_display_name, participant, &self.config.validation);
        self.store
            .add_participant(participant, display_name.clone());
        self.collaborators
            .presentation
            .ensure_shared_objects_spawned();

        tracing::info!(
            target: "muster::lobby",
            participant = %participant,
            display_name = %display_name,
            connected = self.store.len(),
            "participant joined"
        );
        self.outbox.push(ServerEvent::JoinAccepted {
            participant,
            display_name,
            catalog_digest: self.catalog_digest.clone(),
        });
        self.broadcast();
        Ok(JoinOutcome::Joined)
    }

    /// Replace a participant's selection and clear their ready flag.
    ///
    /// A rejected request from a known participant still triggers a
    /// broadcast so the sender re-syncs to the authoritative roster.
    pub fn update_selection(
        &mut self,
        participant: ParticipantId,
        request: &SelectionRequest,
    ) -> Result<(), LobbyError> {
        if !self.store.contains(participant) {
            return Err(LobbyError::UnknownParticipant(participant));
        }

        let result = validate_selection(request, &self.catalog, &self.config.validation)
            .and_then(|selection| self.store.set_selection(participant, selection));
        self.broadcast();
        result
    }

    /// Flip a participant's ready flag, then evaluate the transition
    /// condition.
    pub fn toggle_ready(
        &mut self,
        participant: ParticipantId,
    ) -> Result<Option<TransitionPlan>, LobbyError> {
        let ready = self
            .store
            .is_ready(participant)
            .ok_or(LobbyError::UnknownParticipant(participant))?;
        self.store.set_ready(participant, !ready)?;

        tracing::debug!(
            target: "muster::lobby",
            participant = %participant,
            ready = !ready,
            "ready toggled"
        );
        self.broadcast();
        Ok(self.try_fire())
    }

    /// Remove a participant. Returns `false` if they were not in the lobby.
    ///
    /// An in-flight transition is not affected.
    pub fn handle_disconnect(&mut self, participant: ParticipantId) -> bool {
        if !self.store.remove_participant(participant) {
            return false;
        }

        tracing::info!(
            target: "muster::lobby",
            participant = %participant,
            connected = self.store.len(),
            latch = ?self.latch,
            "participant left"
        );
        self.broadcast();
        true
    }

    /// Quorum reached and every connected participant ready with a
    /// complete selection.
    pub fn transition_condition_met(&self) -> bool {
        self.store.len() >= self.config.quorum() && self.store.all_ready()
    }

    /// Record the outcome of the attempt started by the last fired plan.
    pub fn transition_finished(&mut self, outcome: &Result<TransitionReport, TransitionError>) {
        match outcome {
            Ok(_) => {
                self.latch = TransitionLatch::Completed;
            }
            Err(err) if err.phase_committed() => {
                tracing::error!(
                    target: "muster::lobby",
                    error = %err,
                    "transition failed after the phase switch; latch stays closed"
                );
                self.latch = TransitionLatch::Completed;
            }
            Err(err) => {
                tracing::warn!(
                    target: "muster::lobby",
                    error = %err,
                    "transition attempt failed; latch re-armed"
                );
                self.latch = TransitionLatch::Armed;
            }
        }
    }

    /// Current roster in join order.
    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        self.store
            .snapshot()
            .iter()
            .map(|record| {
                ParticipantSummary::build(
                    record.participant,
                    &record.display_name,
                    &record.selection,
                    record.ready,
                    &self.catalog,
                )
            })
            .collect()
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn broadcast(&mut self) {
        let summaries = self.summaries();
        self.outbox.push(ServerEvent::SelectionsUpdated(summaries));
    }

    fn try_fire(&mut self) -> Option<TransitionPlan> {
        if self.latch != TransitionLatch::Armed || !self.transition_condition_met() {
            return None;
        }

        self.latch = TransitionLatch::Fired;
        let plan = TransitionPlan::capture(&self.store);
        tracing::info!(
            target: "muster::lobby",
            participants = plan.len(),
            "all participants ready; transition latch fired"
        );
        Some(plan)
    }
}
