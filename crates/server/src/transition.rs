//! Transition Orchestrator.
//!
//! One-shot sequence that moves a ready group out of character selection:
//!
//! ```text
//! Idle -> Announcing -> Spawning -> Finalizing -> Done
//!                           \-> Halted (collaborator unavailable)
//! ```
//!
//! The orchestrator works on a [`TransitionPlan`] captured when the latch
//! fires and never touches the session store, so disconnects keep flowing
//! through the coordinator while it sleeps between steps.

use std::sync::Arc;
use std::time::Duration;

use muster_core::{GamePhase, ParticipantId, PlayerSelection, SelectionCatalog};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::collaborators::{
    Collaborators, EntitySpawner, PhaseController, SpawnError, SpawnRequest, SpawnedEntities,
};
use crate::protocol::ServerEvent;
use crate::store::SessionStore;

/// Default announcement shown to every client.
pub const DEFAULT_TRANSITION_MESSAGE: &str = "Everyone is ready. The journey begins!";

/// Pause after the announcement before spawning starts.
pub const DEFAULT_ANNOUNCE_DELAY_MS: u64 = 1500;

/// Pause between two participants' spawns.
pub const DEFAULT_SPAWN_INTERVAL_MS: u64 = 100;

/// Pause between the phase switch and selection UI teardown.
pub const DEFAULT_TEARDOWN_DELAY_MS: u64 = 500;

// ============================================================================
// Plan and Stages
// ============================================================================

/// Orchestrator progress, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionStage {
    #[default]
    Idle,
    Announcing,
    Spawning,
    Finalizing,
    Done,
    /// The attempt stopped early. The phase changed only if it had
    /// already reached `Finalizing`.
    Halted,
}

impl TransitionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Halted)
    }

    /// The phase switch may already have been applied.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Finalizing | Self::Done)
    }
}

/// One participant as captured when the latch fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedParticipant {
    pub participant: ParticipantId,
    pub selection: PlayerSelection,
}

/// Participants to spawn, in join order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransitionPlan {
    pub participants: Vec<PlannedParticipant>,
}

impl TransitionPlan {
    pub fn capture(store: &SessionStore) -> Self {
        Self {
            participants: store
                .snapshot()
                .into_iter()
                .map(|record| PlannedParticipant {
                    participant: record.participant,
                    selection: record.selection,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// Orchestrator timings and announcement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionConfig {
    pub message: String,
    pub announce_delay: Duration,
    pub spawn_interval: Duration,
    pub teardown_delay: Duration,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            message: DEFAULT_TRANSITION_MESSAGE.to_string(),
            announce_delay: Duration::from_millis(DEFAULT_ANNOUNCE_DELAY_MS),
            spawn_interval: Duration::from_millis(DEFAULT_SPAWN_INTERVAL_MS),
            teardown_delay: Duration::from_millis(DEFAULT_TEARDOWN_DELAY_MS),
        }
    }
}

impl TransitionConfig {
    /// No delays; used by tests and headless tools.
    pub fn immediate() -> Self {
        Self {
            announce_delay: Duration::ZERO,
            spawn_interval: Duration::ZERO,
            teardown_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// A participant the orchestrator could not spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedParticipant {
    pub participant: ParticipantId,
    pub reason: String,
}

/// Result of a completed transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransitionReport {
    pub spawned: Vec<SpawnedEntities>,
    pub skipped: Vec<SkippedParticipant>,
}

/// Why a transition attempt halted.
///
/// The coordinator re-arms its latch unless [`Self::phase_committed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("entity spawner is unavailable")]
    SpawnerUnavailable,
    #[error("phase controller is unavailable")]
    PhaseControllerUnavailable,
    /// The orchestrator task ended without reporting (panic or abort).
    #[error("transition task aborted (committed: {committed})")]
    Aborted { committed: bool },
}

impl TransitionError {
    /// The attempt got far enough to switch the phase.
    pub fn phase_committed(&self) -> bool {
        matches!(self, Self::Aborted { committed: true })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs one transition attempt.
pub struct TransitionOrchestrator {
    plan: TransitionPlan,
    catalog: Arc<SelectionCatalog>,
    collaborators: Collaborators,
    config: TransitionConfig,
    events: broadcast::Sender<ServerEvent>,
    stage: Arc<watch::Sender<TransitionStage>>,
}

impl TransitionOrchestrator {
    pub fn new(
        plan: TransitionPlan,
        catalog: Arc<SelectionCatalog>,
        collaborators: Collaborators,
        config: TransitionConfig,
        events: broadcast::Sender<ServerEvent>,
        stage: Arc<watch::Sender<TransitionStage>>,
    ) -> Self {
        Self {
            plan,
            catalog,
            collaborators,
            config,
            events,
            stage,
        }
    }

    /// Execute the sequence to completion or until a collaborator is missing.
    pub async fn run(self) -> Result<TransitionReport, TransitionError> {
        self.enter(TransitionStage::Announcing);
        self.publish(ServerEvent::TransitionStarting {
            message: self.config.message.clone(),
        });
        pause(self.config.announce_delay).await;

        self.enter(TransitionStage::Spawning);
        let (spawner, phase) = match self.required_collaborators() {
            Ok(pair) => pair,
            Err(err) => return Err(self.halt(err)),
        };
        let report = match self.spawn_all(spawner.as_ref()).await {
            Ok(report) => report,
            Err(err) => return Err(self.halt(err)),
        };

        self.enter(TransitionStage::Finalizing);
        phase.set_joinable(false);
        phase.set_phase(GamePhase::Gameplay);
        self.publish(ServerEvent::PhaseChanged(GamePhase::Gameplay));
        pause(self.config.teardown_delay).await;
        self.collaborators.presentation.teardown_selection_ui();

        self.enter(TransitionStage::Done);
        tracing::info!(
            target: "muster::transition",
            spawned = report.spawned.len(),
            skipped = report.skipped.len(),
            "transition complete"
        );
        Ok(report)
    }

    fn required_collaborators(
        &self,
    ) -> Result<(Arc<dyn EntitySpawner>, Arc<dyn PhaseController>), TransitionError> {
        let spawner = self
            .collaborators
            .spawner
            .clone()
            .ok_or(TransitionError::SpawnerUnavailable)?;
        let phase = self
            .collaborators
            .phase
            .clone()
            .ok_or(TransitionError::PhaseControllerUnavailable)?;
        Ok((spawner, phase))
    }

    async fn spawn_all(
        &self,
        spawner: &dyn EntitySpawner,
    ) -> Result<TransitionReport, TransitionError> {
        let mut report = TransitionReport::default();
        let mut first = true;

        for planned in &self.plan.participants {
            if !planned.selection.has_selection() {
                continue;
            }
            if !first {
                pause(self.config.spawn_interval).await;
            }
            first = false;

            let participant = planned.participant;
            let selection = &planned.selection;
            let entries = selection
                .character_index
                .and_then(|i| self.catalog.character(i))
                .zip(selection.pet_index.and_then(|i| self.catalog.pet(i)));
            let Some((character, pet)) = entries else {
                tracing::error!(
                    target: "muster::transition",
                    participant = %participant,
                    character_index = ?selection.character_index,
                    pet_index = ?selection.pet_index,
                    "catalog lookup failed; skipping participant"
                );
                report.skipped.push(SkippedParticipant {
                    participant,
                    reason: "catalog entry missing".to_string(),
                });
                continue;
            };

            let request = SpawnRequest {
                participant,
                character,
                pet,
                custom_player_name: non_empty(&selection.custom_player_name),
                custom_pet_name: non_empty(&selection.custom_pet_name),
            };
            match spawner.spawn_for_participant(&request) {
                Ok(spawned) => {
                    tracing::debug!(
                        target: "muster::transition",
                        participant = %participant,
                        player = request.player_name(),
                        pet = request.pet_name(),
                        "spawned participant"
                    );
                    report.spawned.push(spawned);
                }
                Err(SpawnError::Unavailable) => return Err(TransitionError::SpawnerUnavailable),
                Err(SpawnError::Rejected(reason)) => {
                    tracing::error!(
                        target: "muster::transition",
                        participant = %participant,
                        reason = %reason,
                        "spawn rejected; skipping participant"
                    );
                    report
                        .skipped
                        .push(SkippedParticipant { participant, reason });
                }
            }
        }

        Ok(report)
    }

    fn halt(&self, err: TransitionError) -> TransitionError {
        tracing::error!(
            target: "muster::transition",
            error = %err,
            "transition halted before finalizing"
        );
        self.enter(TransitionStage::Halted);
        err
    }

    fn enter(&self, stage: TransitionStage) {
        tracing::debug!(target: "muster::transition", ?stage, "stage");
        self.stage.send_replace(stage);
    }

    fn publish(&self, event: ServerEvent) {
        // No subscribers just means no clients are listening.
        let _ = self.events.send(event);
    }
}

fn non_empty(name: &str) -> Option<&str> {
    (!name.is_empty()).then_some(name)
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryPhase;
    use crate::testing::{RecordingPresentation, RecordingSpawner, collaborators_with};
    use muster_core::{BaseStats, CatalogEntry, CatalogKind, StarterDeckRef};

    fn selected(raw: u64, character: usize, pet: usize) -> PlannedParticipant {
        PlannedParticipant {
            participant: ParticipantId::new(raw),
            selection: PlayerSelection {
                character_index: Some(character),
                pet_index: Some(pet),
                ..Default::default()
            },
        }
    }

    fn orchestrator(
        plan: TransitionPlan,
        catalog: SelectionCatalog,
        collaborators: Collaborators,
    ) -> (
        TransitionOrchestrator,
        broadcast::Receiver<ServerEvent>,
        watch::Receiver<TransitionStage>,
    ) {
        let (events, rx) = broadcast::channel(16);
        let (stage, stage_rx) = watch::channel(TransitionStage::Idle);
        let orchestrator = TransitionOrchestrator::new(
            plan,
            Arc::new(catalog),
            collaborators,
            TransitionConfig::immediate(),
            events,
            Arc::new(stage),
        );
        (orchestrator, rx, stage_rx)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_full_sequence() {
        let spawner = Arc::new(RecordingSpawner::default());
        let phase = Arc::new(InMemoryPhase::new());
        let presentation = Arc::new(RecordingPresentation::default());
        let plan = TransitionPlan {
            participants: vec![selected(1, 0, 0), selected(2, 1, 2)],
        };
        let (orch, mut rx, stage) = orchestrator(
            plan,
            SelectionCatalog::builtin(),
            collaborators_with(spawner.clone(), phase.clone(), presentation.clone()),
        );

        let report = orch.run().await.unwrap();

        assert_eq!(report.spawned.len(), 2);
        assert!(report.skipped.is_empty());
        assert_eq!(
            spawner.spawned_names(),
            vec![
                ("Warden".to_string(), "Ember Fox".to_string()),
                ("Tinker".to_string(), "Glimmer Moth".to_string()),
            ]
        );
        assert_eq!(phase.phase(), GamePhase::Gameplay);
        assert!(!phase.is_joinable());
        assert_eq!(presentation.teardowns(), 1);
        assert_eq!(*stage.borrow(), TransitionStage::Done);

        let events = drain(&mut rx);
        assert!(matches!(events[0], ServerEvent::TransitionStarting { .. }));
        assert_eq!(events[1], ServerEvent::PhaseChanged(GamePhase::Gameplay));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_custom_names_forwarded() {
        let spawner = Arc::new(RecordingSpawner::default());
        let mut planned = selected(1, 2, 1);
        planned.selection.custom_player_name = "Rook".to_string();
        let plan = TransitionPlan {
            participants: vec![planned],
        };
        let (orch, _rx, _stage) = orchestrator(
            plan,
            SelectionCatalog::builtin(),
            collaborators_with(
                spawner.clone(),
                Arc::new(InMemoryPhase::new()),
                Arc::new(RecordingPresentation::default()),
            ),
        );

        orch.run().await.unwrap();
        assert_eq!(
            spawner.spawned_names(),
            vec![("Rook".to_string(), "Stone Tortoise".to_string())]
        );
    }

    /// A stale index (catalog changed under the plan) skips only that player.
    #[tokio::test]
    async fn test_stale_catalog_entry_skips_participant() {
        let entry = |name: &str| CatalogEntry {
            index: 0,
            kind: CatalogKind::Character,
            name: name.to_string(),
            portrait: String::new(),
            description: String::new(),
            starter_deck: StarterDeckRef::default(),
            base_stats: BaseStats::default(),
        };
        let small = SelectionCatalog::from_entries(vec![entry("Only")], vec![entry("Pip")]).unwrap();
        let spawner = Arc::new(RecordingSpawner::default());
        let phase = Arc::new(InMemoryPhase::new());
        let plan = TransitionPlan {
            participants: vec![selected(1, 2, 0), selected(2, 0, 0)],
        };
        let (orch, _rx, stage) = orchestrator(
            plan,
            small,
            collaborators_with(
                spawner.clone(),
                phase.clone(),
                Arc::new(RecordingPresentation::default()),
            ),
        );

        let report = orch.run().await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].participant, ParticipantId::new(1));
        assert_eq!(report.spawned.len(), 1);
        assert_eq!(report.spawned[0].participant, ParticipantId::new(2));
        assert_eq!(phase.phase(), GamePhase::Gameplay);
        assert_eq!(*stage.borrow(), TransitionStage::Done);
    }

    #[tokio::test]
    async fn test_rejected_spawn_skips_participant() {
        let spawner = Arc::new(RecordingSpawner::rejecting(ParticipantId::new(1)));
        let plan = TransitionPlan {
            participants: vec![selected(1, 0, 0), selected(2, 1, 1)],
        };
        let (orch, _rx, _stage) = orchestrator(
            plan,
            SelectionCatalog::builtin(),
            collaborators_with(
                spawner,
                Arc::new(InMemoryPhase::new()),
                Arc::new(RecordingPresentation::default()),
            ),
        );

        let report = orch.run().await.unwrap();
        assert_eq!(report.spawned.len(), 1);
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_spawner_halts_before_finalizing() {
        let phase = Arc::new(InMemoryPhase::new());
        let presentation = Arc::new(RecordingPresentation::default());
        let collaborators = Collaborators {
            spawner: None,
            phase: Some(phase.clone()),
            presentation: presentation.clone(),
        };
        let plan = TransitionPlan {
            participants: vec![selected(1, 0, 0), selected(2, 1, 1)],
        };
        let (orch, mut rx, stage) = orchestrator(plan, SelectionCatalog::builtin(), collaborators);

        assert_eq!(orch.run().await, Err(TransitionError::SpawnerUnavailable));
        assert_eq!(phase.phase(), GamePhase::Selection);
        assert!(phase.is_joinable());
        assert_eq!(presentation.teardowns(), 0);
        assert_eq!(*stage.borrow(), TransitionStage::Halted);

        let events = drain(&mut rx);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ServerEvent::PhaseChanged(_)))
        );
    }

    #[tokio::test]
    async fn test_spawner_going_unavailable_halts() {
        let spawner = Arc::new(RecordingSpawner::unavailable());
        let phase = Arc::new(InMemoryPhase::new());
        let plan = TransitionPlan {
            participants: vec![selected(1, 0, 0)],
        };
        let (orch, _rx, _stage) = orchestrator(
            plan,
            SelectionCatalog::builtin(),
            collaborators_with(spawner, phase.clone(), Arc::new(RecordingPresentation::default())),
        );

        assert_eq!(orch.run().await, Err(TransitionError::SpawnerUnavailable));
        assert_eq!(phase.phase(), GamePhase::Selection);
    }

    #[tokio::test]
    async fn test_missing_phase_controller_halts() {
        let spawner = Arc::new(RecordingSpawner::default());
        let collaborators = Collaborators {
            spawner: Some(spawner.clone()),
            phase: None,
            presentation: Arc::new(RecordingPresentation::default()),
        };
        let plan = TransitionPlan {
            participants: vec![selected(1, 0, 0)],
        };
        let (orch, _rx, _stage) = orchestrator(plan, SelectionCatalog::builtin(), collaborators);

        assert_eq!(
            orch.run().await,
            Err(TransitionError::PhaseControllerUnavailable)
        );
        // Nothing was spawned for a transition that cannot finish.
        assert!(spawner.spawned_names().is_empty());
    }

    #[test]
    fn test_only_late_aborts_count_as_committed() {
        assert!(!TransitionStage::Spawning.is_committed());
        assert!(TransitionStage::Finalizing.is_committed());
        assert!(!TransitionError::SpawnerUnavailable.phase_committed());
        assert!(!TransitionError::Aborted { committed: false }.phase_committed());
        assert!(TransitionError::Aborted { committed: true }.phase_committed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_respected() {
        let presentation = Arc::new(RecordingPresentation::default());
        let (events, _rx) = broadcast::channel(16);
        let (stage, mut stage_rx) = watch::channel(TransitionStage::Idle);
        let orch = TransitionOrchestrator::new(
            TransitionPlan {
                participants: vec![selected(1, 0, 0), selected(2, 1, 1)],
            },
            Arc::new(SelectionCatalog::builtin()),
            collaborators_with(
                Arc::new(RecordingSpawner::default()),
                Arc::new(InMemoryPhase::new()),
                presentation.clone(),
            ),
            TransitionConfig::default(),
            events,
            Arc::new(stage),
        );

        let started = tokio::time::Instant::now();
        let task = tokio::spawn(orch.run());

        stage_rx
            .wait_for(|s| *s == TransitionStage::Finalizing)
            .await
            .unwrap();
        assert_eq!(presentation.teardowns(), 0);

        task.await.unwrap().unwrap();
        let elapsed = started.elapsed();
        let expected = Duration::from_millis(
            DEFAULT_ANNOUNCE_DELAY_MS + DEFAULT_SPAWN_INTERVAL_MS + DEFAULT_TEARDOWN_DELAY_MS,
        );
        assert!(elapsed >= expected, "elapsed {elapsed:?} < {expected:?}");
        assert_eq!(presentation.teardowns(), 1);
    }
}
