//! External collaborators consumed by the lobby.
//!
//! The coordinator and the transition orchestrator never discover these at
//! runtime; they are handed in through [`Collaborators`] at construction.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use muster_core::{CatalogEntry, GamePhase, ParticipantId};
use thiserror::Error;

/// Identifier of a game-side entity created by the spawner.
pub type EntityId = u64;

// ============================================================================
// Entity Spawner
// ============================================================================

/// Everything the spawner needs to materialize one participant.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub participant: ParticipantId,
    pub character: &'a CatalogEntry,
    pub pet: &'a CatalogEntry,
    /// `None` when the participant kept the catalog name.
    pub custom_player_name: Option<&'a str>,
    pub custom_pet_name: Option<&'a str>,
}

impl SpawnRequest<'_> {
    pub fn player_name(&self) -> &str {
        self.custom_player_name.unwrap_or(&self.character.name)
    }

    pub fn pet_name(&self) -> &str {
        self.custom_pet_name.unwrap_or(&self.pet.name)
    }
}

/// Entities created for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedEntities {
    pub participant: ParticipantId,
    pub player_entity: EntityId,
    pub pet_entity: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// The spawner cannot serve any request right now.
    #[error("entity spawner is unavailable")]
    Unavailable,
    /// This one participant could not be spawned.
    #[error("spawn rejected: {0}")]
    Rejected(String),
}

/// Creates game-side entities for a participant's selection.
pub trait EntitySpawner: Send + Sync {
    fn spawn_for_participant(
        &self,
        request: &SpawnRequest<'_>,
    ) -> Result<SpawnedEntities, SpawnError>;
}

// ============================================================================
// Phase Controller
// ============================================================================

/// Owns the global game phase and whether the session accepts new players.
pub trait PhaseController: Send + Sync {
    fn set_phase(&self, phase: GamePhase);
    fn phase(&self) -> GamePhase;
    fn set_joinable(&self, joinable: bool);
}

/// Phase controller for a single in-process session.
#[derive(Debug)]
pub struct InMemoryPhase {
    state: Mutex<PhaseState>,
}

#[derive(Debug, Clone, Copy)]
struct PhaseState {
    phase: GamePhase,
    joinable: bool,
}

impl InMemoryPhase {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PhaseState {
                phase: GamePhase::Selection,
                joinable: true,
            }),
        }
    }

    pub fn is_joinable(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .joinable
    }
}

impl Default for InMemoryPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseController for InMemoryPhase {
    fn set_phase(&self, phase: GamePhase) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase = phase;
    }

    fn phase(&self) -> GamePhase {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase
    }

    fn set_joinable(&self, joinable: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .joinable = joinable;
    }
}

// ============================================================================
// Selection Presentation
// ============================================================================

/// Selection-phase presentation layer (widgets, preview objects).
pub trait SelectionPresentation: Send + Sync {
    /// Make sure the shared per-choice objects exist. Idempotent.
    fn ensure_shared_objects_spawned(&self);
    /// Release all selection-phase presentation state.
    fn teardown_selection_ui(&self);
}

/// Presentation layer for headless servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPresentation;

impl SelectionPresentation for HeadlessPresentation {
    fn ensure_shared_objects_spawned(&self) {}

    fn teardown_selection_ui(&self) {}
}

// ============================================================================
// Collaborator Set
// ============================================================================

/// The collaborators a lobby is wired to.
///
/// A missing spawner or phase controller is tolerated until a transition
/// needs it; the transition attempt then halts without switching phase.
#[derive(Clone)]
pub struct Collaborators {
    pub spawner: Option<Arc<dyn EntitySpawner>>,
    pub phase: Option<Arc<dyn PhaseController>>,
    pub presentation: Arc<dyn SelectionPresentation>,
}

impl Collaborators {
    pub fn new(
        spawner: Arc<dyn EntitySpawner>,
        phase: Arc<dyn PhaseController>,
        presentation: Arc<dyn SelectionPresentation>,
    ) -> Self {
        Self {
            spawner: Some(spawner),
            phase: Some(phase),
            presentation,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("spawner", &self.spawner.is_some())
            .field("phase", &self.phase.is_some())
            .finish_non_exhaustive()
    }
}
