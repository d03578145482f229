//! Recording collaborator doubles shared by the unit tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use muster_core::ParticipantId;

use crate::collaborators::{
    Collaborators, EntitySpawner, PhaseController, SelectionPresentation, SpawnError,
    SpawnRequest, SpawnedEntities,
};

#[derive(Debug, Default)]
pub struct RecordingSpawner {
    spawned: Mutex<Vec<(ParticipantId, String, String)>>,
    next_entity: AtomicU64,
    reject: Option<ParticipantId>,
    unavailable: bool,
}

impl RecordingSpawner {
    pub fn rejecting(participant: ParticipantId) -> Self {
        Self {
            reject: Some(participant),
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn spawned_names(&self) -> Vec<(String, String)> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(|(_, player, pet)| (player.clone(), pet.clone()))
            .collect()
    }

    pub fn spawned_participants(&self) -> Vec<ParticipantId> {
        self.spawned.lock().unwrap().iter().map(|(p, _, _)| *p).collect()
    }
}

impl EntitySpawner for RecordingSpawner {
    fn spawn_for_participant(
        &self,
        request: &SpawnRequest<'_>,
    ) -> Result<SpawnedEntities, SpawnError> {
        if self.unavailable {
            return Err(SpawnError::Unavailable);
        }
        if self.reject == Some(request.participant) {
            return Err(SpawnError::Rejected("test rejection".to_string()));
        }

        self.spawned.lock().unwrap().push((
            request.participant,
            request.player_name().to_string(),
            request.pet_name().to_string(),
        ));
        let base = self.next_entity.fetch_add(2, Ordering::SeqCst);
        Ok(SpawnedEntities {
            participant: request.participant,
            player_entity: base + 1,
            pet_entity: base + 2,
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingPresentation {
    ensures: AtomicUsize,
    teardowns: AtomicUsize,
}

impl RecordingPresentation {
    pub fn ensures(&self) -> usize {
        self.ensures.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

impl SelectionPresentation for RecordingPresentation {
    fn ensure_shared_objects_spawned(&self) {
        self.ensures.fetch_add(1, Ordering::SeqCst);
    }

    fn teardown_selection_ui(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Presentation whose teardown panics, after the phase switch has run.
#[derive(Debug, Default)]
pub struct PanickingTeardown;

impl SelectionPresentation for PanickingTeardown {
    fn ensure_shared_objects_spawned(&self) {}

    fn teardown_selection_ui(&self) {
        panic!("selection UI teardown failed");
    }
}

pub fn collaborators_with(
    spawner: Arc<dyn EntitySpawner>,
    phase: Arc<dyn PhaseController>,
    presentation: Arc<dyn SelectionPresentation>,
) -> Collaborators {
    Collaborators::new(spawner, phase, presentation)
}
