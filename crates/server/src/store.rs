//! Session Store.
//!
//! Authoritative participant state, owned by the coordinator. Selections,
//! ready flags and display names are kept in lock-step: an entry is created
//! in all three maps on join and removed from all three on disconnect.

use std::collections::HashMap;

use muster_core::{ParticipantId, PlayerSelection};

use crate::error::LobbyError;

/// One participant's stored state, as seen through [`SessionStore::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    pub participant: ParticipantId,
    pub display_name: String,
    pub selection: PlayerSelection,
    pub ready: bool,
}

/// Participant state for one lobby session.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    /// Connected participants in join order.
    order: Vec<ParticipantId>,
    selections: HashMap<ParticipantId, PlayerSelection>,
    ready: HashMap<ParticipantId, bool>,
    display_names: HashMap<ParticipantId, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant with an empty selection and `ready = false`.
    ///
    /// Returns `false` (and changes nothing) if the participant already exists.
    pub fn add_participant(&mut self, participant: ParticipantId, display_name: String) -> bool {
        if self.contains(participant) {
            return false;
        }

        self.order.push(participant);
        self.selections
            .insert(participant, PlayerSelection::default());
        self.ready.insert(participant, false);
        self.display_names.insert(participant, display_name);

        debug_assert!(self.is_consistent());
        true
    }

    /// Remove a participant from every map. Returns `false` if unknown.
    pub fn remove_participant(&mut self, participant: ParticipantId) -> bool {
        let Some(pos) = self.order.iter().position(|&p| p == participant) else {
            return false;
        };

        self.order.remove(pos);
        self.selections.remove(&participant);
        self.ready.remove(&participant);
        self.display_names.remove(&participant);

        debug_assert!(self.is_consistent());
        true
    }

    /// Replace a participant's selection. Always clears their ready flag.
    pub fn set_selection(
        &mut self,
        participant: ParticipantId,
        selection: PlayerSelection,
    ) -> Result<(), LobbyError> {
        let slot = self
            .selections
            .get_mut(&participant)
            .ok_or(LobbyError::UnknownParticipant(participant))?;
        *slot = selection;
        self.ready.insert(participant, false);
        Ok(())
    }

    /// Set a participant's ready flag.
    ///
    /// Setting `true` requires a complete selection.
    pub fn set_ready(&mut self, participant: ParticipantId, ready: bool) -> Result<(), LobbyError> {
        let selection = self
            .selections
            .get(&participant)
            .ok_or(LobbyError::UnknownParticipant(participant))?;
        if ready && !selection.has_selection() {
            return Err(LobbyError::SelectionIncomplete(participant));
        }
        self.ready.insert(participant, ready);
        Ok(())
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.selections.contains_key(&participant)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Connected participants in join order.
    pub fn participants(&self) -> &[ParticipantId] {
        &self.order
    }

    pub fn selection(&self, participant: ParticipantId) -> Option<&PlayerSelection> {
        self.selections.get(&participant)
    }

    pub fn is_ready(&self, participant: ParticipantId) -> Option<bool> {
        self.ready.get(&participant).copied()
    }

    pub fn display_name(&self, participant: ParticipantId) -> Option<&str> {
        self.display_names.get(&participant).map(String::as_str)
    }

    /// True iff at least one participant is connected and every connected
    /// participant is ready with a complete selection.
    pub fn all_ready(&self) -> bool {
        !self.order.is_empty()
            && self.order.iter().all(|p| {
                self.is_ready(*p) == Some(true)
                    && self.selection(*p).is_some_and(PlayerSelection::has_selection)
            })
    }

    /// Records for every participant, in join order.
    pub fn snapshot(&self) -> Vec<ParticipantRecord> {
        self.order
            .iter()
            .filter_map(|&participant| {
                Some(ParticipantRecord {
                    participant,
                    display_name: self.display_names.get(&participant)?.clone(),
                    selection: self.selections.get(&participant)?.clone(),
                    ready: *self.ready.get(&participant)?,
                })
            })
            .collect()
    }

    /// Check the lock-step and ready-implies-selection invariants.
    pub fn is_consistent(&self) -> bool {
        let n = self.order.len();
        let same_keys = self.selections.len() == n
            && self.ready.len() == n
            && self.display_names.len() == n
            && self.order.iter().all(|p| {
                self.selections.contains_key(p)
                    && self.ready.contains_key(p)
                    && self.display_names.contains_key(p)
            });
        let ready_implies_selection = self.ready.iter().all(|(p, &ready)| {
            !ready || self.selections.get(p).is_some_and(PlayerSelection::has_selection)
        });
        same_keys && ready_implies_selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: u64) -> ParticipantId {
        ParticipantId::new(raw)
    }

    fn full_selection() -> PlayerSelection {
        PlayerSelection {
            character_index: Some(0),
            pet_index: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_initializes_all_maps() {
        let mut store = SessionStore::new();
        assert!(store.add_participant(pid(1), "Alice".to_string()));

        assert_eq!(store.len(), 1);
        assert_eq!(store.selection(pid(1)), Some(&PlayerSelection::default()));
        assert_eq!(store.is_ready(pid(1)), Some(false));
        assert_eq!(store.display_name(pid(1)), Some("Alice"));
        assert!(store.is_consistent());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = SessionStore::new();
        store.add_participant(pid(1), "Alice".to_string());
        store.set_selection(pid(1), full_selection()).unwrap();

        assert!(!store.add_participant(pid(1), "Mallory".to_string()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.display_name(pid(1)), Some("Alice"));
        assert_eq!(store.selection(pid(1)), Some(&full_selection()));
    }

    #[test]
    fn test_remove_clears_all_maps() {
        let mut store = SessionStore::new();
        store.add_participant(pid(1), "Alice".to_string());
        store.add_participant(pid(2), "Bob".to_string());

        assert!(store.remove_participant(pid(1)));
        assert!(!store.remove_participant(pid(1)));

        assert!(!store.contains(pid(1)));
        assert_eq!(store.display_name(pid(1)), None);
        assert_eq!(store.is_ready(pid(1)), None);
        assert_eq!(store.participants(), &[pid(2)]);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_ready_requires_selection() {
        let mut store = SessionStore::new();
        store.add_participant(pid(1), "Alice".to_string());

        assert_eq!(
            store.set_ready(pid(1), true),
            Err(LobbyError::SelectionIncomplete(pid(1)))
        );
        assert_eq!(store.is_ready(pid(1)), Some(false));

        store.set_selection(pid(1), full_selection()).unwrap();
        store.set_ready(pid(1), true).unwrap();
        assert_eq!(store.is_ready(pid(1)), Some(true));
    }

    #[test]
    fn test_set_selection_resets_ready() {
        let mut store = SessionStore::new();
        store.add_participant(pid(1), "Alice".to_string());
        store.set_selection(pid(1), full_selection()).unwrap();
        store.set_ready(pid(1), true).unwrap();

        store.set_selection(pid(1), full_selection()).unwrap();
        assert_eq!(store.is_ready(pid(1)), Some(false));
        assert!(store.is_consistent());
    }

    #[test]
    fn test_unknown_participant_rejected() {
        let mut store = SessionStore::new();
        assert_eq!(
            store.set_selection(pid(9), full_selection()),
            Err(LobbyError::UnknownParticipant(pid(9)))
        );
        assert_eq!(
            store.set_ready(pid(9), false),
            Err(LobbyError::UnknownParticipant(pid(9)))
        );
    }

    #[test]
    fn test_snapshot_preserves_join_order() {
        let mut store = SessionStore::new();
        for (raw, name) in [(5, "E"), (2, "B"), (9, "I")] {
            store.add_participant(pid(raw), name.to_string());
        }
        store.set_selection(pid(9), full_selection()).unwrap();
        store.set_ready(pid(9), true).unwrap();

        let order: Vec<_> = store.snapshot().iter().map(|r| r.participant).collect();
        assert_eq!(order, vec![pid(5), pid(2), pid(9)]);
        assert!(store.snapshot()[2].ready);
    }

    #[test]
    fn test_all_ready() {
        let mut store = SessionStore::new();
        assert!(!store.all_ready());

        store.add_participant(pid(1), "A".to_string());
        store.add_participant(pid(2), "B".to_string());
        for p in [pid(1), pid(2)] {
            store.set_selection(p, full_selection()).unwrap();
        }
        store.set_ready(pid(1), true).unwrap();
        assert!(!store.all_ready());

        store.set_ready(pid(2), true).unwrap();
        assert!(store.all_ready());
    }
}
