//! Muster Core
//!
//! Domain types shared by every Muster crate, plus the read-only
//! Selection Catalog.
//!
//! # Contents
//!
//! - `ParticipantId`: opaque, never-reused identifier of a connected client
//! - `PlayerSelection`: one participant's character/pet choice and custom names
//! - `ParticipantSummary`: derived, display-ready roster row
//! - `GamePhase`: the global phase the lobby hands over to
//! - [`catalog`]: the static list of selectable characters and pets
//!
//! This crate performs no network I/O. The only file access is the optional
//! catalog loading in [`catalog::SelectionCatalog::from_file`].

#![deny(unsafe_code)]

pub mod catalog;

use std::fmt;

pub use catalog::{
    BaseStats, CatalogEntry, CatalogError, CatalogKind, SelectionCatalog, StarterDeckRef,
};

// ============================================================================
// Identifiers
// ============================================================================

/// Network-assigned identifier for a connected client.
///
/// Stable for the lifetime of a connection and never reused while the
/// server process runs. Decoupled from any transport handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ParticipantId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

// ============================================================================
// Game Phase
// ============================================================================

/// Global game phase controlled by the external Phase Controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GamePhase {
    /// Participants are picking characters and readying up.
    #[default]
    Selection,
    /// The selection phase is over; game entities exist for every player.
    Gameplay,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selection => "selection",
            Self::Gameplay => "gameplay",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Player Selection
// ============================================================================

/// A participant's current choice.
///
/// Indices are positions in the [`SelectionCatalog`] lists; `None` means no
/// choice yet. Custom names are stored already sanitized; an empty custom
/// name falls back to the catalog name at display time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerSelection {
    pub character_index: Option<usize>,
    pub pet_index: Option<usize>,
    pub custom_player_name: String,
    pub custom_pet_name: String,
}

impl PlayerSelection {
    /// True iff both a character and a pet are chosen.
    pub fn has_selection(&self) -> bool {
        self.character_index.is_some() && self.pet_index.is_some()
    }

    /// Name shown for the player: the custom name, else the catalog name,
    /// else empty when nothing (resolvable) is chosen.
    pub fn character_name(&self, catalog: &SelectionCatalog) -> String {
        resolve_name(
            &self.custom_player_name,
            self.character_index
                .and_then(|index| catalog.character(index)),
        )
    }

    /// Name shown for the pet, resolved like [`Self::character_name`].
    pub fn pet_name(&self, catalog: &SelectionCatalog) -> String {
        resolve_name(
            &self.custom_pet_name,
            self.pet_index.and_then(|index| catalog.pet(index)),
        )
    }
}

fn resolve_name(custom: &str, entry: Option<&CatalogEntry>) -> String {
    if !custom.is_empty() {
        return custom.to_string();
    }
    entry.map(|e| e.name.clone()).unwrap_or_default()
}

// ============================================================================
// Participant Summary
// ============================================================================

/// Display-ready roster row sent to every client.
///
/// Always recomputed from the session store and the catalog; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub participant: ParticipantId,
    pub display_name: String,
    pub character_name: String,
    pub pet_name: String,
    pub character_index: Option<usize>,
    pub pet_index: Option<usize>,
    pub has_selection: bool,
    pub is_ready: bool,
}

impl ParticipantSummary {
    /// Build a summary row for one participant.
    pub fn build(
        participant: ParticipantId,
        display_name: &str,
        selection: &PlayerSelection,
        is_ready: bool,
        catalog: &SelectionCatalog,
    ) -> Self {
        Self {
            participant,
            display_name: display_name.to_string(),
            character_name: selection.character_name(catalog),
            pet_name: selection.pet_name(catalog),
            character_index: selection.character_index,
            pet_index: selection.pet_index,
            has_selection: selection.has_selection(),
            is_ready,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
