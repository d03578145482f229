//! Selection Catalog.
//!
//! Static list of choosable character and pet definitions, loaded once at
//! server start and read-only afterwards. An entry's position in its list
//! is its wire representation, so lists are never reordered after load.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Catalog shipped with the server binary.
const BUILTIN_CATALOG: &str = include_str!("data/selection_catalog.json");

/// Environment variable naming an alternative catalog file.
pub const CATALOG_PATH_ENV: &str = "MUSTER_CATALOG_PATH";

// ============================================================================
// Entry Types
// ============================================================================

/// Which of the two catalog lists an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogKind {
    Character,
    Pet,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Pet => "pet",
        }
    }
}

/// Reference to the starter deck a choice brings into the run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct StarterDeckRef(pub String);

/// Starting stats granted by a character or pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct BaseStats {
    pub max_health: u32,
    pub energy: u32,
    pub gold: u32,
}

/// One selectable definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub index: usize,
    pub kind: CatalogKind,
    pub name: String,
    pub portrait: String,
    pub description: String,
    pub starter_deck: StarterDeckRef,
    pub base_stats: BaseStats,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCatalog {
    characters: Vec<RawEntry>,
    pets: Vec<RawEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(default)]
    portrait: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    starter_deck: StarterDeckRef,
    #[serde(default)]
    base_stats: BaseStats,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse selection catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read selection catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("selection catalog has no {} entries", .0.as_str())]
    EmptyList(CatalogKind),
    #[error("{} entry {index} has a blank name", .kind.as_str())]
    BlankName { kind: CatalogKind, index: usize },
    #[error("duplicate {} name `{name}`", .kind.as_str())]
    DuplicateName { kind: CatalogKind, name: String },
}

// ============================================================================
// Catalog
// ============================================================================

/// The read-only selection catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCatalog {
    characters: Vec<CatalogEntry>,
    pets: Vec<CatalogEntry>,
}

impl SelectionCatalog {
    /// The catalog embedded in the binary.
    ///
    /// # Panics
    /// If the embedded JSON is invalid, which is a build defect.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_CATALOG).expect("builtin selection catalog must parse")
    }

    pub fn from_json_str(data: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(data)?;
        let characters = index_entries(CatalogKind::Character, raw.characters);
        let pets = index_entries(CatalogKind::Pet, raw.pets);
        Self::from_entries(characters, pets)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let data = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    /// Build from already-constructed entries. Indices and kinds are
    /// rewritten from list position so the positional invariant holds.
    pub fn from_entries(
        characters: Vec<CatalogEntry>,
        pets: Vec<CatalogEntry>,
    ) -> Result<Self, CatalogError> {
        let characters = reindex(CatalogKind::Character, characters);
        let pets = reindex(CatalogKind::Pet, pets);
        validate_list(CatalogKind::Character, &characters)?;
        validate_list(CatalogKind::Pet, &pets)?;
        Ok(Self { characters, pets })
    }

    /// Load from `MUSTER_CATALOG_PATH` if set, falling back to the builtin
    /// catalog when the variable is unset or the file fails to load.
    pub fn load_from_env() -> Arc<Self> {
        Self::load_from_path(env::var_os(CATALOG_PATH_ENV).map(PathBuf::from))
    }

    /// Load from `path` if given, else (or on any failure) the builtin
    /// catalog. Logs which source was used.
    pub fn load_from_path(path: Option<PathBuf>) -> Arc<Self> {
        if let Some(path) = path {
            match Self::from_file(&path) {
                Ok(catalog) => {
                    tracing::info!(
                        target: "muster::catalog",
                        path = %path.display(),
                        characters = catalog.character_count(),
                        pets = catalog.pet_count(),
                        "selection_catalog.loaded=file"
                    );
                    return Arc::new(catalog);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "muster::catalog",
                        path = %path.display(),
                        error = %err,
                        "selection_catalog.load_failed"
                    );
                }
            }
        }

        let catalog = Self::builtin();
        tracing::info!(
            target: "muster::catalog",
            characters = catalog.character_count(),
            pets = catalog.pet_count(),
            "selection_catalog.loaded=builtin"
        );
        Arc::new(catalog)
    }

    pub fn characters(&self) -> &[CatalogEntry] {
        &self.characters
    }

    pub fn pets(&self) -> &[CatalogEntry] {
        &self.pets
    }

    pub fn character(&self, index: usize) -> Option<&CatalogEntry> {
        self.characters.get(index)
    }

    pub fn pet(&self, index: usize) -> Option<&CatalogEntry> {
        self.pets.get(index)
    }

    pub fn entry(&self, kind: CatalogKind, index: usize) -> Option<&CatalogEntry> {
        match kind {
            CatalogKind::Character => self.character(index),
            CatalogKind::Pet => self.pet(index),
        }
    }

    pub fn contains(&self, kind: CatalogKind, index: usize) -> bool {
        self.entry(kind, index).is_some()
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn pet_count(&self) -> usize {
        self.pets.len()
    }

    pub fn len(&self, kind: CatalogKind) -> usize {
        match kind {
            CatalogKind::Character => self.character_count(),
            CatalogKind::Pet => self.pet_count(),
        }
    }

    /// SHA-256 hex digest over the ordered names and starter decks of both
    /// lists. Two catalogs with the same digest agree on every wire index.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (tag, list) in [(b'c', &self.characters), (b'p', &self.pets)] {
            hasher.update([tag]);
            hasher.update((list.len() as u64).to_le_bytes());
            for entry in list {
                // Length-prefixed so adjacent fields cannot alias.
                for field in [&entry.name, &entry.starter_deck.0] {
                    hasher.update((field.len() as u64).to_le_bytes());
                    hasher.update(field.as_bytes());
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

fn index_entries(kind: CatalogKind, raw: Vec<RawEntry>) -> Vec<CatalogEntry> {
    raw.into_iter()
        .enumerate()
        .map(|(index, e)| CatalogEntry {
            index,
            kind,
            name: e.name.trim().to_string(),
            portrait: e.portrait,
            description: e.description,
            starter_deck: e.starter_deck,
            base_stats: e.base_stats,
        })
        .collect()
}

fn reindex(kind: CatalogKind, entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| CatalogEntry {
            index,
            kind,
            ..entry
        })
        .collect()
}

fn validate_list(kind: CatalogKind, entries: &[CatalogEntry]) -> Result<(), CatalogError> {
    if entries.is_empty() {
        return Err(CatalogError::EmptyList(kind));
    }
    for entry in entries {
        if entry.name.trim().is_empty() {
            return Err(CatalogError::BlankName {
                kind,
                index: entry.index,
            });
        }
        if entries[..entry.index].iter().any(|e| e.name == entry.name) {
            return Err(CatalogError::DuplicateName {
                kind,
                name: entry.name.clone(),
            });
        }
    }
    Ok(())
}
