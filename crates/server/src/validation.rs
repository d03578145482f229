//! Request validation for the lobby.
//!
//! Rules:
//! - Catalog index `-1`: no choice
//! - Catalog index `< -1` or `>= len`: DROP
//! - Custom names: strip control characters, trim, cap at 20 chars
//! - Display names: same sanitization, cap at 32 chars, placeholder if empty

use muster_core::{CatalogKind, ParticipantId, PlayerSelection, SelectionCatalog};
use muster_wire::NO_SELECTION;

use crate::error::LobbyError;
use crate::protocol::SelectionRequest;

/// Validation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    pub max_custom_name_chars: usize,
    pub max_display_name_chars: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_custom_name_chars: 20,
            max_display_name_chars: 32,
        }
    }
}

/// Resolve a wire index against one catalog list.
pub fn resolve_index(
    catalog: &SelectionCatalog,
    kind: CatalogKind,
    index: i32,
) -> Result<Option<usize>, LobbyError> {
    if index == NO_SELECTION {
        return Ok(None);
    }

    let len = catalog.len(kind);
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(Some(i)),
        _ => Err(LobbyError::IndexOutOfRange { kind, index, len }),
    }
}

/// Validate a selection request and produce the sanitized selection to store.
pub fn validate_selection(
    request: &SelectionRequest,
    catalog: &SelectionCatalog,
    config: &ValidationConfig,
) -> Result<PlayerSelection, LobbyError> {
    let character_index = resolve_index(catalog, CatalogKind::Character, request.character_index)?;
    let pet_index = resolve_index(catalog, CatalogKind::Pet, request.pet_index)?;

    Ok(PlayerSelection {
        character_index,
        pet_index,
        custom_player_name: sanitize_name(&request.custom_player_name, config.max_custom_name_chars),
        custom_pet_name: sanitize_name(&request.custom_pet_name, config.max_custom_name_chars),
    })
}

/// Strip control characters, trim, and cap at `max_chars` Unicode scalar
/// values.
pub fn sanitize_name(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let capped: String = cleaned.trim().chars().take(max_chars).collect();
    // Cutting may expose trailing whitespace.
    capped.trim_end().to_string()
}

/// Sanitized display name, or `Player <N>` when nothing usable was sent.
pub fn display_name_or_placeholder(
    raw: &str,
    participant: ParticipantId,
    config: &ValidationConfig,
) -> String {
    let name = sanitize_name(raw, config.max_display_name_chars);
    if name.is_empty() {
        format!("Player {}", participant.get())
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_index_bounds() {
        let catalog = SelectionCatalog::builtin();

        assert_eq!(resolve_index(&catalog, CatalogKind::Character, -1), Ok(None));
        assert_eq!(resolve_index(&catalog, CatalogKind::Character, 0), Ok(Some(0)));
        assert_eq!(resolve_index(&catalog, CatalogKind::Character, 2), Ok(Some(2)));
        assert_eq!(
            resolve_index(&catalog, CatalogKind::Character, 3),
            Err(LobbyError::IndexOutOfRange {
                kind: CatalogKind::Character,
                index: 3,
                len: 3
            })
        );
        assert!(resolve_index(&catalog, CatalogKind::Pet, -2).is_err());
        assert!(resolve_index(&catalog, CatalogKind::Pet, i32::MIN).is_err());
        assert!(resolve_index(&catalog, CatalogKind::Pet, i32::MAX).is_err());
    }

    #[test]
    fn test_validate_selection_rejects_either_bad_index() {
        let catalog = SelectionCatalog::builtin();
        let config = ValidationConfig::default();

        let bad_character = SelectionRequest::indices(999, 0);
        assert!(matches!(
            validate_selection(&bad_character, &catalog, &config),
            Err(LobbyError::IndexOutOfRange {
                kind: CatalogKind::Character,
                ..
            })
        ));

        let bad_pet = SelectionRequest::indices(0, 3);
        assert!(matches!(
            validate_selection(&bad_pet, &catalog, &config),
            Err(LobbyError::IndexOutOfRange {
                kind: CatalogKind::Pet,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_selection_partial_choice() {
        let catalog = SelectionCatalog::builtin();
        let selection =
            validate_selection(&SelectionRequest::indices(1, -1), &catalog, &ValidationConfig::default())
                .unwrap();

        assert_eq!(selection.character_index, Some(1));
        assert_eq!(selection.pet_index, None);
        assert!(!selection.has_selection());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Rook  ", 20), "Rook");
        assert_eq!(sanitize_name("a\u{0}b\nc", 20), "abc");
        assert_eq!(sanitize_name("   ", 20), "");
        assert_eq!(sanitize_name("abcdefghijklmnopqrstuvwxyz", 20), "abcdefghijklmnopqrst");
        assert_eq!(sanitize_name("abc def", 4), "abc");
    }

    #[test]
    fn test_sanitize_counts_chars_not_bytes() {
        let name = "ééééééééééééééééééééééé";
        let sanitized = sanitize_name(name, 20);
        assert_eq!(sanitized.chars().count(), 20);
    }

    #[test]
    fn test_custom_names_sanitized_in_selection() {
        let catalog = SelectionCatalog::builtin();
        let request = SelectionRequest {
            character_index: 0,
            pet_index: 0,
            custom_player_name: "  The Extremely Verbose Hero  ".to_string(),
            custom_pet_name: "\tFang\t".to_string(),
        };

        let selection = validate_selection(&request, &catalog, &ValidationConfig::default()).unwrap();
        assert_eq!(selection.custom_player_name, "The Extremely Verbos");
        assert_eq!(selection.custom_pet_name, "Fang");
    }

    #[test]
    fn test_display_name_placeholder() {
        let config = ValidationConfig::default();
        assert_eq!(
            display_name_or_placeholder("", ParticipantId::new(4), &config),
            "Player 4"
        );
        assert_eq!(
            display_name_or_placeholder(" Alice ", ParticipantId::new(4), &config),
            "Alice"
        );
    }

    /// Malformed selection requests do not panic.
    #[test]
    fn test_malformed_requests_no_crash() {
        let catalog = SelectionCatalog::builtin();
        let config = ValidationConfig::default();

        for (c, p) in [(i32::MIN, i32::MIN), (i32::MAX, 0), (-1, -1), (0, i32::MAX)] {
            let _ = validate_selection(&SelectionRequest::indices(c, p), &catalog, &config);
        }
        let _ = sanitize_name(&"\u{7f}".repeat(1000), 20);
    }
}
