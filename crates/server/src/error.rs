//! Request and runtime errors for the lobby server.

use muster_core::{CatalogKind, ParticipantId};
use thiserror::Error;

/// Why a lobby request was dropped.
///
/// Every variant is non-fatal: the request is logged and discarded with no
/// state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),
    #[error("{} index {index} is out of range (catalog has {len})", .kind.as_str())]
    IndexOutOfRange {
        kind: CatalogKind,
        index: i32,
        len: usize,
    },
    #[error("participant {0} has no complete selection")]
    SelectionIncomplete(ParticipantId),
    #[error("lobby is full ({max} participants)")]
    SessionFull { max: usize },
    #[error("lobby is locked while the phase transition runs")]
    SessionLocked,
    #[error("malformed client message: {0}")]
    Malformed(String),
    #[error("lobby server has stopped")]
    ServerStopped,
}
