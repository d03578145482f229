//! Muster Wire Protocol Types
//!
//! Protobuf messages exchanged between lobby clients and the lobby server.
//! Client and server binaries both depend on this crate so the schema has a
//! single definition.
//!
//! # Message Categories
//!
//! - **Client → Server** (reliable + ordered per connection): [`ClientMessage`]
//!   wrapping join, selection update and ready toggle requests.
//! - **Server → All Clients** (broadcast): [`ServerMessage`] wrapping join
//!   acknowledgements, roster snapshots, the transition announcement and the
//!   phase change.
//!
//! Catalog indices travel as `int32` with `-1` meaning "no choice".

#![deny(unsafe_code)]

use muster_core::{GamePhase, ParticipantSummary};
use prost::Message;

pub use prost::DecodeError;

/// Wire value for "nothing selected".
pub const NO_SELECTION: i32 = -1;

// ============================================================================
// Client → Server
// ============================================================================

/// Envelope for every client request.
#[derive(Clone, PartialEq, Message)]
pub struct ClientMessage {
    #[prost(oneof = "client_message::Body", tags = "1, 2, 3")]
    pub body: Option<client_message::Body>,
}

pub mod client_message {
    /// Request carried by a [`super::ClientMessage`].
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        Join(super::JoinRequest),
        #[prost(message, tag = "2")]
        UpdateSelection(super::UpdateSelectionRequest),
        #[prost(message, tag = "3")]
        ToggleReady(super::ToggleReadyRequest),
    }
}

/// Join the lobby under a display name (platform identity or blank).
#[derive(Clone, PartialEq, Message)]
pub struct JoinRequest {
    #[prost(string, tag = "1")]
    pub display_name: String,
}

/// Replace the sender's selection.
#[derive(Clone, PartialEq, Message)]
pub struct UpdateSelectionRequest {
    /// Character list index, `-1` for none.
    #[prost(int32, tag = "1")]
    pub character_index: i32,

    /// Pet list index, `-1` for none.
    #[prost(int32, tag = "2")]
    pub pet_index: i32,

    /// At most 20 characters after server-side sanitization.
    #[prost(string, tag = "3")]
    pub custom_player_name: String,

    /// At most 20 characters after server-side sanitization.
    #[prost(string, tag = "4")]
    pub custom_pet_name: String,
}

/// Flip the sender's ready flag.
#[derive(Clone, PartialEq, Message)]
pub struct ToggleReadyRequest {}

// ============================================================================
// Server → Clients
// ============================================================================

/// Envelope for every server broadcast.
#[derive(Clone, PartialEq, Message)]
pub struct ServerMessage {
    #[prost(oneof = "server_message::Body", tags = "1, 2, 3, 4")]
    pub body: Option<server_message::Body>,
}

pub mod server_message {
    /// Event carried by a [`super::ServerMessage`].
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        JoinAccepted(super::JoinAccepted),
        #[prost(message, tag = "2")]
        SelectionsUpdated(super::SelectionsUpdated),
        #[prost(message, tag = "3")]
        TransitionStarting(super::TransitionStarting),
        #[prost(message, tag = "4")]
        PhaseChanged(super::PhaseChanged),
    }
}

/// A participant was admitted. Clients match `participant_id` against their
/// own id.
#[derive(Clone, PartialEq, Message)]
pub struct JoinAccepted {
    #[prost(uint64, tag = "1")]
    pub participant_id: u64,

    #[prost(string, tag = "2")]
    pub display_name: String,

    /// Hex SHA-256 of the server's selection catalog.
    #[prost(string, tag = "3")]
    pub catalog_digest: String,
}

/// Full roster in join order.
#[derive(Clone, PartialEq, Message)]
pub struct SelectionsUpdated {
    #[prost(message, repeated, tag = "1")]
    pub participants: Vec<ParticipantSummaryProto>,
}

/// One roster row.
#[derive(Clone, PartialEq, Message)]
pub struct ParticipantSummaryProto {
    #[prost(uint64, tag = "1")]
    pub participant_id: u64,

    #[prost(string, tag = "2")]
    pub display_name: String,

    #[prost(string, tag = "3")]
    pub character_name: String,

    #[prost(string, tag = "4")]
    pub pet_name: String,

    #[prost(int32, tag = "5")]
    pub character_index: i32,

    #[prost(int32, tag = "6")]
    pub pet_index: i32,

    #[prost(bool, tag = "7")]
    pub has_selection: bool,

    #[prost(bool, tag = "8")]
    pub is_ready: bool,
}

/// Human-readable announcement that the group is leaving selection.
#[derive(Clone, PartialEq, Message)]
pub struct TransitionStarting {
    #[prost(string, tag = "1")]
    pub message: String,
}

/// The global game phase switched.
#[derive(Clone, PartialEq, Message)]
pub struct PhaseChanged {
    #[prost(enumeration = "PhaseProto", tag = "1")]
    pub phase: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PhaseProto {
    Unspecified = 0,
    Selection = 1,
    Gameplay = 2,
}

// ============================================================================
// Conversion Traits
// ============================================================================

/// Encode an optional catalog index for the wire.
pub fn index_to_wire(index: Option<usize>) -> i32 {
    index
        .and_then(|i| i32::try_from(i).ok())
        .unwrap_or(NO_SELECTION)
}

impl From<&ParticipantSummary> for ParticipantSummaryProto {
    fn from(s: &ParticipantSummary) -> Self {
        Self {
            participant_id: s.participant.get(),
            display_name: s.display_name.clone(),
            character_name: s.character_name.clone(),
            pet_name: s.pet_name.clone(),
            character_index: index_to_wire(s.character_index),
            pet_index: index_to_wire(s.pet_index),
            has_selection: s.has_selection,
            is_ready: s.is_ready,
        }
    }
}

impl From<GamePhase> for PhaseProto {
    fn from(phase: GamePhase) -> Self {
        match phase {
            GamePhase::Selection => Self::Selection,
            GamePhase::Gameplay => Self::Gameplay,
        }
    }
}

impl TryFrom<PhaseProto> for GamePhase {
    type Error = &'static str;

    fn try_from(phase: PhaseProto) -> Result<Self, Self::Error> {
        match phase {
            PhaseProto::Selection => Ok(Self::Selection),
            PhaseProto::Gameplay => Ok(Self::Gameplay),
            PhaseProto::Unspecified => Err("phase must be specified"),
        }
    }
}

impl ServerMessage {
    pub fn join_accepted(participant_id: u64, display_name: &str, catalog_digest: &str) -> Self {
        Self {
            body: Some(server_message::Body::JoinAccepted(JoinAccepted {
                participant_id,
                display_name: display_name.to_string(),
                catalog_digest: catalog_digest.to_string(),
            })),
        }
    }

    pub fn selections_updated(participants: &[ParticipantSummary]) -> Self {
        Self {
            body: Some(server_message::Body::SelectionsUpdated(SelectionsUpdated {
                participants: participants.iter().map(Into::into).collect(),
            })),
        }
    }

    pub fn transition_starting(message: &str) -> Self {
        Self {
            body: Some(server_message::Body::TransitionStarting(TransitionStarting {
                message: message.to_string(),
            })),
        }
    }

    pub fn phase_changed(phase: GamePhase) -> Self {
        Self {
            body: Some(server_message::Body::PhaseChanged(PhaseChanged {
                phase: PhaseProto::from(phase) as i32,
            })),
        }
    }
}

impl ClientMessage {
    pub fn join(display_name: &str) -> Self {
        Self {
            body: Some(client_message::Body::Join(JoinRequest {
                display_name: display_name.to_string(),
            })),
        }
    }

    pub fn update_selection(
        character_index: i32,
        pet_index: i32,
        custom_player_name: &str,
        custom_pet_name: &str,
    ) -> Self {
        Self {
            body: Some(client_message::Body::UpdateSelection(UpdateSelectionRequest {
                character_index,
                pet_index,
                custom_player_name: custom_player_name.to_string(),
                custom_pet_name: custom_pet_name.to_string(),
            })),
        }
    }

    pub fn toggle_ready() -> Self {
        Self {
            body: Some(client_message::Body::ToggleReady(ToggleReadyRequest {})),
        }
    }
}

/// Decode one client frame.
pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, DecodeError> {
    ClientMessage::decode(bytes)
}

/// Decode one server frame.
pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage, DecodeError> {
    ServerMessage::decode(bytes)
}

// ============================================================================
// Tests
// ============================================================================
