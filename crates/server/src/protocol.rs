//! Domain-side lobby messages and their wire mapping.

use muster_core::{GamePhase, ParticipantId, ParticipantSummary};
use muster_wire::{ClientMessage, ServerMessage, client_message};
use prost::Message;

use crate::error::LobbyError;

/// Raw selection request as received from a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionRequest {
    pub character_index: i32,
    pub pet_index: i32,
    pub custom_player_name: String,
    pub custom_pet_name: String,
}

impl SelectionRequest {
    /// Request with indices only and no custom names.
    pub fn indices(character_index: i32, pet_index: i32) -> Self {
        Self {
            character_index,
            pet_index,
            ..Default::default()
        }
    }
}

/// Inbound request from one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Join { display_name: String },
    UpdateSelection(SelectionRequest),
    ToggleReady,
}

impl ClientRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::UpdateSelection(_) => "update_selection",
            Self::ToggleReady => "toggle_ready",
        }
    }

    /// Decode a client frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, LobbyError> {
        let message = muster_wire::decode_client_message(bytes)
            .map_err(|err| LobbyError::Malformed(err.to_string()))?;
        Self::try_from(message)
    }
}

impl TryFrom<ClientMessage> for ClientRequest {
    type Error = LobbyError;

    fn try_from(message: ClientMessage) -> Result<Self, Self::Error> {
        match message.body {
            Some(client_message::Body::Join(req)) => Ok(Self::Join {
                display_name: req.display_name,
            }),
            Some(client_message::Body::UpdateSelection(req)) => {
                Ok(Self::UpdateSelection(SelectionRequest {
                    character_index: req.character_index,
                    pet_index: req.pet_index,
                    custom_player_name: req.custom_player_name,
                    custom_pet_name: req.custom_pet_name,
                }))
            }
            Some(client_message::Body::ToggleReady(_)) => Ok(Self::ToggleReady),
            None => Err(LobbyError::Malformed("message has no body".to_string())),
        }
    }
}

/// Outbound broadcast, delivered to every client in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    JoinAccepted {
        participant: ParticipantId,
        display_name: String,
        catalog_digest: String,
    },
    SelectionsUpdated(Vec<ParticipantSummary>),
    TransitionStarting { message: String },
    PhaseChanged(GamePhase),
}

impl ServerEvent {
    pub fn to_message(&self) -> ServerMessage {
        match self {
            Self::JoinAccepted {
                participant,
                display_name,
                catalog_digest,
            } => ServerMessage::join_accepted(participant.get(), display_name, catalog_digest),
            Self::SelectionsUpdated(participants) => ServerMessage::selections_updated(participants),
            Self::TransitionStarting { message } => ServerMessage::transition_starting(message),
            Self::PhaseChanged(phase) => ServerMessage::phase_changed(*phase),
        }
    }

    /// Wire bytes for this event. Deterministic, so a transport can encode
    /// each broadcast once and send the same frame to every client.
    pub fn encode(&self) -> Vec<u8> {
        self.to_message().encode_to_vec()
    }
}
