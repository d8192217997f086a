//! Request and response bodies of the HTTP API.

use super::{parse_room_metadata, Ingress, Participant, Room, StreamMetadata};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /api/create_stream`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateStreamRequest {
    #[serde(default)]
    pub metadata: StreamMetadata,

    /// Requested room name; generated when absent.
    #[serde(default, alias = "room_id")]
    pub room_name: Option<String>,
}

/// Body of `POST /api/join_stream`.
///
/// Missing fields decode as empty and are rejected with 400 by the join flow.
#[derive(Debug, Default, Deserialize)]
pub struct JoinStreamRequest {
    #[serde(default)]
    pub identity: String,

    #[serde(default, alias = "room_id")]
    pub room_name: String,
}

/// Body of `POST /api/create_ingress`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateIngressRequest {
    #[serde(default, alias = "room_id")]
    pub room_name: Option<String>,

    /// `rtmp` (default) or `whip`.
    #[serde(default)]
    pub ingress_type: Option<String>,

    #[serde(default)]
    pub metadata: StreamMetadata,
}

/// Query string of `GET /getToken`.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub room: Option<String>,
    pub identity: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub ws_url: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStreamResponse {
    pub room_id: String,
    pub auth_token: String,
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinStreamResponse {
    pub auth_token: String,
    pub connection_details: ConnectionDetails,
}

/// Ingest endpoint handed to the broadcaster. The only place a stream key
/// leaves the process.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressEndpoint {
    pub url: String,
    pub stream_key: String,
    pub room_name: String,
}

impl std::fmt::Debug for IngressEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressEndpoint")
            .field("url", &self.url)
            .field("stream_key", &"[REDACTED]")
            .field("room_name", &self.room_name)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateIngressResponse {
    pub ingress: IngressEndpoint,
    pub auth_token: String,
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub name: String,
    pub metadata: Map<String, Value>,
    pub num_participants: u32,
    pub creation_time: i64,
    pub empty_timeout: u32,
    pub max_participants: u32,
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        Self {
            name: room.name.clone(),
            metadata: parse_room_metadata(&room.metadata),
            num_participants: room.num_participants,
            creation_time: room.creation_time,
            empty_timeout: room.empty_timeout,
            max_participants: room.max_participants,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListStreamsResponse {
    pub rooms: Vec<RoomView>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub identity: String,
    pub name: String,
    pub state: String,
    pub joined_at: i64,
    pub is_publisher: bool,
}

impl From<&Participant> for ParticipantView {
    fn from(participant: &Participant) -> Self {
        Self {
            identity: participant.identity.clone(),
            name: participant.name.clone(),
            state: participant.state.clone(),
            joined_at: participant.joined_at,
            is_publisher: participant.is_publisher(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetStreamResponse {
    pub room: RoomView,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteStreamResponse {
    pub message: String,
    pub room_id: String,
}

/// Ingress as shown by list and detail endpoints. Carries no stream key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressView {
    pub ingress_id: String,
    pub name: String,
    pub room_name: String,
    pub participant_identity: String,
    pub participant_name: String,
    pub url: String,
    pub input_type: String,
    pub status: String,
}

impl From<&Ingress> for IngressView {
    fn from(ingress: &Ingress) -> Self {
        Self {
            ingress_id: ingress.ingress_id.clone(),
            name: ingress.name.clone(),
            room_name: ingress.room_name.clone(),
            participant_identity: ingress.participant_identity.clone(),
            participant_name: ingress.participant_name.clone(),
            url: ingress.url.clone(),
            input_type: ingress.input_type.clone(),
            status: ingress.status().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListIngressResponse {
    pub ingresses: Vec<IngressView>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteIngressResponse {
    pub message: String,
    #[serde(rename = "ingressId")]
    pub ingress_id: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
