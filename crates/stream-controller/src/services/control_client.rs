//! Media server control API client.
//!
//! The media server exposes its control plane as Twirp services
//! (`livekit.RoomService`, `livekit.Ingress`) speaking JSON over HTTP POST.
//! Each call is authenticated with a short-lived bearer token carrying only
//! the admin grant that call needs.
//!
//! # Security
//!
//! - Control tokens are minted per call and never logged
//! - Timeouts prevent hanging connections
//! - Upstream error bodies are logged server-side, never returned to callers

use crate::auth::token::TokenIssuer;
use crate::errors::ScError;
use crate::models::{Ingress, Participant, Room};
use crate::observability::metrics;
use async_trait::async_trait;
use common::jwt::VideoGrant;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Connect timeout for the media server.
const CONTROL_CONNECT_TIMEOUT_SECS: u64 = 5;

const ROOM_SERVICE: &str = "RoomService";
const INGRESS_SERVICE: &str = "Ingress";

/// Room creation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRoomOptions {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

/// Track source for RTMP ingress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSourceOptions {
    pub source: String,
}

/// CreateIngress request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressOptions {
    pub input_type: String,
    pub name: String,
    pub room_name: String,
    pub participant_identity: String,
    pub participant_name: String,
    #[serde(default)]
    pub bypass_transcoding: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<TrackSourceOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<TrackSourceOptions>,
}

/// Control-plane operations the stream controller needs from the media server.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a room. The media server returns the existing room when the
    /// name is already taken.
    async fn create_room(&self, options: &CreateRoomOptions) -> Result<Room, ScError>;

    /// List rooms, optionally restricted to `names`.
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<Room>, ScError>;

    async fn delete_room(&self, name: &str) -> Result<(), ScError>;

    async fn list_participants(&self, room: &str) -> Result<Vec<Participant>, ScError>;

    async fn create_ingress(&self, options: &IngressOptions) -> Result<Ingress, ScError>;

    async fn list_ingress(&self) -> Result<Vec<Ingress>, ScError>;

    async fn delete_ingress(&self, ingress_id: &str) -> Result<(), ScError>;
}

#[derive(Serialize)]
struct ListRoomsRequest<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    names: &'a [String],
}

#[derive(Serialize)]
struct RoomRequest<'a> {
    room: &'a str,
}

#[derive(Serialize)]
struct ListIngressRequest {}

#[derive(Serialize)]
struct DeleteIngressRequest<'a> {
    ingress_id: &'a str,
}

#[derive(Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<Room>,
}

#[derive(Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<Participant>,
}

#[derive(Deserialize)]
struct ListIngressResponse {
    #[serde(default)]
    items: Vec<Ingress>,
}

#[derive(Deserialize)]
struct Empty {}

/// Twirp error body.
#[derive(Debug, Default, Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

/// HTTP client for the media server control API.
#[derive(Clone)]
pub struct ControlClient {
    client: Client,
    base_url: String,
    issuer: Arc<TokenIssuer>,
}

impl ControlClient {
    /// Create a control client.
    ///
    /// `base_url` may use a websocket scheme; it is rewritten to the matching
    /// HTTP scheme.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str, issuer: Arc<TokenIssuer>, timeout: Duration) -> Result<Self, ScError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONTROL_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "sc.services.control_client", error = %e, "Failed to build HTTP client");
                ScError::Internal(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: http_base_url(base_url),
            issuer,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Resp>(
        &self,
        service: &str,
        method: &'static str,
        grant: VideoGrant,
        body: &Req,
    ) -> Result<Resp, ScError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.send(service, method, grant, body).await;
        let status = match &result {
            Ok(_) => "success",
            Err(ScError::NotFound(_)) => "not_found",
            Err(ScError::Conflict(_)) => "conflict",
            Err(_) => "error",
        };
        metrics::record_control_call(method, status, start.elapsed());
        result
    }

    async fn send<Req, Resp>(
        &self,
        service: &str,
        method: &'static str,
        grant: VideoGrant,
        body: &Req,
    ) -> Result<Resp, ScError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/twirp/livekit.{}/{}", self.base_url, service, method);
        let token = self.issuer.control_token(grant).map_err(|e| {
            error!(target: "sc.services.control_client", error = %e, "Failed to sign control token");
            ScError::Internal(format!("Failed to sign control token: {e}"))
        })?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sc.services.control_client", method, error = %e, "Media server request failed");
                ScError::Upstream(format!("{method}: media server unreachable: {e}"))
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            warn!(target: "sc.services.control_client", method, error = %e, "Failed to read media server response");
            ScError::Upstream(format!("{method}: failed to read response: {e}"))
        })?;

        if status.is_success() {
            let payload: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
            return serde_json::from_slice(payload).map_err(|e| {
                error!(target: "sc.services.control_client", method, error = %e, "Failed to parse media server response");
                ScError::Upstream(format!("{method}: invalid response body: {e}"))
            });
        }

        Err(map_twirp_error(method, status, &bytes))
    }
}

/// Map a non-2xx Twirp response onto the error taxonomy.
fn map_twirp_error(method: &str, status: StatusCode, body: &[u8]) -> ScError {
    let twirp: TwirpError = serde_json::from_slice(body).unwrap_or_default();

    if twirp.code == "not_found" || status == StatusCode::NOT_FOUND {
        debug!(target: "sc.services.control_client", method, msg = %twirp.msg, "Media server reported not found");
        ScError::NotFound(format!("{method}: not found"))
    } else if twirp.code == "already_exists" || status == StatusCode::CONFLICT {
        debug!(target: "sc.services.control_client", method, msg = %twirp.msg, "Media server reported already exists");
        ScError::Conflict(format!("{method}: already exists"))
    } else {
        warn!(
            target: "sc.services.control_client",
            method,
            status = %status,
            code = %twirp.code,
            msg = %twirp.msg,
            "Media server returned an error"
        );
        ScError::Upstream(format!(
            "{method} failed with status {status} ({}): {}",
            non_empty_or(&twirp.code, "unknown"),
            twirp.msg
        ))
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Rewrite websocket schemes to HTTP and drop trailing slashes.
fn http_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}

fn room_create_grant() -> VideoGrant {
    VideoGrant {
        room_create: true,
        ..VideoGrant::default()
    }
}

fn ingress_admin_grant() -> VideoGrant {
    VideoGrant {
        ingress_admin: true,
        ..VideoGrant::default()
    }
}

#[async_trait]
impl ControlPlane for ControlClient {
    #[instrument(skip_all, fields(room = %options.name))]
    async fn create_room(&self, options: &CreateRoomOptions) -> Result<Room, ScError> {
        self.call(ROOM_SERVICE, "CreateRoom", room_create_grant(), options)
            .await
    }

    #[instrument(skip_all, fields(filter = names.len()))]
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<Room>, ScError> {
        let grant = VideoGrant {
            room_list: true,
            ..VideoGrant::default()
        };
        let response: ListRoomsResponse = self
            .call(ROOM_SERVICE, "ListRooms", grant, &ListRoomsRequest { names })
            .await?;
        Ok(response.rooms)
    }

    #[instrument(skip_all, fields(room = %name))]
    async fn delete_room(&self, name: &str) -> Result<(), ScError> {
        let _: Empty = self
            .call(
                ROOM_SERVICE,
                "DeleteRoom",
                room_create_grant(),
                &RoomRequest { room: name },
            )
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(room = %room))]
    async fn list_participants(&self, room: &str) -> Result<Vec<Participant>, ScError> {
        let grant = VideoGrant {
            room_admin: true,
            room: room.to_string(),
            ..VideoGrant::default()
        };
        let response: ListParticipantsResponse = self
            .call(ROOM_SERVICE, "ListParticipants", grant, &RoomRequest { room })
            .await?;
        Ok(response.participants)
    }

    #[instrument(skip_all, fields(room = %options.room_name, input_type = %options.input_type))]
    async fn create_ingress(&self, options: &IngressOptions) -> Result<Ingress, ScError> {
        self.call(INGRESS_SERVICE, "CreateIngress", ingress_admin_grant(), options)
            .await
    }

    #[instrument(skip_all)]
    async fn list_ingress(&self) -> Result<Vec<Ingress>, ScError> {
        let response: ListIngressResponse = self
            .call(
                INGRESS_SERVICE,
                "ListIngress",
                ingress_admin_grant(),
                &ListIngressRequest {},
            )
            .await?;
        Ok(response.items)
    }

    #[instrument(skip_all, fields(ingress_id = %ingress_id))]
    async fn delete_ingress(&self, ingress_id: &str) -> Result<(), ScError> {
        let _: Ingress = self
            .call(
                INGRESS_SERVICE,
                "DeleteIngress",
                ingress_admin_grant(),
                &DeleteIngressRequest { ingress_id },
            )
            .await?;
        Ok(())
    }
}

/// Mock control plane for tests.
///
/// Keeps rooms, participants and ingress endpoints in memory with the media
/// server's semantics: CreateRoom returns an existing room unchanged,
/// DeleteRoom on a missing room succeeds, DeleteIngress on a missing id is
/// not found.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, MutexGuard};

    /// Control-plane operation, for failure injection and call counting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MockOp {
        CreateRoom,
        ListRooms,
        DeleteRoom,
        ListParticipants,
        CreateIngress,
        ListIngress,
        DeleteIngress,
    }

    #[derive(Default)]
    struct State {
        rooms: Vec<Room>,
        participants: HashMap<String, Vec<Participant>>,
        ingresses: Vec<Ingress>,
        failing: HashSet<MockOp>,
        calls: HashMap<MockOp, usize>,
        ingress_requests: Vec<IngressOptions>,
        next_id: usize,
    }

    /// In-memory [`ControlPlane`].
    #[derive(Default)]
    pub struct MockControlPlane {
        state: Mutex<State>,
    }

    impl MockControlPlane {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a room.
        pub fn with_room(self, name: &str, metadata: &str) -> Self {
            self.lock().rooms.push(Room {
                sid: format!("RM_{name}"),
                name: name.to_string(),
                metadata: metadata.to_string(),
                empty_timeout: 300,
                ..Room::default()
            });
            self
        }

        /// Seed a participant, creating the room if needed.
        pub fn with_participant(self, room: &str, identity: &str) -> Self {
            let needs_room = !self.lock().rooms.iter().any(|r| r.name == room);
            let this = if needs_room {
                self.with_room(room, "")
            } else {
                self
            };
            this.lock()
                .participants
                .entry(room.to_string())
                .or_default()
                .push(Participant {
                    sid: format!("PA_{identity}"),
                    identity: identity.to_string(),
                    name: identity.to_string(),
                    state: "ACTIVE".to_string(),
                    ..Participant::default()
                });
            this
        }

        /// Seed an ingress endpoint.
        pub fn with_ingress(self, ingress: Ingress) -> Self {
            self.lock().ingresses.push(ingress);
            self
        }

        /// Make every call of `op` fail with an upstream error.
        pub fn failing_on(self, op: MockOp) -> Self {
            self.lock().failing.insert(op);
            self
        }

        pub fn call_count(&self, op: MockOp) -> usize {
            self.lock().calls.get(&op).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.lock().calls.values().sum()
        }

        /// Body of the most recent CreateIngress call.
        pub fn last_ingress_request(&self) -> Option<IngressOptions> {
            self.lock().ingress_requests.last().cloned()
        }

        pub fn has_room(&self, name: &str) -> bool {
            self.lock().rooms.iter().any(|r| r.name == name)
        }

        pub fn ingress_count(&self) -> usize {
            self.lock().ingresses.len()
        }

        fn lock(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Count the call and apply failure injection.
        fn enter(&self, op: MockOp) -> Result<MutexGuard<'_, State>, ScError> {
            let mut state = self.lock();
            *state.calls.entry(op).or_default() += 1;
            if state.failing.contains(&op) {
                return Err(ScError::Upstream(format!("mock failure: {op:?}")));
            }
            Ok(state)
        }
    }

    fn with_count(state: &State, room: &Room) -> Room {
        let count = state.participants.get(&room.name).map_or(0, Vec::len);
        Room {
            num_participants: u32::try_from(count).unwrap_or(u32::MAX),
            ..room.clone()
        }
    }

    #[async_trait]
    impl ControlPlane for MockControlPlane {
        async fn create_room(&self, options: &CreateRoomOptions) -> Result<Room, ScError> {
            let mut state = self.enter(MockOp::CreateRoom)?;
            if let Some(existing) = state.rooms.iter().find(|r| r.name == options.name) {
                return Ok(with_count(&state, existing));
            }
            let room = Room {
                sid: format!("RM_{}", options.name),
                name: options.name.clone(),
                metadata: options.metadata.clone(),
                creation_time: chrono::Utc::now().timestamp(),
                empty_timeout: 300,
                ..Room::default()
            };
            state.rooms.push(room.clone());
            Ok(room)
        }

        async fn list_rooms(&self, names: &[String]) -> Result<Vec<Room>, ScError> {
            let state = self.enter(MockOp::ListRooms)?;
            Ok(state
                .rooms
                .iter()
                .filter(|r| names.is_empty() || names.contains(&r.name))
                .map(|r| with_count(&state, r))
                .collect())
        }

        async fn delete_room(&self, name: &str) -> Result<(), ScError> {
            let mut state = self.enter(MockOp::DeleteRoom)?;
            state.rooms.retain(|r| r.name != name);
            state.participants.remove(name);
            Ok(())
        }

        async fn list_participants(&self, room: &str) -> Result<Vec<Participant>, ScError> {
            let state = self.enter(MockOp::ListParticipants)?;
            if !state.rooms.iter().any(|r| r.name == room) {
                return Err(ScError::NotFound(
                    "ListParticipants: requested room does not exist".to_string(),
                ));
            }
            Ok(state.participants.get(room).cloned().unwrap_or_default())
        }

        async fn create_ingress(&self, options: &IngressOptions) -> Result<Ingress, ScError> {
            let mut state = self.enter(MockOp::CreateIngress)?;
            state.ingress_requests.push(options.clone());
            state.next_id += 1;
            let id = state.next_id;
            let url = if options.input_type == "WHIP_INPUT" {
                "http://mock-media.local/w".to_string()
            } else {
                "rtmp://mock-media.local/x".to_string()
            };
            let ingress = Ingress {
                ingress_id: format!("IN_mock{id}"),
                name: options.name.clone(),
                stream_key: Some(format!("sk_mock{id}").into()),
                url,
                input_type: options.input_type.clone(),
                bypass_transcoding: options.bypass_transcoding,
                room_name: options.room_name.clone(),
                participant_identity: options.participant_identity.clone(),
                participant_name: options.participant_name.clone(),
                state: None,
            };
            state.ingresses.push(ingress.clone());
            Ok(ingress)
        }

        async fn list_ingress(&self) -> Result<Vec<Ingress>, ScError> {
            let state = self.enter(MockOp::ListIngress)?;
            Ok(state.ingresses.clone())
        }

        async fn delete_ingress(&self, ingress_id: &str) -> Result<(), ScError> {
            let mut state = self.enter(MockOp::DeleteIngress)?;
            let before = state.ingresses.len();
            state.ingresses.retain(|i| i.ingress_id != ingress_id);
            if state.ingresses.len() == before {
                return Err(ScError::NotFound(
                    "DeleteIngress: ingress does not exist".to_string(),
                ));
            }
            Ok(())
        }
    }
}
