//! Room Lifecycle Manager.
//!
//! Creates, lists, inspects and deletes rooms on the media server. Nothing is
//! cached: every call is a fresh query, so results may already be stale when
//! the caller acts on them.

use crate::config::RoomConflictPolicy;
use crate::errors::ScError;
use crate::models::{Participant, Room};
use crate::services::control_client::{ControlPlane, CreateRoomOptions};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Attempts at finding an unused generated room name.
const MAX_ROOM_NAME_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct RoomManager {
    control: Arc<dyn ControlPlane>,
    conflict_policy: RoomConflictPolicy,
}

impl RoomManager {
    pub fn new(control: Arc<dyn ControlPlane>, conflict_policy: RoomConflictPolicy) -> Self {
        Self {
            control,
            conflict_policy,
        }
    }

    /// Create a room and verify the media server returned what was asked for.
    ///
    /// CreateRoom on the media server returns an existing room unchanged, so
    /// the returned name and metadata are compared with the request. A
    /// mismatch means another room already holds the name.
    ///
    /// # Errors
    ///
    /// - `ScError::BadRequest` - blank name
    /// - `ScError::Conflict` - the name is taken (always under the reject
    ///   policy, on metadata mismatch under the reuse policy)
    /// - `ScError::Upstream` - the media server call failed
    #[instrument(skip_all, fields(room = %name, policy = ?self.conflict_policy))]
    pub async fn create(&self, name: &str, metadata: &str) -> Result<Room, ScError> {
        if name.trim().is_empty() {
            return Err(ScError::BadRequest("room name must not be empty".to_string()));
        }

        if self.conflict_policy == RoomConflictPolicy::Reject && self.exists(name).await? {
            info!(target: "sc.services.rooms", room = %name, "Room already exists, rejecting");
            return Err(ScError::Conflict(format!("Room '{name}' already exists")));
        }

        let room = self
            .control
            .create_room(&CreateRoomOptions {
                name: name.to_string(),
                metadata: metadata.to_string(),
            })
            .await?;

        if room.name != name || room.metadata != metadata {
            warn!(
                target: "sc.services.rooms",
                room = %name,
                returned = %room.name,
                "Existing room does not match the requested one"
            );
            return Err(ScError::Conflict(format!(
                "Room '{name}' already exists with different metadata"
            )));
        }

        info!(target: "sc.services.rooms", room = %room.name, sid = %room.sid, "Room ready");
        Ok(room)
    }

    /// Pick a `room-<unix seconds><4 random digits>` name not currently in use.
    pub async fn generate_room_name(&self) -> Result<String, ScError> {
        for attempt in 1..=MAX_ROOM_NAME_ATTEMPTS {
            let candidate = format!(
                "room-{}{:04}",
                chrono::Utc::now().timestamp(),
                random_suffix()?
            );
            if !self.exists(&candidate).await? {
                return Ok(candidate);
            }
            debug!(target: "sc.services.rooms", attempt, room = %candidate, "Generated room name collided");
        }

        Err(ScError::Internal(
            "Failed to generate an unused room name".to_string(),
        ))
    }

    pub async fn exists(&self, name: &str) -> Result<bool, ScError> {
        let rooms = self.list(&[name.to_string()]).await?;
        Ok(rooms.iter().any(|room| room.name == name))
    }

    /// List rooms, optionally restricted to `names`.
    pub async fn list(&self, names: &[String]) -> Result<Vec<Room>, ScError> {
        self.control.list_rooms(names).await
    }

    /// Look up one room by name.
    pub async fn get(&self, name: &str) -> Result<Room, ScError> {
        self.list(&[name.to_string()])
            .await?
            .into_iter()
            .find(|room| room.name == name)
            .ok_or_else(|| ScError::NotFound(format!("Room '{name}' not found")))
    }

    /// Delete a room. A room that does not exist is `NotFound` on every
    /// attempt.
    #[instrument(skip_all, fields(room = %name))]
    pub async fn delete(&self, name: &str) -> Result<(), ScError> {
        if name.trim().is_empty() {
            return Err(ScError::BadRequest("room id must not be empty".to_string()));
        }

        self.get(name).await?;
        self.control.delete_room(name).await?;

        info!(target: "sc.services.rooms", room = %name, "Room deleted");
        Ok(())
    }

    pub async fn participants(&self, room: &str) -> Result<Vec<Participant>, ScError> {
        self.control.list_participants(room).await
    }

    /// Whether `identity` is currently a participant of `room`.
    ///
    /// A room the media server does not know has no participants.
    pub async fn participant_exists(&self, room: &str, identity: &str) -> Result<bool, ScError> {
        match self.participants(room).await {
            Ok(participants) => Ok(participants.iter().any(|p| p.identity == identity)),
            Err(ScError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn random_suffix() -> Result<u16, ScError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 2];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!(target: "sc.services.rooms", "Failed to generate random bytes");
        ScError::Internal("Failed to generate random bytes".to_string())
    })?;
    Ok(u16::from_be_bytes(bytes) % 10_000)
}
