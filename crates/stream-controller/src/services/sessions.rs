//! Session Orchestrator.
//!
//! Composes rooms, ingress and tokens into the two user-facing flows.
//!
//! # Publish flow
//!
//! ```text
//! Requested -> RoomEnsured -> IngressOrGrantEnsured -> TokenIssued -> Completed
//!     \______________\_______________\_____________________\-> Failed(stage)
//! ```
//!
//! A failure after the room exists leaves the room in place and reports the
//! room name with the failure. Nothing is rolled back: another caller may
//! already have seen the room.
//!
//! # Join flow
//!
//! Rejects an identity already present in the room, otherwise issues a viewer
//! token.

use crate::auth::token::{TokenIssuer, DEFAULT_TOKEN_VALIDITY};
use crate::errors::{PublishStage, ScError};
use crate::models::{Ingress, IngressMode, Room, StreamMetadata};
use crate::observability::metrics;
use crate::services::ingress::IngressManager;
use crate::services::rooms::RoomManager;
use common::jwt::GrantSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Suffix of the synthetic publisher identity used by ingress endpoints.
const INGRESS_IDENTITY_SUFFIX: &str = " (via OBS)";

/// Input of the publish flow.
#[derive(Debug, Default)]
pub struct PublishRequest {
    /// Requested room name; generated when absent or blank.
    pub room_name: Option<String>,
    pub metadata: StreamMetadata,
    /// `None` publishes directly with the host token.
    pub ingress: Option<IngressMode>,
}

/// Result of a completed publish flow.
#[derive(Debug)]
pub struct PublishOutcome {
    pub room: Room,
    pub ingress: Option<Ingress>,
    /// Host participant token.
    pub host_token: String,
    /// Room-scoped API token with no media grants.
    pub auth_token: String,
    pub ws_url: String,
}

/// Result of a completed join flow.
#[derive(Debug)]
pub struct JoinOutcome {
    pub token: String,
    pub auth_token: String,
    pub ws_url: String,
}

struct IssuedTokens {
    host_token: String,
    auth_token: String,
}

enum PublishState {
    Requested,
    RoomEnsured {
        room: Room,
    },
    IngressOrGrantEnsured {
        room: Room,
        ingress: Option<Ingress>,
    },
    TokenIssued {
        room: Room,
        ingress: Option<Ingress>,
        tokens: IssuedTokens,
    },
    Completed(PublishOutcome),
    Failed {
        stage: PublishStage,
        room_name: Option<String>,
        error: ScError,
    },
}

impl PublishState {
    fn name(&self) -> &'static str {
        match self {
            PublishState::Requested => "requested",
            PublishState::RoomEnsured { .. } => "room_ensured",
            PublishState::IngressOrGrantEnsured { .. } => "ingress_or_grant_ensured",
            PublishState::TokenIssued { .. } => "token_issued",
            PublishState::Completed(_) => "completed",
            PublishState::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone)]
pub struct SessionOrchestrator {
    rooms: RoomManager,
    ingress: IngressManager,
    issuer: Arc<TokenIssuer>,
    ws_url: String,
    viewer_can_publish: bool,
}

impl SessionOrchestrator {
    pub fn new(
        rooms: RoomManager,
        ingress: IngressManager,
        issuer: Arc<TokenIssuer>,
        ws_url: String,
        viewer_can_publish: bool,
    ) -> Self {
        Self {
            rooms,
            ingress,
            issuer,
            ws_url,
            viewer_can_publish,
        }
    }

    /// Run the publish flow on its own task.
    ///
    /// Dropping the returned future does not cancel the flow, so control
    /// calls already in flight still complete.
    pub async fn publish_detached(&self, request: PublishRequest) -> Result<PublishOutcome, ScError> {
        let this = self.clone();
        tokio::spawn(async move { this.publish(request).await })
            .await
            .map_err(|e| ScError::Internal(format!("Publish task failed: {e}")))?
    }

    /// Run the publish flow.
    ///
    /// # Errors
    ///
    /// - `ScError::BadRequest` - missing creator identity or bad room name,
    ///   rejected before any control call
    /// - `ScError::Conflict` - the room name is taken
    /// - `ScError::PublishFailed` - a step failed; carries the stage and the
    ///   name of any room left in place
    #[instrument(skip_all, fields(kind = flow_kind(&request), room = tracing::field::Empty))]
    pub async fn publish(&self, mut request: PublishRequest) -> Result<PublishOutcome, ScError> {
        let creator = request.metadata.creator()?.to_string();
        // Stored metadata carries the same identity the tokens are issued to
        request.metadata.creator_identity = Some(creator.clone());
        if let Some(name) = request.room_name.as_deref() {
            validate_room_name(name)?;
        }
        let kind = flow_kind(&request);

        let mut state = PublishState::Requested;
        loop {
            state = match state {
                PublishState::Requested => match self.ensure_room(&request).await {
                    Ok(room) => {
                        tracing::Span::current().record("room", room.name.as_str());
                        PublishState::RoomEnsured { room }
                    }
                    Err(error) => PublishState::Failed {
                        stage: PublishStage::Room,
                        room_name: None,
                        error,
                    },
                },
                PublishState::RoomEnsured { room } => match request.ingress {
                    Some(mode) => {
                        let publisher = format!("{creator}{INGRESS_IDENTITY_SUFFIX}");
                        match self
                            .ingress
                            .create(&room.name, &publisher, &publisher, mode)
                            .await
                        {
                            Ok(ingress) => PublishState::IngressOrGrantEnsured {
                                room,
                                ingress: Some(ingress),
                            },
                            Err(error) => PublishState::Failed {
                                stage: PublishStage::Ingress,
                                room_name: Some(room.name),
                                error,
                            },
                        }
                    }
                    // The host token's publish grant stands in for an ingress
                    None => PublishState::IngressOrGrantEnsured {
                        room,
                        ingress: None,
                    },
                },
                PublishState::IngressOrGrantEnsured { room, ingress } => {
                    match self.issue_host_tokens(&creator, &room.name) {
                        Ok(tokens) => PublishState::TokenIssued {
                            room,
                            ingress,
                            tokens,
                        },
                        Err(error) => PublishState::Failed {
                            stage: PublishStage::Token,
                            room_name: Some(room.name),
                            error,
                        },
                    }
                }
                PublishState::TokenIssued {
                    room,
                    ingress,
                    tokens,
                } => PublishState::Completed(PublishOutcome {
                    room,
                    ingress,
                    host_token: tokens.host_token,
                    auth_token: tokens.auth_token,
                    ws_url: self.ws_url.clone(),
                }),
                PublishState::Completed(outcome) => {
                    metrics::record_publish_flow(kind, "completed", "none");
                    info!(target: "sc.services.sessions", room = %outcome.room.name, "Publish flow completed");
                    return Ok(outcome);
                }
                PublishState::Failed {
                    stage,
                    room_name,
                    error,
                } => {
                    metrics::record_publish_flow(kind, "failed", stage.as_str());
                    return Err(publish_error(stage, room_name, error));
                }
            };
            debug!(target: "sc.services.sessions", state = state.name(), "Publish flow transition");
        }
    }

    /// Run the join flow.
    ///
    /// # Errors
    ///
    /// - `ScError::BadRequest` - blank identity or room
    /// - `ScError::Conflict` - identity already present in the room
    #[instrument(skip_all, fields(room = %room))]
    pub async fn join(&self, identity: &str, room: &str) -> Result<JoinOutcome, ScError> {
        let identity = identity.trim();
        let room = room.trim();
        if identity.is_empty() || room.is_empty() {
            return Err(ScError::BadRequest(
                "identity and room_name are required".to_string(),
            ));
        }

        match self.rooms.participant_exists(room, identity).await {
            Ok(false) => {}
            Ok(true) => {
                metrics::record_join_flow("conflict");
                info!(target: "sc.services.sessions", room = %room, "Identity already present in room");
                return Err(ScError::Conflict(format!(
                    "Identity is already present in room '{room}'"
                )));
            }
            Err(e) => {
                metrics::record_join_flow("error");
                return Err(e);
            }
        }

        let grants = if self.viewer_can_publish {
            GrantSet::viewer().with_publish()
        } else {
            GrantSet::viewer()
        };

        let issued = self
            .issuer
            .issue(identity, room, grants, DEFAULT_TOKEN_VALIDITY)
            .and_then(|token| {
                let auth_token =
                    self.issuer
                        .issue(identity, room, GrantSet::api(), DEFAULT_TOKEN_VALIDITY)?;
                Ok((token, auth_token))
            });
        let (token, auth_token) = match issued {
            Ok(tokens) => tokens,
            Err(e) => {
                metrics::record_join_flow("error");
                return Err(e.into());
            }
        };

        metrics::record_join_flow("completed");
        Ok(JoinOutcome {
            token,
            auth_token,
            ws_url: self.ws_url.clone(),
        })
    }

    async fn ensure_room(&self, request: &PublishRequest) -> Result<Room, ScError> {
        let name = match request.room_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.rooms.generate_room_name().await?,
        };
        let metadata = request.metadata.to_json()?;
        self.rooms.create(&name, &metadata).await
    }

    fn issue_host_tokens(&self, creator: &str, room: &str) -> Result<IssuedTokens, ScError> {
        let host_token = self
            .issuer
            .issue(creator, room, GrantSet::host(), DEFAULT_TOKEN_VALIDITY)?;
        let auth_token = self
            .issuer
            .issue(creator, room, GrantSet::api(), DEFAULT_TOKEN_VALIDITY)?;
        Ok(IssuedTokens {
            host_token,
            auth_token,
        })
    }
}

fn flow_kind(request: &PublishRequest) -> &'static str {
    if request.ingress.is_some() {
        "ingress"
    } else {
        "stream"
    }
}

fn validate_room_name(name: &str) -> Result<(), ScError> {
    if name.len() > 256 || name.chars().any(char::is_control) {
        return Err(ScError::BadRequest("room_name is not valid".to_string()));
    }
    Ok(())
}

/// Caller-facing errors pass through; everything else is tagged with the
/// failed stage.
fn publish_error(stage: PublishStage, room_name: Option<String>, error: ScError) -> ScError {
    match error {
        ScError::BadRequest(_) | ScError::Conflict(_) => error,
        other => {
            warn!(
                target: "sc.services.sessions",
                stage = %stage,
                room_name = ?room_name,
                error = %other,
                "Publish flow failed"
            );
            ScError::PublishFailed {
                stage,
                room_name,
                reason: other.to_string(),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::RoomConflictPolicy;
    use crate::models::Participant;
    use crate::services::control_client::mock::{MockControlPlane, MockOp};
    use crate::services::control_client::{ControlPlane, CreateRoomOptions, IngressOptions};
    use async_trait::async_trait;
    use common::secret::SecretString;
    use std::time::Duration;

    /// Control plane whose create calls take `delay` before reaching the mock.
    struct SlowControlPlane {
        inner: Arc<MockControlPlane>,
        delay: Duration,
    }

    #[async_trait]
    impl ControlPlane for SlowControlPlane {
        async fn create_room(&self, options: &CreateRoomOptions) -> Result<Room, ScError> {
            tokio::time::sleep(self.delay).await;
            self.inner.create_room(options).await
        }

        async fn list_rooms(&self, names: &[String]) -> Result<Vec<Room>, ScError> {
            self.inner.list_rooms(names).await
        }

        async fn delete_room(&self, name: &str) -> Result<(), ScError> {
            self.inner.delete_room(name).await
        }

        async fn list_participants(&self, room: &str) -> Result<Vec<Participant>, ScError> {
            self.inner.list_participants(room).await
        }

        async fn create_ingress(&self, options: &IngressOptions) -> Result<Ingress, ScError> {
            tokio::time::sleep(self.delay).await;
            self.inner.create_ingress(options).await
        }

        async fn list_ingress(&self) -> Result<Vec<Ingress>, ScError> {
            self.inner.list_ingress().await
        }

        async fn delete_ingress(&self, ingress_id: &str) -> Result<(), ScError> {
            self.inner.delete_ingress(ingress_id).await
        }
    }

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new("APIdevkey", &SecretString::from("orchestrator-test-secret")).unwrap())
    }

    fn orchestrator(
        mock: MockControlPlane,
        viewer_can_publish: bool,
    ) -> (SessionOrchestrator, Arc<MockControlPlane>, Arc<TokenIssuer>) {
        let mock = Arc::new(mock);
        let issuer = issuer();
        let orchestrator = SessionOrchestrator::new(
            RoomManager::new(mock.clone(), RoomConflictPolicy::Reject),
            IngressManager::new(mock.clone()),
            issuer.clone(),
            "ws://media.local".to_string(),
            viewer_can_publish,
        );
        (orchestrator, mock, issuer)
    }

    fn publish_request(room: Option<&str>, ingress: Option<IngressMode>) -> PublishRequest {
        PublishRequest {
            room_name: room.map(ToString::to_string),
            metadata: StreamMetadata {
                creator_identity: Some("alice".to_string()),
                ..StreamMetadata::default()
            },
            ingress,
        }
    }

    #[tokio::test]
    async fn test_publish_without_ingress_issues_host_token() {
        let (orchestrator, mock, issuer) = orchestrator(MockControlPlane::new(), false);

        let outcome = orchestrator
            .publish(publish_request(Some("studio"), None))
            .await
            .unwrap();

        assert_eq!(outcome.room.name, "studio");
        assert!(outcome.ingress.is_none());
        assert_eq!(mock.call_count(MockOp::CreateIngress), 0);

        let host = issuer.decode(&outcome.host_token).unwrap();
        assert_eq!(host.sub, "alice");
        assert_eq!(host.video.grant_set(), GrantSet::host());

        let auth = issuer.decode(&outcome.auth_token).unwrap();
        assert_eq!(auth.video.grant_set(), GrantSet::api());
        assert_eq!(auth.video.room, "studio");
    }

    #[tokio::test]
    async fn test_publish_generates_room_name() {
        let (orchestrator, mock, _issuer) = orchestrator(MockControlPlane::new(), false);

        let outcome = orchestrator.publish(publish_request(None, None)).await.unwrap();

        assert!(outcome.room.name.starts_with("room-"));
        assert!(mock.has_room(&outcome.room.name));
    }

    #[tokio::test]
    async fn test_publish_requires_creator_before_any_call() {
        let (orchestrator, mock, _issuer) = orchestrator(MockControlPlane::new(), false);

        let result = orchestrator
            .publish(PublishRequest {
                room_name: Some("studio".to_string()),
                ..PublishRequest::default()
            })
            .await;

        assert!(matches!(result, Err(ScError::BadRequest(_))));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_publish_room_failure_reports_room_stage() {
        let (orchestrator, _mock, _issuer) =
            orchestrator(MockControlPlane::new().failing_on(MockOp::CreateRoom), false);

        let result = orchestrator
            .publish(publish_request(Some("studio"), Some(IngressMode::Rtmp)))
            .await;

        assert!(matches!(
            result,
            Err(ScError::PublishFailed {
                stage: PublishStage::Room,
                room_name: None,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_publish_ingress_failure_leaves_room_in_place() {
        let (orchestrator, mock, _issuer) =
            orchestrator(MockControlPlane::new().failing_on(MockOp::CreateIngress), false);

        let result = orchestrator
            .publish(publish_request(Some("studio"), Some(IngressMode::Rtmp)))
            .await;

        assert!(
            matches!(
                &result,
                Err(ScError::PublishFailed {
                    stage: PublishStage::Ingress,
                    room_name: Some(room),
                    ..
                }) if room == "studio"
            ),
            "expected ingress stage failure, got {result:?}"
        );
        assert!(mock.has_room("studio"));
        assert_eq!(mock.call_count(MockOp::DeleteRoom), 0);
    }

    #[tokio::test]
    async fn test_publish_conflict_passes_through() {
        let (orchestrator, _mock, _issuer) =
            orchestrator(MockControlPlane::new().with_room("studio", "{}"), false);

        let result = orchestrator
            .publish(publish_request(Some("studio"), None))
            .await;
        assert!(matches!(result, Err(ScError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_publish_whip_ingress_uses_synthetic_publisher() {
        let (orchestrator, mock, _issuer) = orchestrator(MockControlPlane::new(), false);

        let outcome = orchestrator
            .publish(publish_request(Some("studio"), Some(IngressMode::Whip)))
            .await
            .unwrap();

        assert!(outcome.ingress.is_some());
        let options = mock.last_ingress_request().unwrap();
        assert!(options.bypass_transcoding);
        assert!(options.video.is_none() && options.audio.is_none());
        assert_eq!(options.participant_identity, "alice (via OBS)");
    }

    #[tokio::test]
    async fn test_publish_detached_completes() {
        let (orchestrator, mock, _issuer) = orchestrator(MockControlPlane::new(), false);

        let outcome = orchestrator
            .publish_detached(publish_request(Some("detached"), None))
            .await
            .unwrap();

        assert_eq!(outcome.room.name, "detached");
        assert!(mock.has_room("detached"));
    }

    #[tokio::test]
    async fn test_publish_detached_survives_dropped_caller() {
        let mock = Arc::new(MockControlPlane::new());
        let slow = Arc::new(SlowControlPlane {
            inner: mock.clone(),
            delay: Duration::from_millis(100),
        });
        let orchestrator = SessionOrchestrator::new(
            RoomManager::new(slow.clone(), RoomConflictPolicy::Reject),
            IngressManager::new(slow),
            issuer(),
            "ws://media.local".to_string(),
            false,
        );

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.publish_detached(publish_request(Some("studio"), Some(IngressMode::Rtmp))),
        )
        .await;
        assert!(result.is_err(), "caller should give up before the flow finishes");

        for _ in 0..50 {
            if mock.ingress_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(mock.has_room("studio"));
        assert_eq!(mock.ingress_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_stores_trimmed_creator() {
        let (orchestrator, _mock, issuer) = orchestrator(MockControlPlane::new(), false);
        let request = PublishRequest {
            room_name: Some("studio".to_string()),
            metadata: StreamMetadata {
                creator_identity: Some("  carol ".to_string()),
                ..StreamMetadata::default()
            },
            ingress: None,
        };

        let outcome = orchestrator.publish(request).await.unwrap();

        assert_eq!(outcome.room.metadata, r#"{"creator_identity":"carol"}"#);
        assert_eq!(issuer.decode(&outcome.host_token).unwrap().sub, "carol");
    }

    #[tokio::test]
    async fn test_join_conflict_never_issues_token() {
        let (orchestrator, _mock, _issuer) =
            orchestrator(MockControlPlane::new().with_participant("studio", "bob"), false);

        let result = orchestrator.join("bob", "studio").await;
        assert!(matches!(result, Err(ScError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_join_issues_viewer_token() {
        let (orchestrator, _mock, issuer) =
            orchestrator(MockControlPlane::new().with_participant("studio", "bob"), false);

        let outcome = orchestrator.join("carol", "studio").await.unwrap();
        let claims = issuer.decode(&outcome.token).unwrap();

        assert_eq!(claims.sub, "carol");
        assert_eq!(claims.video.grant_set(), GrantSet::viewer());
        assert_eq!(outcome.ws_url, "ws://media.local");
    }

    #[tokio::test]
    async fn test_join_viewer_publish_upgrade() {
        let (orchestrator, _mock, issuer) = orchestrator(MockControlPlane::new(), true);

        let outcome = orchestrator.join("carol", "studio").await.unwrap();
        let grants = issuer.decode(&outcome.token).unwrap().video.grant_set();

        assert!(grants.can_publish);
        assert!(grants.can_subscribe);
    }

    #[tokio::test]
    async fn test_join_requires_identity_and_room() {
        let (orchestrator, mock, _issuer) = orchestrator(MockControlPlane::new(), false);

        assert!(matches!(
            orchestrator.join("", "studio").await,
            Err(ScError::BadRequest(_))
        ));
        assert!(matches!(
            orchestrator.join("carol", " ").await,
            Err(ScError::BadRequest(_))
        ));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_join_participant_query_failure_is_upstream() {
        let (orchestrator, _mock, _issuer) = orchestrator(
            MockControlPlane::new().failing_on(MockOp::ListParticipants),
            false,
        );

        assert!(matches!(
            orchestrator.join("carol", "studio").await,
            Err(ScError::Upstream(_))
        ));
    }
}
