//! Raw token endpoint.
//!
//! `GET /getToken?room=<room>&identity=<identity>` returns a bare token with
//! only the room-join grant, as plain text.

use crate::auth::token::DEFAULT_TOKEN_VALIDITY;
use crate::errors::ScError;
use crate::models::api::TokenQuery;
use crate::routes::AppState;
use axum::extract::{Query, State};
use common::jwt::GrantSet;
use std::sync::Arc;
use tracing::instrument;

const DEFAULT_ROOM: &str = "my-room";
const DEFAULT_IDENTITY: &str = "identity";

/// Handler for GET /getToken
#[instrument(skip_all, name = "sc.token.get")]
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<String, ScError> {
    let room = or_default(query.room.as_deref(), DEFAULT_ROOM);
    let identity = or_default(query.identity.as_deref(), DEFAULT_IDENTITY);

    let token = state
        .issuer
        .issue(identity, room, GrantSet::api(), DEFAULT_TOKEN_VALIDITY)?;
    Ok(token)
}

fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => default,
    }
}
