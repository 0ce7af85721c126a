//! Stored API key management. Key values go in but never come back out;
//! list responses carry metadata only.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app_state::AppState;
use crate::error::ChatError;
use crate::store::ApiKey;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub user_id: String,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub created_at: String,
}

impl From<ApiKey> for KeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            enabled: key.enabled,
            created_at: key.created_at.to_rfc3339(),
        }
    }
}

pub async fn create_key(
    State(state): State<AppState>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<Json<KeyResponse>, ChatError> {
    state.counters.record_request();

    let key_value = request.key.trim();
    if key_value.is_empty() {
        return Err(ChatError::Validation("Key value is required.".into()));
    }
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ChatError::Validation("Key name is required.".into()));
    }

    let key = state.store.api_keys.insert(&request.user_id, name, key_value)?;
    info!("Created key '{}' for user {}", key.name, request.user_id);
    Ok(Json(key.into()))
}

pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<KeyResponse>>, ChatError> {
    state.counters.record_request();

    let keys = state.store.api_keys.list_for_user(&query.user_id)?;
    Ok(Json(keys.into_iter().map(KeyResponse::from).collect()))
}
