//! Credential storage and the privileged decrypt endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use ats_db::credentials;

use crate::api_types::{
    CredentialCreateReq, CredentialView, DecryptedCredential, ItemsResponse, OkResponse,
};
use crate::routes::{ApiError, ApiResult, AppState};

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
) -> ApiResult<Json<ItemsResponse<CredentialView>>> {
    let rows = credentials::list_names(&st.pool).await?;
    Ok(Json(ItemsResponse {
        items: rows
            .into_iter()
            .map(|(name, created_at)| CredentialView { name, created_at })
            .collect(),
    }))
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CredentialCreateReq>,
) -> ApiResult<Json<OkResponse>> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(ApiError::bad_request("invalid credential name"));
    }
    if req.access_key.len() < 5 || req.secret_key.len() < 5 {
        return Err(ApiError::bad_request("keys too short"));
    }
    if credentials::fetch(&st.pool, name).await?.is_some() {
        // rotation = new row under a new name, never an in-place overwrite
        return Err(ApiError::bad_request("credential already exists"));
    }

    let access_enc = st.cipher.encrypt(&req.access_key);
    let secret_enc = st.cipher.encrypt(&req.secret_key);
    credentials::insert(&st.pool, name, &access_enc, &secret_enc).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Plaintext keys for a named credential. 404 for unknown names, 400 when
/// the configured master key cannot open the row.
pub(crate) async fn decrypt(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<DecryptedCredential>> {
    let row = credentials::fetch(&st.pool, &name)
        .await?
        .ok_or_else(|| ApiError::not_found("credential not found"))?;

    let access_key = st
        .cipher
        .decrypt(&row.access_key_enc)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let secret_key = st
        .cipher
        .decrypt(&row.secret_key_enc)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    Ok(Json(DecryptedCredential { name: row.name, access_key, secret_key }))
}

pub(crate) async fn remove(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    let deleted = credentials::delete(&st.pool, &name).await?;
    Ok(Json(OkResponse { ok: deleted }))
}
