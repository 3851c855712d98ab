//! Crypto helper endpoints.
//!
//! Encryption uses the server's primary key; decryption of arbitrary data
//! requires the caller to supply a key, so these endpoints never reveal
//! what the server can read. `decryptable` only answers yes or no.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::crypto::{AesGcmCipher, Cipher, CipherChain, FernetCipher};
use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Deserialize)]
pub struct EncryptionRequest {
    pub data: String,
    /// Optional key to encrypt with instead of the server's.
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Deserialize)]
pub struct DecryptionRequest {
    pub data: String,
    /// The key to decrypt with. Required: the server never decrypts
    /// arbitrary payloads with its own keys on behalf of callers.
    pub key: String,
}

#[derive(Deserialize)]
pub struct DecryptableRequest {
    pub data: String,
}

pub async fn encrypt(
    State(state): State<AppState>,
    Json(request): Json<EncryptionRequest>,
) -> Response {
    let debug = state.config.debug;
    let result = match &request.key {
        Some(key) => match FernetCipher::new(key) {
            Ok(cipher) => cipher.encrypt(&request.data),
            Err(e) => return ApiError::new(StatusCode::BAD_REQUEST, e.to_string(), debug).into_response(),
        },
        None => state.engine.cipher().encrypt(&request.data),
    };
    match result {
        Ok(encrypted) => Json(json!({ "result": encrypted })).into_response(),
        Err(e) => ApiError::new(StatusCode::BAD_REQUEST, e.to_string(), debug).into_response(),
    }
}

pub async fn decrypt(
    State(state): State<AppState>,
    Json(request): Json<DecryptionRequest>,
) -> Response {
    let debug = state.config.debug;
    // The supplied key may belong to either scheme; trial both.
    let mut suites: Vec<Box<dyn Cipher>> = Vec::new();
    if let Ok(cipher) = AesGcmCipher::new(&request.key) {
        suites.push(Box::new(cipher));
    }
    if let Ok(cipher) = FernetCipher::new(&request.key) {
        suites.push(Box::new(cipher));
    }
    if suites.is_empty() {
        return ApiError::new(StatusCode::BAD_REQUEST, "invalid key material", debug).into_response();
    }
    match CipherChain::new(suites).decrypt(&request.data) {
        Ok(plaintext) => Json(json!({ "result": plaintext })).into_response(),
        Err(e) => ApiError::new(StatusCode::BAD_REQUEST, e.to_string(), debug).into_response(),
    }
}

pub async fn decryptable(
    State(state): State<AppState>,
    Json(request): Json<DecryptableRequest>,
) -> Json<serde_json::Value> {
    Json(json!({ "result": state.engine.cipher().decryptable(&request.data) }))
}

pub async fn generate_key() -> Json<serde_json::Value> {
    Json(json!({ "result": CipherChain::generate_key() }))
}
