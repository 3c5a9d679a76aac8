#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, header};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use profile_service::auth::{AuthGate, KeyProvider, StaticJwksSource, TokenValidator};
use profile_service::server::{AppState, create_router};
use profile_service::store::{MemoryBackend, ProfileBackend, ProfileStore};

pub const ISSUER: &str = "https://tenant.example.com/";
pub const AUDIENCE: &str = "https://api.example.com";
pub const KID: &str = "test-key-1";

pub const KEY_ONE_PEM: &[u8] = include_bytes!("../fixtures/rsa_key_1.pem");
pub const KEY_TWO_PEM: &[u8] = include_bytes!("../fixtures/rsa_key_2.pem");

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

pub fn sign(kid: Option<&str>, pem: &[u8], claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_rsa_pem(pem).expect("pem"))
        .expect("sign")
}

/// Claims a correctly configured tenant would issue, expiring `exp_offset`
/// seconds from now (negative for the past).
pub fn claims(subject: &str, exp_offset: i64) -> Value {
    json!({
        "iss": ISSUER,
        "sub": subject,
        "aud": AUDIENCE,
        "iat": now(),
        "exp": now().saturating_add_signed(exp_offset),
    })
}

pub fn valid_token() -> String {
    sign(Some(KID), KEY_ONE_PEM, &claims("auth0|u1", 3600))
}

pub fn validator() -> TokenValidator {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/jwks.json");
    let source = StaticJwksSource::from_file(std::path::Path::new(path)).expect("jwks fixture");
    let keys = KeyProvider::new(format!("{ISSUER}.well-known/jwks.json"), Arc::new(source));
    TokenValidator::new(Arc::new(keys), ISSUER, AUDIENCE)
}

pub fn gate() -> AuthGate {
    AuthGate::new(Arc::new(validator()))
}

pub fn app_with_backend(backend: Arc<dyn ProfileBackend>, op_timeout: Duration) -> Router {
    create_router(AppState {
        store: ProfileStore::new(backend, op_timeout),
        gate: gate(),
        max_concurrent_requests: None,
    })
}

pub fn app() -> Router {
    app_with_backend(Arc::new(MemoryBackend::new()), Duration::from_secs(5))
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request")
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
