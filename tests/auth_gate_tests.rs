//! End-to-end authentication tests
//!
//! Drives the full router with real RS256 tokens signed by the fixture keys:
//! - public and protected routes
//! - every rejection reason surfaces as a 401 JSON body
//! - rejected requests never reach a handler

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::{Method, StatusCode, header};
use axum::{Router, middleware, routing::get};
use pretty_assertions::assert_eq;
use serde_json::json;
use tower::ServiceExt;

use common::*;
use jsonwebtoken::jwk::JwkSet;
use profile_service::auth::{
    AuthGate, JwksSource, KeyError, KeyProvider, TokenValidator, ValidatedClaims, auth_gate,
};
use profile_service::server::{AppState, create_router};
use profile_service::store::{MemoryBackend, ProfileStore};

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn weather_requires_token() {
    let response = app()
        .oneshot(request(Method::GET, "/weather", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    assert_eq!(
        read_json(response).await,
        json!({ "error": "Unauthorized", "reason": "missing_token" })
    );
}

#[tokio::test]
async fn weather_with_valid_token() {
    let token = valid_token();
    let response = app()
        .oneshot(request(Method::GET, "/weather", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({ "location": "San Francisco, CA", "temp": 72.5, "condition": "Sunny" })
    );
}

#[tokio::test]
async fn rejection_reasons() {
    let cases = [
        ("not-a-jwt".to_string(), "malformed_token"),
        (
            sign(Some("rotated-away"), KEY_ONE_PEM, &claims("auth0|u1", 3600)),
            "unknown_key",
        ),
        (
            sign(Some(KID), KEY_TWO_PEM, &claims("auth0|u1", 3600)),
            "bad_signature",
        ),
        (
            sign(
                Some(KID),
                KEY_ONE_PEM,
                &json!({ "iss": "https://evil.example.com/", "sub": "u", "aud": AUDIENCE, "exp": now() + 3600 }),
            ),
            "bad_issuer",
        ),
        (
            sign(
                Some(KID),
                KEY_ONE_PEM,
                &json!({ "iss": ISSUER, "sub": "u", "aud": "https://other-api", "exp": now() + 3600 }),
            ),
            "bad_audience",
        ),
        (
            sign(Some(KID), KEY_ONE_PEM, &claims("auth0|u1", -10)),
            "expired",
        ),
    ];

    let app = app();
    for (token, reason) in cases {
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/weather", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "reason {reason}");
        assert_eq!(
            read_json(response).await,
            json!({ "error": "Unauthorized", "reason": reason })
        );
    }
}

#[tokio::test]
async fn expiry_within_skew_is_accepted() {
    let token = sign(Some(KID), KEY_ONE_PEM, &claims("auth0|u1", -3));
    let response = app()
        .oneshot(request(Method::GET, "/weather", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let mut req = request(Method::GET, "/weather", None, None);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        "Basic dXNlcjpwYXNz".parse().unwrap(),
    );
    let response = app().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["reason"], "malformed_token");
}

#[tokio::test]
async fn rejected_request_never_reaches_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = Router::new()
        .route(
            "/guarded",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "reached"
                }
            }),
        )
        .route_layer(middleware::from_fn_with_state(gate(), auth_gate));

    let forged = sign(Some(KID), KEY_TWO_PEM, &claims("auth0|u1", 3600));
    for token in [None, Some(forged.as_str())] {
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/guarded", token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let token = valid_token();
    let response = app
        .oneshot(request(Method::GET, "/guarded", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn claims_reach_the_handler() {
    let app = Router::new()
        .route(
            "/whoami",
            get(|axum::Extension(claims): axum::Extension<ValidatedClaims>| async move {
                claims.subject
            }),
        )
        .route_layer(middleware::from_fn_with_state(gate(), auth_gate));

    let token = valid_token();
    let response = app
        .oneshot(request(Method::GET, "/whoami", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"auth0|u1");
}

#[tokio::test]
async fn rejected_create_writes_nothing() {
    let app = app();
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/profiles",
            None,
            Some(json!({ "userId": "u1", "preferredName": "Ann" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = valid_token();
    let response = app
        .oneshot(request(Method::GET, "/profiles/u1", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_path_is_404_without_auth() {
    let response = app()
        .oneshot(request(Method::GET, "/nope", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Key endpoint that is down.
struct UnreachableJwks;

#[async_trait::async_trait]
impl JwksSource for UnreachableJwks {
    async fn fetch(&self, _jwks_uri: &str) -> Result<JwkSet, KeyError> {
        Err(KeyError::Fetch("connection refused".to_string()))
    }
}

#[tokio::test]
async fn unreachable_key_set_is_keys_unavailable() {
    let keys = KeyProvider::new(format!("{ISSUER}.well-known/jwks.json"), Arc::new(UnreachableJwks));
    let validator = TokenValidator::new(Arc::new(keys), ISSUER, AUDIENCE);
    let app = create_router(AppState {
        store: ProfileStore::new(Arc::new(MemoryBackend::new()), Duration::from_secs(5)),
        gate: AuthGate::new(Arc::new(validator)),
        max_concurrent_requests: None,
    });

    let token = valid_token();
    let response = app
        .oneshot(request(Method::GET, "/weather", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        read_json(response).await,
        json!({ "error": "Unauthorized", "reason": "keys_unavailable" })
    );
}

#[tokio::test]
async fn concurrency_limit_still_serves_requests() {
    let app = create_router(AppState {
        store: ProfileStore::new(Arc::new(MemoryBackend::new()), Duration::from_secs(5)),
        gate: gate(),
        max_concurrent_requests: Some(1),
    });

    let token = valid_token();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/weather", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
