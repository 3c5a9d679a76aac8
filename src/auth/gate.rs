//! Authentication gate for protected routes.
//!
//! Validation is behind the [`Authenticator`] trait, which returns a tagged
//! result. The gate turns that into a [`GateDecision`] and acts on it:
//!
//! - `Continue(claims)`: claims go into the request extensions, then the
//!   next stage runs. The gate does not look at the response.
//! - `Stop(reason)`: a 401 JSON body is written and the next stage is never
//!   called.
//!
//! `Next` is moved into exactly one branch, so a request either reaches the
//! handler or receives the 401, never both and never neither.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error, warn};

use super::validator::{AuthRejection, TokenValidator, ValidatedClaims};

/// Anything that can turn a bearer token into verified claims.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Validate `token`.
    async fn authenticate(&self, token: &str) -> Result<ValidatedClaims, AuthRejection>;
}

#[async_trait::async_trait]
impl Authenticator for TokenValidator {
    async fn authenticate(&self, token: &str) -> Result<ValidatedClaims, AuthRejection> {
        self.validate(token).await
    }
}

/// What the gate does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Hand the request to the protected handler.
    Continue(ValidatedClaims),
    /// Answer 401 and stop the pipeline.
    Stop(AuthRejection),
}

/// Shared gate state for `axum::middleware::from_fn_with_state`.
#[derive(Clone)]
pub struct AuthGate {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthGate {
    /// Gate requests through `authenticator`.
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }

    /// Decide a request from its headers. A missing token is rejected
    /// without consulting the authenticator.
    pub async fn decide(&self, headers: &HeaderMap) -> GateDecision {
        let token = match bearer_token(headers) {
            Ok(token) => token,
            Err(rejection) => return GateDecision::Stop(rejection),
        };

        match self.authenticator.authenticate(token).await {
            Ok(claims) => GateDecision::Continue(claims),
            Err(rejection) => GateDecision::Stop(rejection),
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(AuthRejection::MissingToken);
    };
    let value = value.to_str().map_err(|_| AuthRejection::MalformedToken)?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthRejection::MalformedToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthRejection::MissingToken);
    }
    Ok(token)
}

/// Authentication middleware
pub async fn auth_gate(
    State(gate): State<AuthGate>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let decision = gate.decide(request.headers()).await;

    match decision {
        GateDecision::Continue(claims) => {
            debug!(subject = %claims.subject, path = %request.uri().path(), "Authenticated request");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        GateDecision::Stop(rejection) => {
            if rejection == AuthRejection::KeysUnavailable {
                error!(path = %request.uri().path(), "Rejecting request: signing keys unavailable");
            } else {
                warn!(path = %request.uri().path(), reason = rejection.code(), "JWT validation failed");
            }
            rejection.into_response()
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({
                "error": "Unauthorized",
                "reason": self.code(),
            })),
        )
            .into_response()
    }
}
