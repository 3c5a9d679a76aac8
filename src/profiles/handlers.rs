//! HTTP handlers for `/profiles`.

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::{debug, error, info};

use super::model::{NewProfile, Profile, ProfileUpdate};
use crate::store::{ProfileStore, StoreError};

/// Handler error: a status code and a message rendered as `{"error": ..}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Client-facing message.
    pub message: String,
}

impl ApiError {
    /// 400 with `message`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(message) => Self::bad_request(message),
            StoreError::Conflict(message) => Self {
                status: StatusCode::CONFLICT,
                message,
            },
            StoreError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                message,
            },
            StoreError::Timeout { .. } | StoreError::Backend(_) => {
                error!(error = %err, "Profile store operation failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal server error".to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection, "Rejected request body");
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!(error = %rejection, "Rejected request path");
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Routes for the profile resource, bound to `store`.
pub fn profile_routes(store: ProfileStore) -> Router {
    Router::new()
        .route("/profiles", post(create_profile))
        .route(
            "/profiles/",
            get(missing_identity).put(missing_identity).delete(missing_identity),
        )
        .route(
            "/profiles/{user_id}",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .with_state(store)
}

/// POST /profiles
async fn create_profile(
    State(store): State<ProfileStore>,
    body: Result<Json<NewProfile>, JsonRejection>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let Json(new_profile) = body?;
    let profile = store.create(new_profile).await?;
    info!(user_id = %profile.user_id, id = %profile.id, "Profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /profiles/{user_id}
async fn get_profile(
    State(store): State<ProfileStore>,
    user_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Profile>, ApiError> {
    let Path(user_id) = user_id?;
    Ok(Json(store.get_by_identity(&user_id).await?))
}

/// PUT /profiles/{user_id}
async fn update_profile(
    State(store): State<ProfileStore>,
    user_id: Result<Path<String>, PathRejection>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<Profile>, ApiError> {
    let Path(user_id) = user_id?;
    let Json(update) = body?;
    let profile = store.update(&user_id, &update).await?;
    info!(user_id = %profile.user_id, "Profile updated");
    Ok(Json(profile))
}

/// DELETE /profiles/{user_id}
async fn delete_profile(
    State(store): State<ProfileStore>,
    user_id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = user_id?;
    store.delete(&user_id).await?;
    info!(%user_id, "Profile deleted");
    Ok(Json(json!({ "message": "profile deleted" })))
}

async fn missing_identity() -> ApiError {
    ApiError::bad_request("userId is required")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::store::MemoryBackend;

    fn app() -> Router {
        profile_routes(ProfileStore::new(
            Arc::new(MemoryBackend::new()),
            Duration::from_secs(5),
        ))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (StoreError::Conflict("c".into()), StatusCode::CONFLICT),
            (StoreError::NotFound("n".into()), StatusCode::NOT_FOUND),
            (
                StoreError::Timeout {
                    operation: "get",
                    after: Duration::from_secs(5),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (StoreError::Backend("b".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let api = ApiError::from(StoreError::Backend("connection refused 10.0.0.5".into()));
        assert_eq!(api.message, "internal server error");
    }

    #[tokio::test]
    async fn create_returns_201_then_409() {
        let app = app();
        let body = r#"{"userId":"u1","preferredName":"Ann"}"#;

        let (status, created) = send(&app, Method::POST, "/profiles", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["userId"], "u1");
        assert_eq!(created["preferredName"], "Ann");
        assert!(created["id"].as_str().is_some_and(|id| !id.is_empty()));

        let (status, err) = send(&app, Method::POST, "/profiles", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(err["error"].is_string());
    }

    #[tokio::test]
    async fn create_without_user_id_is_400() {
        let (status, err) = send(&app(), Method::POST, "/profiles", Some(r#"{"preferredName":"Ann"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "userId is required");
    }

    #[tokio::test]
    async fn undecodable_body_is_400() {
        let app = app();
        let (status, err) = send(&app, Method::POST, "/profiles", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(err["error"].as_str().is_some_and(|m| !m.is_empty()));

        let (status, _) = send(&app, Method::PUT, "/profiles/u1", Some(r#"{"preferredName":7}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn undecodable_path_is_json_400() {
        let app = app();
        for method in [Method::GET, Method::DELETE] {
            let (status, err) = send(&app, method, "/profiles/%FF", None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(err["error"].as_str().is_some_and(|m| m.contains("UTF-8")));
        }

        let (status, err) = send(&app, Method::PUT, "/profiles/%FF", Some(r#"{"preferredName":"B"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(err["error"].is_string());
    }

    #[tokio::test]
    async fn empty_identity_path_is_400() {
        let app = app();
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let (status, err) = send(&app, method, "/profiles/", None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(err["error"], "userId is required");
        }
    }

    #[tokio::test]
    async fn empty_update_is_400() {
        let app = app();
        send(&app, Method::POST, "/profiles", Some(r#"{"userId":"u1","preferredName":"A"}"#)).await;

        let (status, err) = send(&app, Method::PUT, "/profiles/u1", Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "no fields to update");
    }

    #[tokio::test]
    async fn delete_confirms_then_404() {
        let app = app();
        send(&app, Method::POST, "/profiles", Some(r#"{"userId":"u1"}"#)).await;

        let (status, body) = send(&app, Method::DELETE, "/profiles/u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "profile deleted" }));

        let (status, _) = send(&app, Method::DELETE, "/profiles/u1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
