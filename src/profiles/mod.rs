//! Profile resource: wire types and HTTP handlers.
//!
//! Handlers are thin. They decode the request, call [`crate::store::ProfileStore`]
//! and translate its outcome to a status code in one place
//! ([`handlers::ApiError`]).

pub mod handlers;
pub mod model;

pub use handlers::{ApiError, profile_routes};
pub use model::{NewProfile, Profile, ProfileUpdate};
