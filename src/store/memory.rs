//! In-memory profile backend backed by `DashMap`.
//!
//! Suitable for tests and single-instance development runs. Data is lost on
//! restart.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{ProfileBackend, StoreError, StoreResult};
use crate::profiles::{NewProfile, Profile, ProfileUpdate};

/// Profiles keyed by `user_id`.
#[derive(Default)]
pub struct MemoryBackend {
    profiles: DashMap<String, Profile>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProfileBackend for MemoryBackend {
    async fn insert(&self, profile: NewProfile) -> StoreResult<Profile> {
        match self.profiles.entry(profile.user_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(
                "profile with this userId already exists".to_string(),
            )),
            Entry::Vacant(slot) => {
                let stored = profile.into_profile(uuid::Uuid::new_v4().simple().to_string());
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn find(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        Ok(self.profiles.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, user_id: &str, update: &ProfileUpdate) -> StoreResult<bool> {
        match self.profiles.get_mut(user_id) {
            Some(mut entry) => {
                update.apply_to(entry.value_mut());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self.profiles.remove(user_id).is_some())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn shutdown(&self) {}

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
