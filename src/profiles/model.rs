//! Profile resource types.

use serde::{Deserialize, Serialize};

/// A stored user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Store-assigned identifier; immutable.
    pub id: String,
    /// External identity issued by the identity provider; unique and immutable.
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub preferred_name: String,
}

/// Body of `POST /profiles`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    /// External identity; required.
    #[serde(default)]
    pub user_id: String,
    /// Display name; defaults to empty.
    #[serde(default)]
    pub preferred_name: String,
}

impl NewProfile {
    /// Attach a store-assigned id.
    #[must_use]
    pub fn into_profile(self, id: String) -> Profile {
        Profile {
            id,
            user_id: self.user_id,
            preferred_name: self.preferred_name,
        }
    }
}

/// Body of `PUT /profiles/{userId}`. Absent and `null` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_name: Option<String>,
}

impl ProfileUpdate {
    /// True when the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preferred_name.is_none()
    }

    /// Apply the present fields to `profile`.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(name) = &self.preferred_name {
            profile.preferred_name.clone_from(name);
        }
    }
}
