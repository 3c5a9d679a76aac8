//! MongoDB profile backend.
//!
//! Profiles live in one collection with a unique index on `userId`, so the
//! database itself rejects a second document for the same identity
//! (duplicate-key error 11000, reported as [`StoreError::Conflict`]).

use mongodb::bson::{self, Document, doc, oid::ObjectId};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ProfileBackend, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::profiles::{NewProfile, Profile, ProfileUpdate};

const DUPLICATE_KEY: i32 = 11000;

/// Stored shape of a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    user_id: String,
    #[serde(default)]
    preferred_name: String,
}

impl ProfileDocument {
    fn into_profile(self) -> Profile {
        Profile {
            id: self.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            user_id: self.user_id,
            preferred_name: self.preferred_name,
        }
    }
}

/// Profiles stored in a MongoDB collection.
pub struct MongoBackend {
    client: Client,
    collection: Collection<ProfileDocument>,
}

impl MongoBackend {
    /// Connect using `config` and ensure the unique `userId` index exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the URI is invalid or the index
    /// cannot be created.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(&config.uri).await.map_err(backend_error)?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());

        let client = Client::with_options(options).map_err(backend_error)?;
        let collection = client
            .database(&config.database)
            .collection::<ProfileDocument>(&config.collection);

        let index = IndexModel::builder()
            .keys(doc! { "userId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection.create_index(index).await.map_err(backend_error)?;

        info!(
            database = %config.database,
            collection = %config.collection,
            "Connected to MongoDB"
        );
        Ok(Self { client, collection })
    }

    fn filter(user_id: &str) -> Document {
        doc! { "userId": user_id }
    }
}

#[async_trait::async_trait]
impl ProfileBackend for MongoBackend {
    async fn insert(&self, profile: NewProfile) -> StoreResult<Profile> {
        let document = ProfileDocument {
            id: None,
            user_id: profile.user_id,
            preferred_name: profile.preferred_name,
        };

        let result = self
            .collection
            .insert_one(&document)
            .await
            .map_err(classify_write_error)?;

        let id = match result.inserted_id {
            bson::Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };
        debug!(user_id = %document.user_id, %id, "Inserted profile");

        Ok(Profile {
            id,
            user_id: document.user_id,
            preferred_name: document.preferred_name,
        })
    }

    async fn find(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        let found = self
            .collection
            .find_one(Self::filter(user_id))
            .await
            .map_err(backend_error)?;
        Ok(found.map(ProfileDocument::into_profile))
    }

    async fn update(&self, user_id: &str, update: &ProfileUpdate) -> StoreResult<bool> {
        let mut set = Document::new();
        if let Some(name) = &update.preferred_name {
            set.insert("preferredName", name.as_str());
        }

        let result = self
            .collection
            .update_one(Self::filter(user_id), doc! { "$set": set })
            .await
            .map_err(backend_error)?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        let result = self
            .collection
            .delete_one(Self::filter(user_id))
            .await
            .map_err(backend_error)?;
        Ok(result.deleted_count > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB client closed");
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}

fn backend_error(err: mongodb::error::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn classify_write_error(err: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Conflict("profile with this userId already exists".to_string())
    } else {
        backend_error(err)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        _ => false,
    }
}
