use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};
use uuid::Uuid;

use crate::dbs::mongo::models::{to_bson_datetime, MongoCredential, MongoUser};
use crate::error::{PersistError, Result};
use crate::models::credential::{normalize_scopes, scope_key};
use crate::models::{ActiveUser, NewCredential};

#[derive(Clone)]
pub struct CredentialRepository {
    collection: Collection<MongoCredential>,
}

/// Owner, tenant admin, or admin-level grantee.
fn manageable_by(user: &ActiveUser) -> Document {
    let uid = user.id.to_string();
    let mut branches = vec![
        doc! { "user_id": uid.as_str() },
        doc! { "shared_with": { "$elemMatch": { "user_id": uid.as_str(), "is_admin": true } } },
    ];
    if user.is_admin {
        branches.push(doc! { "owner_slug": user.slug.as_str() });
    }
    doc! { "$or": branches }
}

impl CredentialRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("credentials");
        Self { collection }
    }

    pub async fn find_visible(&self, user: &ActiveUser) -> Result<Vec<MongoCredential>> {
        let filter = if user.is_admin {
            doc! { "owner_slug": user.slug.as_str() }
        } else {
            let uid = user.id.to_string();
            doc! { "$or": [ { "user_id": uid.as_str() }, { "shared_with.user_id": uid.as_str() } ] }
        };

        let rows = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(rows)
    }

    /// Keyed on `(user_id, provider, scope_key)`; the record id and creation
    /// time survive a re-authorization.
    pub async fn upsert(&self, credential: NewCredential, owner: &MongoUser) -> Result<MongoCredential> {
        let scope: Vec<&str> = normalize_scopes(&credential.scope)
            .iter()
            .map(|s| s.as_str())
            .collect();
        let filter = doc! {
            "user_id": credential.user_id.to_string(),
            "provider": credential.provider.as_str(),
            "scope_key": scope_key(&credential.scope),
        };
        let update = doc! {
            "$set": {
                "owner_slug": owner.slug.as_str(),
                "owner_email": owner.email.as_str(),
                "scope": scope,
                "access_token": credential.access_token,
                "access_token_expires_at": credential.access_token_expires_at.map(to_bson_datetime),
                "refresh_token": credential.refresh_token,
                "refresh_token_expires_at": credential.refresh_token_expires_at.map(to_bson_datetime),
                "is_global": credential.is_global,
            },
            "$setOnInsert": {
                "_id": Uuid::new_v4().to_string(),
                "created_at": to_bson_datetime(Utc::now()),
                "shared_with": [],
            },
        };

        self.collection
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| PersistError::Internal("credential upsert returned nothing".to_string()))
    }

    pub async fn delete(&self, credential_id: Uuid, user: &ActiveUser) -> Result<bool> {
        let mut filter = manageable_by(user);
        filter.insert("_id", credential_id.to_string());
        let result = self.collection.delete_one(filter).await?;
        Ok(result.deleted_count > 0)
    }

    /// Updates an existing grant in place, otherwise appends one.
    pub async fn grant(
        &self,
        credential_id: Uuid,
        grantee_id: Uuid,
        is_admin: bool,
        granted_by: &ActiveUser,
    ) -> Result<bool> {
        let grantee = grantee_id.to_string();

        let mut existing = manageable_by(granted_by);
        existing.insert("_id", credential_id.to_string());
        existing.insert("shared_with.user_id", grantee.as_str());
        let updated = self
            .collection
            .update_one(existing, doc! { "$set": { "shared_with.$.is_admin": is_admin } })
            .await?;
        if updated.matched_count > 0 {
            return Ok(true);
        }

        let mut fresh = manageable_by(granted_by);
        fresh.insert("_id", credential_id.to_string());
        fresh.insert("shared_with.user_id", doc! { "$ne": grantee.as_str() });
        let pushed = self
            .collection
            .update_one(
                fresh,
                doc! { "$push": { "shared_with": { "user_id": grantee.as_str(), "is_admin": is_admin } } },
            )
            .await?;
        Ok(pushed.matched_count > 0)
    }
}
