use mongodb::bson::doc;
use mongodb::{Client, Collection};
use uuid::Uuid;

use crate::dbs::mongo::models::MongoUser;
use crate::error::{PersistError, Result};
use crate::models::User;

#[derive(Clone)]
pub struct UserRepository {
    collection: Collection<MongoUser>,
}

impl UserRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("users");
        Self { collection }
    }

    pub async fn find(&self, user_id: Uuid) -> Result<Option<MongoUser>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": user_id.to_string() })
            .await?)
    }

    /// Duplicate `(slug, email)` pairs are rejected by the unique index.
    pub async fn insert(&self, user: User) -> Result<()> {
        let row = MongoUser {
            id: user.id.to_string(),
            email_lower: user.email.to_lowercase(),
            slug: user.slug,
            email: user.email,
            display_name: user.display_name,
            pfp_url: user.pfp_url,
            is_admin: user.is_admin,
        };
        match self.collection.insert_one(&row).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(PersistError::Conflict(format!(
                "email {} already used in {}",
                row.email, row.slug
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        ErrorKind::Command(e) => e.code == 11000,
        _ => false,
    }
}
