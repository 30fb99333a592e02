use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};

use crate::dbs::mongo::models::MongoTenant;
use crate::error::{PersistError, Result};
use crate::models::{Tenant, Usage};

#[derive(Clone)]
pub struct TenantRepository {
    collection: Collection<MongoTenant>,
}

impl TenantRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("tenants");
        Self { collection }
    }

    pub async fn get_usage(&self, slug: &str) -> Result<Option<Usage>> {
        let tenant = self.collection.find_one(doc! { "_id": slug }).await?;
        Ok(tenant.map(|t| t.usage()))
    }

    /// Increment guarded in the filter; the collection validator backs it up.
    pub async fn increment(&self, slug: &str) -> Result<Usage> {
        let updated = self
            .collection
            .find_one_and_update(
                doc! {
                    "_id": slug,
                    "$expr": { "$lt": ["$used_messages", "$message_limit"] },
                },
                doc! { "$inc": { "used_messages": 1_i64 } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(tenant) => Ok(tenant.usage()),
            None if self.get_usage(slug).await?.is_some() => Err(PersistError::ConstraintViolation(
                format!("used_messages would exceed message_limit for {}", slug),
            )),
            None => Err(PersistError::not_found(format!("tenant {}", slug))),
        }
    }

    pub async fn upsert(&self, tenant: Tenant) -> Result<()> {
        let row = MongoTenant {
            slug: tenant.slug,
            display_name: tenant.display_name,
            message_limit: tenant.message_limit,
            used_messages: tenant.used_messages,
        };
        self.collection
            .replace_one(doc! { "_id": row.slug.as_str() }, &row)
            .upsert(true)
            .await?;
        Ok(())
    }
}
