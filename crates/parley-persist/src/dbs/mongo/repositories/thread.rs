use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Client, ClientSession, Collection};
use uuid::Uuid;

use crate::dbs::mongo::models::{to_bson_datetime, MongoThread};
use crate::error::Result;
use crate::models::ThreadQuery;

#[derive(Clone)]
pub struct ThreadRepository {
    collection: Collection<MongoThread>,
}

fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl ThreadRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("threads");
        Self { collection }
    }

    /// Newest first
    pub async fn list(&self, user_id: Uuid, query: &ThreadQuery) -> Result<Vec<MongoThread>> {
        let mut filter = doc! { "user_id": user_id.to_string() };
        if let Some(cursor) = query.cursor {
            // Hyphenated lowercase ids compare as strings the way the uuids do
            let at = to_bson_datetime(cursor.created_at);
            filter.insert(
                "$or",
                vec![
                    doc! { "created_at": { "$lt": at } },
                    doc! { "created_at": at, "_id": { "$lt": cursor.id.to_string() } },
                ],
            );
        }
        if let Some(search) = &query.search {
            filter.insert(
                "title",
                doc! { "$regex": escape_regex(search), "$options": "i" },
            );
        }

        let threads = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1, "_id": -1 })
            .limit(query.limit.max(0))
            .await?
            .try_collect()
            .await?;
        Ok(threads)
    }

    pub async fn rename(&self, thread_id: Uuid, user_id: Uuid, title: &str) -> Result<Option<MongoThread>> {
        Ok(self
            .collection
            .find_one_and_update(
                doc! { "_id": thread_id.to_string(), "user_id": user_id.to_string() },
                doc! { "$set": { "title": title } },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    /// Tenant and optional owner predicate
    pub fn authorized(thread_id: Uuid, slug: &str, user_id: Option<Uuid>) -> Document {
        let mut filter = doc! { "_id": thread_id.to_string(), "slug": slug };
        if let Some(user_id) = user_id {
            filter.insert("user_id", user_id.to_string());
        }
        filter
    }

    pub async fn find_authorized(&self, filter: Document, session: &mut ClientSession) -> Result<Option<MongoThread>> {
        Ok(self.collection.find_one(filter).session(&mut *session).await?)
    }

    /// Claims the thread for this transaction. A concurrent commit on the
    /// same thread fails with a transient write conflict.
    pub async fn bump_revision(&self, thread_id: Uuid, session: &mut ClientSession) -> Result<()> {
        self.collection
            .update_one(doc! { "_id": thread_id.to_string() }, doc! { "$inc": { "revision": 1 } })
            .session(&mut *session)
            .await?;
        Ok(())
    }

    pub async fn insert(&self, thread: &MongoThread, session: &mut ClientSession) -> Result<()> {
        self.collection.insert_one(thread).session(&mut *session).await?;
        Ok(())
    }

    /// Ids among `thread_ids` owned by `user_id`, removed in the same session.
    pub async fn delete_owned(
        &self,
        thread_ids: &[Uuid],
        user_id: Uuid,
        session: &mut ClientSession,
    ) -> Result<Vec<String>> {
        let ids: Vec<String> = thread_ids.iter().map(Uuid::to_string).collect();
        let filter = doc! { "_id": { "$in": ids }, "user_id": user_id.to_string() };

        let owned: Vec<MongoThread> = self
            .collection
            .find(filter.clone())
            .session(&mut *session)
            .await?
            .stream(&mut *session)
            .try_collect()
            .await?;
        if owned.is_empty() {
            return Ok(Vec::new());
        }

        self.collection.delete_many(filter).session(&mut *session).await?;
        Ok(owned.into_iter().map(|t| t.id).collect())
    }
}
