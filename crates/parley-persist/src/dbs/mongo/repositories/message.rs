use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, ClientSession, Collection};
use uuid::Uuid;

use crate::dbs::mongo::models::{to_bson_datetime, MongoMessage};
use crate::error::Result;
use crate::models::MessageQuery;

#[derive(Clone)]
pub struct MessageRepository {
    collection: Collection<MongoMessage>,
}

impl MessageRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("messages");
        Self { collection }
    }

    /// The `limit` newest rows before the cursor, returned oldest first.
    /// Authorization rides on the denormalized owner columns.
    pub async fn page(&self, thread_id: Uuid, query: &MessageQuery) -> Result<Vec<MongoMessage>> {
        let mut filter = doc! { "thread_id": thread_id.to_string(), "slug": query.slug.as_str() };
        if let Some(user_id) = query.user_id {
            filter.insert("user_id", user_id.to_string());
        }
        if let Some(cursor) = query.cursor {
            filter.insert("created_at", doc! { "$lt": to_bson_datetime(cursor) });
        }

        let mut messages: Vec<MongoMessage> = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .limit(query.limit.max(0))
            .await?
            .try_collect()
            .await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn find_owned(
        &self,
        message_id: Uuid,
        slug: &str,
        user_id: Uuid,
        session: &mut ClientSession,
    ) -> Result<Option<MongoMessage>> {
        Ok(self
            .collection
            .find_one(doc! {
                "_id": message_id.to_string(),
                "slug": slug,
                "user_id": user_id.to_string(),
            })
            .session(&mut *session)
            .await?)
    }

    pub async fn find_in_thread(
        &self,
        thread_id: Uuid,
        message_id: Uuid,
        session: &mut ClientSession,
    ) -> Result<Option<MongoMessage>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": message_id.to_string(), "thread_id": thread_id.to_string() })
            .session(&mut *session)
            .await?)
    }

    pub async fn latest(&self, thread_id: Uuid, session: &mut ClientSession) -> Result<Option<MongoMessage>> {
        Ok(self
            .collection
            .find_one(doc! { "thread_id": thread_id.to_string() })
            .sort(doc! { "created_at": -1 })
            .session(&mut *session)
            .await?)
    }

    /// Removes `edited` and everything at or after its timestamp.
    pub async fn truncate_from(
        &self,
        thread_id: Uuid,
        edited: &MongoMessage,
        session: &mut ClientSession,
    ) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! {
                "thread_id": thread_id.to_string(),
                "$or": [
                    { "_id": edited.id.as_str() },
                    { "created_at": { "$gte": edited.created_at } },
                ],
            })
            .session(&mut *session)
            .await?;
        Ok(result.deleted_count)
    }

    /// Thread rows up to and including the pivot, ascending.
    pub async fn prefix(
        &self,
        pivot: &MongoMessage,
        session: &mut ClientSession,
    ) -> Result<Vec<MongoMessage>> {
        let messages = self
            .collection
            .find(doc! {
                "thread_id": pivot.thread_id.as_str(),
                "$or": [
                    { "_id": pivot.id.as_str() },
                    { "created_at": { "$lte": pivot.created_at } },
                ],
            })
            .sort(doc! { "created_at": 1 })
            .session(&mut *session)
            .await?
            .stream(&mut *session)
            .try_collect()
            .await?;
        Ok(messages)
    }

    pub async fn insert_many(&self, messages: &[MongoMessage], session: &mut ClientSession) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        self.collection
            .insert_many(messages)
            .session(&mut *session)
            .await?;
        Ok(())
    }

    pub async fn delete_for_threads(&self, thread_ids: &[String], session: &mut ClientSession) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! { "thread_id": { "$in": thread_ids.to_vec() } })
            .session(&mut *session)
            .await?;
        Ok(result.deleted_count)
    }
}
