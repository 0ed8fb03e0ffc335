//! MongoDB-backed document store

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{DocumentStore, StoreError};

/// Shares one lazily created client across every run that holds this store
pub struct MongoStore {
    uri: String,
    database_name: String,
    server_selection_timeout_ms: u64,
    database: OnceCell<Database>,
}

impl MongoStore {
    pub fn new(uri: String, database_name: &str, server_selection_timeout_ms: u64) -> Self {
        Self {
            uri,
            database_name: database_name.to_string(),
            server_selection_timeout_ms,
            database: OnceCell::new(),
        }
    }

    fn connection_uri(&self) -> String {
        let separator = if self.uri.contains('?') { '&' } else { '?' };
        format!(
            "{}{}serverSelectionTimeoutMS={}",
            self.uri, separator, self.server_selection_timeout_ms
        )
    }

    async fn database(&self) -> Result<&Database, StoreError> {
        self.database
            .get_or_try_init(|| async {
                info!("🗄️ Connecting to MongoDB database '{}'", self.database_name);
                let client = Client::with_uri_str(self.connection_uri()).await?;
                let database = client.database(&self.database_name);
                database.run_command(doc! { "ping": 1 }).await?;
                info!("✅ Connected to MongoDB database '{}'", self.database_name);
                Ok::<_, StoreError>(database)
            })
            .await
    }

    async fn collection(&self, name: &str) -> Result<Collection<Document>, StoreError> {
        Ok(self.database().await?.collection::<Document>(name))
    }
}

/// Ids that look like ObjectIds also match documents keyed by a real ObjectId
fn id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "$or": [ { "_id": id }, { "_id": oid } ] },
        Err(_) => doc! { "_id": id },
    }
}

fn to_document(id: &str, value: Value) -> Result<Document, StoreError> {
    if !value.is_object() {
        return Err(StoreError::NotAnObject);
    }
    let mut document = bson::to_document(&value)?;
    document.insert("_id", id);
    Ok(document)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError> {
        let document = to_document(id, document)?;
        self.collection(collection)
            .await?
            .replace_one(doc! { "_id": id }, document)
            .upsert(true)
            .await?;
        debug!("Upserted {}/{}", collection, id);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let found = self.collection(collection).await?.find_one(id_filter(id)).await?;
        Ok(found.map(|document| Bson::Document(document).into_relaxed_extjson()))
    }

    async fn add_to_set(&self, collection: &str, id: &str, field: &str, value: Value) -> Result<bool, StoreError> {
        let value = bson::to_bson(&value)?;
        let mut additions = Document::new();
        additions.insert(field, value);
        let update = doc! { "$addToSet": additions };

        let result = self
            .collection(collection)
            .await?
            .update_one(id_filter(id), update)
            .await?;
        Ok(result.matched_count > 0)
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}
