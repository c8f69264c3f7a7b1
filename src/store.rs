use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, doc};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ImageRecord, NewImageRecord};

const DEFAULT_DATABASE: &str = "image_gallery";
const COLLECTION: &str = "images";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Persistent collection of image records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, StoreError>;

    /// All records, most recent upload first.
    async fn find_all_sorted(&self) -> Result<Vec<ImageRecord>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ImageRecord>, StoreError>;

    async fn find_by_filename(&self, filename: &str) -> Result<Option<ImageRecord>, StoreError>;

    /// Returns whether a record was actually removed.
    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError>;
}

/// BSON shape of one image document.
#[derive(Debug, Serialize, Deserialize)]
struct ImageDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    filename: String,
    #[serde(rename = "originalName")]
    original_name: String,
    mimetype: String,
    size: i64,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_id: Option<String>,
    #[serde(rename = "uploadDate")]
    upload_date: bson::DateTime,
}

impl ImageDoc {
    fn from_new(record: NewImageRecord) -> Self {
        Self {
            id: None,
            filename: record.filename,
            original_name: record.original_name,
            mimetype: record.mimetype,
            size: record.size as i64,
            path: record.path,
            public_id: record.public_id,
            upload_date: bson::DateTime::from_millis(record.upload_date.timestamp_millis()),
        }
    }

    fn into_record(self) -> ImageRecord {
        ImageRecord {
            id: self.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            filename: self.filename,
            original_name: self.original_name,
            mimetype: self.mimetype,
            size: self.size.max(0) as u64,
            path: self.path,
            public_id: self.public_id,
            upload_date: chrono::DateTime::<chrono::Utc>::from_timestamp_millis(
                self.upload_date.timestamp_millis(),
            )
            .unwrap_or_default(),
        }
    }
}

/// MongoDB-backed metadata store.
pub struct MongoStore {
    collection: Collection<ImageDoc>,
}

impl MongoStore {
    /// Connect and ping, so a bad connection string fails at startup
    /// instead of on the first request.
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        database.run_command(doc! { "ping": 1 }).await?;
        Ok(Self {
            collection: database.collection(COLLECTION),
        })
    }
}

#[async_trait]
impl MetadataStore for MongoStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, StoreError> {
        let mut doc = ImageDoc::from_new(record);
        let result = self.collection.insert_one(&doc).await?;
        doc.id = result.inserted_id.as_object_id();
        Ok(doc.into_record())
    }

    async fn find_all_sorted(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let cursor = self
            .collection
            .find(doc! {})
            .sort(doc! { "uploadDate": -1 })
            .await?;
        let docs: Vec<ImageDoc> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(ImageDoc::into_record).collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ImageRecord>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let found = self.collection.find_one(doc! { "_id": oid }).await?;
        Ok(found.map(ImageDoc::into_record))
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<ImageRecord>, StoreError> {
        let found = self
            .collection
            .find_one(doc! { "filename": filename })
            .await?;
        Ok(found.map(ImageDoc::into_record))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(false);
        };
        let result = self.collection.delete_one(doc! { "_id": oid }).await?;
        Ok(result.deleted_count > 0)
    }
}

/// In-memory store for isolated tests and fake-backend runs.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ImageRecord>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n:024x}")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ImageRecord>> {
        self.records.lock().expect("memory store lock poisoned")
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, StoreError> {
        let record = ImageRecord {
            id: self.assign_id(),
            filename: record.filename,
            original_name: record.original_name,
            mimetype: record.mimetype,
            size: record.size,
            path: record.path,
            public_id: record.public_id,
            upload_date: record.upload_date,
        };
        self.lock().push(record.clone());
        Ok(record)
    }

    async fn find_all_sorted(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let mut records = self.lock().clone();
        records.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        Ok(records)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.lock().iter().find(|record| record.id == id).cloned())
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .find(|record| record.filename == filename)
            .cloned())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|record| record.id != id);
        Ok(records.len() < before)
    }
}
