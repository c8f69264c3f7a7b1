use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded image as persisted in the metadata store.
///
/// `public_id` is the media-host deletion handle; records created before
/// that field existed carry `None` and fall back to deriving the handle
/// from `path` at delete time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub filename: String,
    #[serde(rename = "originalName")]
    pub original_name: String,
    pub mimetype: String,
    pub size: u64,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(rename = "uploadDate")]
    pub upload_date: DateTime<Utc>,
}

/// Insert payload for the metadata store; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: u64,
    pub path: String,
    pub public_id: Option<String>,
    pub upload_date: DateTime<Utc>,
}

/// Response row for list/upload endpoints: the record annotated with a
/// `url` field mirroring `path`.
#[derive(Debug, Serialize)]
pub struct ImageView {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub url: String,
}

impl From<ImageRecord> for ImageView {
    fn from(record: ImageRecord) -> Self {
        let url = record.path.clone();
        Self { record, url }
    }
}
