use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use url::Url;

use crate::config::MediaConfig;
use crate::upload::ALLOWED_EXTENSIONS;

const CLOUDINARY_API_ROOT: &str = "https://api.cloudinary.com/v1_1";

/// Size-bounding transform applied by the media host at store time:
/// caps each dimension, preserves aspect ratio, never upscales.
const UPLOAD_TRANSFORMATION: &str = "c_limit,h_1600,w_1600";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media host request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("media host rejected the request: status {status}: {message}")]
    Api { status: u16, message: String },
}

/// What the media host hands back for a stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub url: String,
    pub public_id: String,
}

/// External object storage for image bytes.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Store `bytes` under the host's folder namespace and return the
    /// public URL plus the deletion handle.
    async fn upload(
        &self,
        storage_name: &str,
        mimetype: &str,
        bytes: Bytes,
    ) -> Result<StoredObject, MediaError>;

    /// Remove a previously stored object by its deletion handle.
    async fn destroy(&self, public_id: &str) -> Result<(), MediaError>;

    /// Derive a deletion handle from a delivery URL. Compatibility shim
    /// for records created before `public_id` was persisted.
    fn legacy_public_id(&self, path: &str) -> Option<String>;
}

/// Cloudinary-backed media host.
pub struct Cloudinary {
    client: Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

impl Cloudinary {
    pub fn new(credentials: MediaConfig, folder: String) -> Self {
        Self {
            client: Client::new(),
            cloud_name: credentials.cloud_name,
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
            folder,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{CLOUDINARY_API_ROOT}/{}/image/{action}", self.cloud_name)
    }
}

#[derive(Debug, Deserialize)]
struct UploadApiResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyApiResponse {
    result: Option<String>,
}

#[async_trait]
impl MediaHost for Cloudinary {
    async fn upload(
        &self,
        storage_name: &str,
        mimetype: &str,
        bytes: Bytes,
    ) -> Result<StoredObject, MediaError> {
        // The host appends the delivered format itself, so the signed
        // public_id is the storage name without its extension.
        let stem = file_stem(storage_name);
        let allowed_formats = ALLOWED_EXTENSIONS.join(",");
        let timestamp = Utc::now().timestamp().to_string();
        let signature = api_signature(
            &[
                ("allowed_formats", &allowed_formats),
                ("folder", &self.folder),
                ("public_id", stem),
                ("timestamp", &timestamp),
                ("transformation", UPLOAD_TRANSFORMATION),
            ],
            &self.api_secret,
        );

        let file = Part::stream(bytes)
            .file_name(storage_name.to_string())
            .mime_str(mimetype)?;
        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("folder", self.folder.clone())
            .text("public_id", stem.to_string())
            .text("allowed_formats", allowed_formats)
            .text("transformation", UPLOAD_TRANSFORMATION)
            .part("file", file);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        let response = assert_ok(response).await?;
        let payload: UploadApiResponse = response.json().await?;

        Ok(StoredObject {
            url: payload.secure_url,
            public_id: payload.public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = api_signature(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &self.api_secret,
        );
        let form = Form::new()
            .text("public_id", public_id.to_string())
            .text("timestamp", timestamp)
            .text("api_key", self.api_key.clone())
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .multipart(form)
            .send()
            .await?;
        let response = assert_ok(response).await?;
        let payload: DestroyApiResponse = response.json().await?;

        match payload.result.as_deref() {
            Some("ok") => Ok(()),
            other => Err(MediaError::Api {
                status: 200,
                message: format!("destroy returned {:?}", other.unwrap_or("no result")),
            }),
        }
    }

    fn legacy_public_id(&self, path: &str) -> Option<String> {
        let parsed = Url::parse(path).ok()?;
        let last = parsed
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .next_back()?;
        let stem = file_stem(last);
        if stem.is_empty() {
            return None;
        }
        if self.folder.is_empty() {
            Some(stem.to_string())
        } else {
            Some(format!("{}/{stem}", self.folder))
        }
    }
}

fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

async fn assert_ok(response: reqwest::Response) -> Result<reqwest::Response, MediaError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(MediaError::Api { status, message })
}

/// Hex SHA-1 over the sorted `key=value` pairs joined with `&`, with the
/// API secret appended. Empty values are excluded from signing.
fn api_signature(params: &[(&str, &str)], secret: &str) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    pairs.sort();
    let payload = format!("{}{secret}", pairs.join("&"));
    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(folder: &str) -> Cloudinary {
        Cloudinary::new(
            MediaConfig {
                cloud_name: "demo".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
            folder.to_string(),
        )
    }

    #[test]
    fn signature_is_hex_sha1_sized() {
        let signature = api_signature(&[("public_id", "a"), ("timestamp", "1")], "s");
        assert_eq!(signature.len(), 40);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_ignores_parameter_order() {
        let forward = api_signature(&[("folder", "g"), ("timestamp", "1")], "s");
        let reversed = api_signature(&[("timestamp", "1"), ("folder", "g")], "s");
        assert_eq!(forward, reversed);
    }

    #[test]
    fn signature_skips_empty_values() {
        let with_blank = api_signature(&[("folder", ""), ("timestamp", "1")], "s");
        let without = api_signature(&[("timestamp", "1")], "s");
        assert_eq!(with_blank, without);
    }

    #[test]
    fn signature_depends_on_secret() {
        let a = api_signature(&[("timestamp", "1")], "one");
        let b = api_signature(&[("timestamp", "1")], "two");
        assert_ne!(a, b);
    }

    #[test]
    fn legacy_handle_strips_extension_and_prefixes_folder() {
        let derived = host("gallery").legacy_public_id(
            "https://res.cloudinary.com/demo/image/upload/v1700000000/gallery/img-1700-abcdef.jpg",
        );
        assert_eq!(derived.as_deref(), Some("gallery/img-1700-abcdef"));
    }

    #[test]
    fn legacy_handle_without_folder_is_the_bare_stem() {
        let derived = host("")
            .legacy_public_id("https://res.cloudinary.com/demo/image/upload/v1/img-1-ff.png");
        assert_eq!(derived.as_deref(), Some("img-1-ff"));
    }

    #[test]
    fn legacy_handle_tolerates_missing_extension() {
        let derived = host("gallery")
            .legacy_public_id("https://res.cloudinary.com/demo/image/upload/v1/gallery/img-1-ff");
        assert_eq!(derived.as_deref(), Some("gallery/img-1-ff"));
    }

    #[test]
    fn legacy_handle_rejects_unparseable_paths() {
        assert_eq!(host("gallery").legacy_public_id("not a url"), None);
    }
}
