use std::sync::Arc;

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::media::MediaHost;
use crate::model::{ImageRecord, NewImageRecord};
use crate::store::MetadataStore;

/// Multipart field name the client uploads files under.
pub const UPLOAD_FIELD: &str = "images";
pub const MAX_FILES_PER_UPLOAD: usize = 10;
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
/// Route-level body cap: a full batch plus form overhead.
pub const UPLOAD_BODY_LIMIT: usize = MAX_FILES_PER_UPLOAD * MAX_FILE_SIZE + 1024 * 1024;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];
const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// One file as received from the multipart body, before any transfer.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mimetype: String,
    pub bytes: Bytes,
}

/// Drain the multipart body into memory, keeping only the upload field.
/// Empty parts (a file input submitted with no selection) are skipped.
pub async fn collect_files(mut multipart: Multipart) -> Result<Vec<IncomingFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("unnamed").to_string();
        let mimetype = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            continue;
        }
        files.push(IncomingFile {
            original_name,
            mimetype,
            bytes,
        });
    }
    Ok(files)
}

/// Admission control for one upload batch. Any violation rejects the
/// whole batch before a single byte reaches the media host.
pub fn validate_batch(files: &[IncomingFile]) -> Result<(), ApiError> {
    if files.is_empty() {
        return Err(ApiError::EmptyUpload);
    }
    if files.len() > MAX_FILES_PER_UPLOAD {
        return Err(ApiError::TooManyFiles);
    }
    for file in files {
        if !is_allowed_type(file) {
            return Err(ApiError::UnsupportedFileType {
                name: file.original_name.clone(),
            });
        }
        if file.bytes.len() > MAX_FILE_SIZE {
            return Err(ApiError::FileTooLarge {
                name: file.original_name.clone(),
            });
        }
    }
    Ok(())
}

/// Upload every file and persist one record each. Transfers run
/// concurrently; the first hard failure aborts the batch, and files
/// already stored by then are not rolled back.
pub async fn run(
    media: &Arc<dyn MediaHost>,
    store: &Arc<dyn MetadataStore>,
    files: Vec<IncomingFile>,
) -> Result<Vec<ImageRecord>, ApiError> {
    let tasks = files.into_iter().enumerate().map(|(index, file)| {
        let media = Arc::clone(media);
        let store = Arc::clone(store);
        async move {
            let uploaded_at = Utc::now();
            let name = storage_name(&file, index, uploaded_at);
            let stored = media
                .upload(&name, &file.mimetype, file.bytes.clone())
                .await?;
            let record = store
                .insert(NewImageRecord {
                    filename: name,
                    original_name: file.original_name,
                    mimetype: file.mimetype,
                    size: file.bytes.len() as u64,
                    path: stored.url,
                    public_id: Some(stored.public_id),
                    upload_date: uploaded_at,
                })
                .await?;
            Ok::<ImageRecord, ApiError>(record)
        }
    });
    future::try_join_all(tasks).await
}

/// Collision-free storage name: upload timestamp plus a fingerprint of
/// the batch slot and original file.
pub fn storage_name(file: &IncomingFile, index: usize, at: DateTime<Utc>) -> String {
    let ext = extension_of(&file.original_name).unwrap_or_else(|| "bin".to_string());
    let stamp = at.timestamp_millis();
    let hash = fingerprint(&format!(
        "{stamp}:{index}:{}:{}",
        file.original_name,
        file.bytes.len()
    ));
    format!("img-{stamp}-{}.{ext}", &hash[..12])
}

fn is_allowed_type(file: &IncomingFile) -> bool {
    let extension_ok = extension_of(&file.original_name)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);
    let mime_ok = ALLOWED_MIME_TYPES.contains(&file.mimetype.to_lowercase().as_str());
    extension_ok && mime_ok
}

fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let trimmed = ext.trim();
    if trimmed.is_empty() || trimmed == file_name {
        return None;
    }
    Some(trimmed.to_lowercase())
}

fn fingerprint(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mimetype: &str, len: usize) -> IncomingFile {
        IncomingFile {
            original_name: name.to_string(),
            mimetype: mimetype.to_string(),
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn accepts_a_valid_batch() {
        let files = vec![
            file("cat.png", "image/png", 512),
            file("dog.JPG", "image/jpeg", 2048),
        ];
        assert!(validate_batch(&files).is_ok());
    }

    #[test]
    fn rejects_an_empty_batch() {
        assert!(matches!(validate_batch(&[]), Err(ApiError::EmptyUpload)));
    }

    #[test]
    fn rejects_more_than_the_file_cap() {
        let files: Vec<IncomingFile> = (0..MAX_FILES_PER_UPLOAD + 1)
            .map(|i| file(&format!("f{i}.png"), "image/png", 16))
            .collect();
        assert!(matches!(
            validate_batch(&files),
            Err(ApiError::TooManyFiles)
        ));
    }

    #[test]
    fn rejects_disallowed_extension_even_with_image_mime() {
        let files = vec![file("notes.txt", "image/png", 16)];
        assert!(matches!(
            validate_batch(&files),
            Err(ApiError::UnsupportedFileType { .. })
        ));
    }

    #[test]
    fn rejects_non_image_declared_mime() {
        let files = vec![file("sneaky.png", "text/plain", 16)];
        assert!(matches!(
            validate_batch(&files),
            Err(ApiError::UnsupportedFileType { .. })
        ));
    }

    #[test]
    fn one_bad_file_rejects_the_whole_batch() {
        let files = vec![
            file("fine.png", "image/png", 16),
            file("bad.exe", "application/octet-stream", 16),
        ];
        assert!(matches!(
            validate_batch(&files),
            Err(ApiError::UnsupportedFileType { .. })
        ));
    }

    #[test]
    fn rejects_oversized_file() {
        let files = vec![file("huge.png", "image/png", MAX_FILE_SIZE + 1)];
        let err = validate_batch(&files).unwrap_err();
        assert!(matches!(err, ApiError::FileTooLarge { .. }));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn storage_names_keep_the_extension_and_differ_per_slot() {
        let at = Utc::now();
        let photo = file("holiday.PNG", "image/png", 64);
        let first = storage_name(&photo, 0, at);
        let second = storage_name(&photo, 1, at);
        assert!(first.starts_with("img-"));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);
    }
}
