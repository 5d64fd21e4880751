use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;

/// File name given to frames rasterized from the camera
pub const CAPTURED_FILE_NAME: &str = "captured-image.png";

/// Unique identity of an image blob, used to correlate analysis responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(Uuid);

impl BlobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an image came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSource {
    /// Selected or dropped file
    Upload { file_name: String },
    /// Frame rasterized from a live camera stream
    Capture { width: u32, height: u32 },
}

impl ImageSource {
    pub fn file_name(&self) -> &str {
        match self {
            ImageSource::Upload { file_name } => file_name,
            ImageSource::Capture { .. } => CAPTURED_FILE_NAME,
        }
    }
}

/// Metadata the validator and state machine work from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub id: BlobId,
    pub media_type: String,
    pub size: u64,
    pub source: ImageSource,
}

/// Candidate image payload with its declared media type
#[derive(Debug, Clone)]
pub struct ImageBlob {
    id: BlobId,
    data: Bytes,
    media_type: String,
    source: ImageSource,
    created_at: DateTime<Utc>,
}

impl ImageBlob {
    /// Create a blob from an upload; the media type is what the picker declared
    pub fn from_upload(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self::new(
            ImageSource::Upload {
                file_name: file_name.into(),
            },
            media_type.into(),
            data.into(),
        )
    }

    /// Create a blob from an encoded camera frame
    pub fn from_capture(width: u32, height: u32, png: Vec<u8>) -> Self {
        Self::new(
            ImageSource::Capture { width, height },
            "image/png".to_string(),
            Bytes::from(png),
        )
    }

    /// Read a file from disk, declaring its media type from the extension the
    /// way a browser file picker does
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let media_type = media_type_for_path(path);

        Ok(Self::from_upload(file_name, media_type, data))
    }

    fn new(source: ImageSource, media_type: String, data: Bytes) -> Self {
        Self {
            id: BlobId::new(),
            data,
            media_type,
            source,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> BlobId {
        self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn file_name(&self) -> &str {
        self.source.file_name()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn meta(&self) -> BlobMeta {
        BlobMeta {
            id: self.id,
            media_type: self.media_type.clone(),
            size: self.size(),
            source: self.source.clone(),
        }
    }
}

/// Media type a file picker would declare for this path
pub fn media_type_for_path(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}
