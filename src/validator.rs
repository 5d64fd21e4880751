use crate::blob::BlobMeta;
use crate::config::ValidationConfig;
use crate::error::ValidationError;

/// Type and size policy applied to every candidate image before it is adopted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageValidator {
    accepted_types: Vec<String>,
    max_bytes: u64,
}

impl ImageValidator {
    pub fn new(accepted_types: Vec<String>, max_bytes: u64) -> Self {
        Self {
            accepted_types: accepted_types
                .into_iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.accepted_types.clone(), config.max_bytes)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check declared type first, then size. Works from metadata only.
    pub fn validate(&self, meta: &BlobMeta) -> Result<(), ValidationError> {
        let essence = meta
            .media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if !self.accepted_types.iter().any(|t| *t == essence) {
            return Err(ValidationError::InvalidType {
                media_type: meta.media_type.clone(),
            });
        }

        if meta.size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size: meta.size,
                limit: self.max_bytes,
            });
        }

        Ok(())
    }
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new(
            vec!["image/jpeg".to_string(), "image/png".to_string()],
            5 * 1024 * 1024,
        )
    }
}
