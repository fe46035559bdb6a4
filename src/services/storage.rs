//! Object-storage path reservation.
//!
//! Bytes are uploaded by the client straight to the bucket; this module only
//! decides where they go and validates the file name.

use crate::errors::ServiceError;
use serde::Serialize;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

const MAX_FILE_NAME: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum StorageCategory {
    #[strum(serialize = "purchase-orders")]
    PurchaseOrders,
    #[strum(serialize = "receipts")]
    Receipts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StorageLocation {
    pub bucket: String,
    pub path: String,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// Maps every character outside `[A-Za-z0-9._-]` to `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn check_file_name(name: &str) -> Result<&str, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid_field("file_name", "file name is required"));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(ServiceError::invalid_field(
            "file_name",
            "file name must not contain path separators",
        ));
    }
    if name.chars().count() > MAX_FILE_NAME {
        return Err(ServiceError::invalid_field("file_name", "file name is too long"));
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct StorageService {
    bucket: String,
}

impl StorageService {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self { bucket: bucket.into() }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `{user_id}/{category}/{uuid}_{sanitized}`
    pub fn reserve(
        &self,
        user_id: Uuid,
        category: StorageCategory,
        file_name: &str,
    ) -> Result<StorageLocation, ServiceError> {
        let name = sanitize_file_name(check_file_name(file_name)?);
        Ok(StorageLocation {
            bucket: self.bucket.clone(),
            path: format!("{}/{}/{}_{}", user_id, category, Uuid::new_v4(), name),
        })
    }

    /// Like [`reserve`](Self::reserve) but the name must carry a `.pdf` extension.
    pub fn reserve_pdf(
        &self,
        user_id: Uuid,
        category: StorageCategory,
        file_name: &str,
    ) -> Result<StorageLocation, ServiceError> {
        if !file_name.trim().to_ascii_lowercase().ends_with(".pdf") {
            return Err(ServiceError::invalid_field("file_name", "only PDF documents are accepted"));
        }
        self.reserve(user_id, category, file_name)
    }
}
