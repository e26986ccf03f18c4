use std::path::{Path, PathBuf};

use crate::common::UploadError;
use crate::utils::validate_upload_name;

/// A local CSV file checked and ready to upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

impl UploadFile {
    /// Fail fast on anything the server would reject, before any network call
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| UploadError::InvalidInput(format!("file not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(UploadError::InvalidInput(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UploadError::InvalidInput(format!("unusable file name: {}", path.display()))
            })?
            .to_string();
        validate_upload_name(&file_name)
            .map_err(|e| UploadError::InvalidInput(format!("{}: {}", file_name, e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size: metadata.len(),
        })
    }
}
