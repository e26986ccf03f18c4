use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File name contains a backslash")]
    Backslash,

    #[error("File must be a CSV")]
    NotCsv,
}

/// Validate the bare file name (`Path::file_name` output) sent in the
/// multipart `filename` field.
pub fn validate_upload_name(name: &str) -> Result<(), ValidationError> {
    // legal on unix, but servers treat it as a Windows path separator
    if name.contains('\\') {
        return Err(ValidationError::Backslash);
    }

    // server rejects anything that doesn't end in .csv
    let is_csv = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(ValidationError::NotCsv);
    }

    Ok(())
}
