pub mod validation;

pub use validation::{validate_upload_name, ValidationError};
