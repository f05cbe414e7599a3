use super::UploadedFile;
use crate::utils::format_megabytes;

/// Largest accepted upload: 200 MiB.
pub const MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

pub fn validate(file: &UploadedFile) -> ValidationResult {
    validate_size(file.size())
}

/// Every rule runs; triggered messages are kept in rule order.
pub fn validate_size(size: u64) -> ValidationResult {
    let mut errors = Vec::new();

    if size > MAX_FILE_SIZE {
        errors.push(format!("File too large ({} > 200MB)", format_megabytes(size)));
    }

    if size == 0 {
        errors.push(String::from("File is empty"));
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}
