use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use super::filename::extension_of;

/// Per-form file rules. The extension list is supplied by the caller (an
/// employee-document category, for example, carries its own list). An empty
/// list accepts any extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileRules {
    pub max_file_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

impl FileRules {
    pub fn new<I, S>(max_file_size_bytes: u64, allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            max_file_size_bytes,
            allowed_extensions: normalize_extensions(allowed_extensions),
        }
    }

    pub fn allows_extension(&self, extension: Option<&str>) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        match extension {
            Some(ext) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Lowercases and strips leading dots so ".PDF" and "pdf" compare equal.
/// Duplicates are dropped, first occurrence wins.
pub fn normalize_extensions<I, S>(extensions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for extension in extensions {
        let extension = extension.as_ref().trim().trim_start_matches('.').to_lowercase();
        if !extension.is_empty() && !normalized.contains(&extension) {
            normalized.push(extension);
        }
    }
    normalized
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File '{file_name}' has a type that is not allowed. Allowed types: {}", .allowed.join(", "))]
    InvalidFileType {
        file_name: String,
        allowed: Vec<String>,
    },

    #[error("File size {size} bytes exceeds maximum allowed {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("{0}")]
    InvalidFileName(String),
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError::FileTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

pub fn validate_extension(file_name: &str, rules: &FileRules) -> Result<(), ValidationError> {
    let extension = extension_of(file_name);
    if rules.allows_extension(extension.as_deref()) {
        return Ok(());
    }
    Err(ValidationError::InvalidFileType {
        file_name: file_name.to_string(),
        allowed: rules.allowed_extensions.clone(),
    })
}

/// Sanitizes filename to prevent path traversal and injection attacks
/// Returns the sanitized filename or an error if the name is invalid
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Browsers on Windows may hand over a full path
    let last_component = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let name = Path::new(last_component)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim();

    if name.is_empty() {
        return Err(ValidationError::InvalidFileName(
            "Filename cannot be empty".to_string(),
        ));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(ValidationError::InvalidFileName(
            "Hidden files (starting with '.') are not allowed".to_string(),
        ));
    }

    Ok(sanitized)
}

/// Local pre-upload check. Returns the sanitized file name.
pub fn validate_local_file(
    filename: &str,
    size: u64,
    rules: &FileRules,
) -> Result<String, ValidationError> {
    // 1. Size check
    validate_file_size(size, rules.max_file_size_bytes)?;

    // 2. Sanitize filename
    let sanitized = sanitize_filename(filename)?;

    // 3. Extension allowlist
    validate_extension(&sanitized, rules)?;

    Ok(sanitized)
}
