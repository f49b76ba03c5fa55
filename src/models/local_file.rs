use bytes::Bytes;
use std::path::Path;

use crate::utils::filename::{content_type_for_name, extension_of};

/// A file the user picked, held in memory by the controller so that a retry
/// never depends on re-reading the original input.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub bytes: Bytes,
    pub declared_mime_type: Option<String>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            declared_mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.declared_mime_type = Some(mime_type.into());
        self
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    /// Declared type first, then magic bytes, then the extension.
    pub fn mime_type(&self) -> String {
        if let Some(declared) = self
            .declared_mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != mime::APPLICATION_OCTET_STREAM.essence_str())
        {
            return declared.to_string();
        }

        if let Some(kind) = infer::get(&self.bytes) {
            return kind.mime_type().to_string();
        }

        content_type_for_name(&self.name)
    }
}
