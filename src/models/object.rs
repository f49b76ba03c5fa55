use bytes::Bytes;

/// Bytes of a temporary object as returned by the store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
    /// Name the server suggests for saving, usually with the staging prefix.
    pub suggested_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Preview {
    Inline { content_type: String, bytes: Bytes },
    /// The type cannot be rendered inline; the UI shows a placeholder.
    Unsupported { content_type: String },
}

#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}
