use std::env;
use std::time::Duration;

use crate::utils::validation::{FileRules, normalize_extensions};

/// Limits for one upload session, supplied by the form that owns it.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 10 MB)
    pub max_file_size_bytes: u64,

    /// Accepted extensions, lowercase without dot. Empty accepts anything.
    pub allowed_extensions: Vec<String>,

    /// Cap on simultaneous uploads per session (default: unlimited)
    pub max_concurrent_uploads: Option<usize>,

    /// Upper bound for a single upload request (default: 60 s)
    pub upload_timeout: Duration,

    /// Network upload attempts allowed per file, first try included (default: 5)
    pub max_upload_attempts: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 10 * 1024 * 1024,
            allowed_extensions: normalize_extensions([
                "pdf", "doc", "docx", "xls", "xlsx", "jpg", "jpeg", "png",
            ]),
            max_concurrent_uploads: None,
            upload_timeout: Duration::from_secs(60),
            max_upload_attempts: 5,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size_bytes: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size_bytes),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| normalize_extensions(v.split(',')))
                .unwrap_or(default.allowed_extensions),

            max_concurrent_uploads: env::var("MAX_CONCURRENT_UPLOADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .or(default.max_concurrent_uploads),

            upload_timeout: env::var("UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.upload_timeout),

            max_upload_attempts: env::var("MAX_UPLOAD_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_attempts),
        }
    }

    /// Relaxed limits for local development
    pub fn development() -> Self {
        Self {
            max_file_size_bytes: 100 * 1024 * 1024,
            allowed_extensions: Vec::new(),
            max_concurrent_uploads: None,
            upload_timeout: Duration::from_secs(30),
            max_upload_attempts: 10,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size_bytes: u64) -> Self {
        self.max_file_size_bytes = max_file_size_bytes;
        self
    }

    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = normalize_extensions(extensions);
        self
    }

    pub fn rules(&self) -> FileRules {
        FileRules::new(self.max_file_size_bytes, &self.allowed_extensions)
    }
}

#[derive(Debug, Clone)]
pub struct CommitConfig {
    /// Upper bound for one create call (default: 60 s)
    pub commit_timeout: Duration,

    /// Create calls in flight at once; 1 keeps backend writes strictly ordered
    pub commit_concurrency: usize,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            commit_timeout: Duration::from_secs(60),
            commit_concurrency: 1,
        }
    }
}

impl CommitConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            commit_timeout: env::var("COMMIT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.commit_timeout),

            commit_concurrency: env::var("COMMIT_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(default.commit_concurrency),
        }
    }
}

/// Where the HTTP adapters find the backend.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl HttpClientConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            base_url: env::var("STAGED_UPLOAD_BASE_URL").unwrap_or(default.base_url),
            request_timeout: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.request_timeout),
        }
    }
}

/// Settings of the development server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Rules enforced on incoming uploads
    pub upload: UploadConfig,

    /// Staged objects older than this are swept (default: 24)
    pub staging_cleanup_age_hours: u64,

    /// How often the sweeper runs (default: 1 hour)
    pub cleanup_interval: Duration,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upload: UploadConfig::default(),
            staging_cleanup_age_hours: 24,
            cleanup_interval: Duration::from_secs(3600),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload: UploadConfig::from_env(),

            staging_cleanup_age_hours: env::var("STAGING_CLEANUP_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.staging_cleanup_age_hours),

            cleanup_interval: env::var("STAGING_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.cleanup_interval),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    pub fn development() -> Self {
        Self {
            upload: UploadConfig::development(),
            ..Self::default()
        }
    }
}
