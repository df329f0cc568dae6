use std::env;
use std::path::PathBuf;

/// Service configuration for the ticket generator
#[derive(Debug, Clone)]
pub struct TicketConfig {
    /// Maximum size per uploaded image in bytes (default: 2 MiB)
    pub max_upload_size: usize,

    /// Directory where sanitized uploads land until the PDF is emitted.
    /// Must not be reachable through public document serving.
    pub temp_dir: PathBuf,

    /// Static watermark image stamped on every ticket
    pub watermark_path: PathBuf,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 2 * 1024 * 1024, // 2 MiB
            temp_dir: std::env::temp_dir().join("ticketera-uploads"),
            watermark_path: PathBuf::from("assets/watermark.png"),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl TicketConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            temp_dir: env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.temp_dir),

            watermark_path: env::var("WATERMARK_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.watermark_path),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }
}
