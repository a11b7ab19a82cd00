//! Runtime configuration for the toolkit server

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Settings for the AI form generator
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Gemini API key. Form generation is disabled without one.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Request timeout in seconds (default: 60)
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

/// Security and resource configuration for the toolkit server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories that path sources and output paths must stay within (empty: unrestricted)
    pub allowed_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Maximum size of a single input file (default: 50MB)
    pub max_upload_bytes: usize,
    /// Maximum total bytes in cache (default: 512MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cache entries (default: 100)
    pub cache_max_entries: usize,
    /// Widest image pdf_to_image will render, in pixels (default: 4000)
    pub max_render_width: u16,
    pub generator: GeneratorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
            max_upload_bytes: 50 * 1024 * 1024,    // 50MB
            cache_max_bytes: 512 * 1024 * 1024,    // 512MB
            cache_max_entries: 100,
            max_render_width: 4000,
            generator: GeneratorConfig::default(),
        }
    }
}
