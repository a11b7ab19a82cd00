//! PDF Toolkit MCP Server - Entry point

use clap::Parser;
use pdf_toolkit_mcp::{run_server_with_config, GeneratorConfig, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdf-toolkit-mcp")]
#[command(about = "MCP server for merging, splitting, compressing, securing and converting PDFs, and for AI fillable forms")]
struct Cli {
    /// Directories that input paths and output paths must stay within (comma separated)
    #[arg(long, env = "PDF_TOOLKIT_ALLOWED_DIRS", value_delimiter = ',')]
    allowed_dirs: Vec<String>,

    /// Allow URL sources that resolve to private or reserved addresses
    #[arg(long, env = "PDF_TOOLKIT_ALLOW_PRIVATE_URLS")]
    allow_private_urls: bool,

    /// Maximum download size for URL sources, in bytes
    #[arg(long, env = "PDF_TOOLKIT_MAX_DOWNLOAD_BYTES", default_value_t = 100 * 1024 * 1024)]
    max_download_bytes: u64,

    /// Maximum size of a single input file, in bytes
    #[arg(long, env = "PDF_TOOLKIT_MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Maximum total bytes kept in the output cache
    #[arg(long, env = "PDF_TOOLKIT_CACHE_MAX_BYTES", default_value_t = 512 * 1024 * 1024)]
    cache_max_bytes: usize,

    /// Maximum number of outputs kept in the cache
    #[arg(long, env = "PDF_TOOLKIT_CACHE_MAX_ENTRIES", default_value_t = 100)]
    cache_max_entries: usize,

    /// Widest image pdf_to_image will render, in pixels
    #[arg(long, env = "PDF_TOOLKIT_MAX_RENDER_WIDTH", default_value_t = 4000)]
    max_render_width: u16,

    /// Gemini API key; form generation is disabled without one
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Gemini model used for form generation
    #[arg(long, env = "GEMINI_MODEL", default_value = pdf_toolkit_mcp::config::DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_BASE_URL", default_value = pdf_toolkit_mcp::config::DEFAULT_GEMINI_BASE_URL)]
    gemini_base_url: String,

    /// Timeout for form generation requests, in seconds
    #[arg(long, env = "GEMINI_TIMEOUT_SECS", default_value_t = 60)]
    gemini_timeout_secs: u64,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            allowed_dirs: cli.allowed_dirs,
            allow_private_urls: cli.allow_private_urls,
            max_download_bytes: cli.max_download_bytes,
            max_upload_bytes: cli.max_upload_bytes,
            cache_max_bytes: cli.cache_max_bytes,
            cache_max_entries: cli.cache_max_entries,
            max_render_width: cli.max_render_width,
            generator: GeneratorConfig {
                api_key: cli.gemini_api_key,
                model: cli.gemini_model,
                base_url: cli.gemini_base_url,
                timeout_secs: cli.gemini_timeout_secs,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // stdout carries the protocol, log to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_toolkit_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::from(cli);
    tracing::info!(
        allowed_dirs = ?config.allowed_dirs,
        form_generation = config.generator.api_key.is_some(),
        "Starting PDF Toolkit MCP Server"
    );

    run_server_with_config(config).await
}
