//! File sources, data URIs and the output cache

pub mod cache;
pub mod data_uri;
pub mod resolver;

pub use cache::{CachedFile, OutputCache};
pub use resolver::{
    resolve_base64, resolve_cache, resolve_data_uri, resolve_path, resolve_url, FileSource,
    ResolvedFile,
};
