//! Resolve a [`FileSource`] into an [`Upload`]

use crate::error::{Error, Result};
use crate::source::{data_uri, OutputCache};
use crate::upload::Upload;
use base64::Engine;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use schemars::JsonSchema;
use serde::Serialize;
use std::net::IpAddr;
use std::path::Path;

/// Where an uploaded file comes from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FileSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the file
        path: String,
    },
    /// Base64 encoded file content
    Base64 {
        /// Base64 encoded content
        base64: String,
        /// Original file name
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        /// Declared MIME type (content sniffing takes precedence)
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    /// `data:<mime>;base64,<payload>` URI, as produced by a browser file reader
    DataUri {
        /// The data URI
        data_uri: String,
        /// Original file name
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    /// URL to download the file from
    Url {
        /// URL of the file
        url: String,
    },
    /// Output of an earlier tool call
    CacheRef {
        /// Cache key returned as `output_cache_key`
        cache_key: String,
    },
}

const SOURCE_KEYS: &str = "\"path\", \"base64\", \"data_uri\", \"url\", or \"cache_key\"";

fn optional_string<E: serde::de::Error>(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> std::result::Result<Option<String>, E> {
    match obj.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(E::custom(format!("\"{}\" must be a string", key))),
    }
}

impl<'de> serde::Deserialize<'de> for FileSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let value = serde_json::Value::deserialize(deserializer)?;
        let Some(obj) = value.as_object() else {
            let kind = match &value {
                serde_json::Value::Array(_) => "an array",
                serde_json::Value::String(_) => "a string",
                serde_json::Value::Number(_) => "a number",
                serde_json::Value::Bool(_) => "a boolean",
                _ => "null",
            };
            return Err(D::Error::custom(format!(
                "Invalid source: expected an object with one of {}, but got {}",
                SOURCE_KEYS, kind
            )));
        };

        let required = |key: &str| -> std::result::Result<String, D::Error> {
            optional_string::<D::Error>(obj, key)?
                .ok_or_else(|| D::Error::custom(format!("\"{}\" must be a string", key)))
        };

        if obj.contains_key("path") {
            return Ok(FileSource::Path {
                path: required("path")?,
            });
        }
        if obj.contains_key("base64") {
            return Ok(FileSource::Base64 {
                base64: required("base64")?,
                file_name: optional_string::<D::Error>(obj, "file_name")?,
                mime_type: optional_string::<D::Error>(obj, "mime_type")?,
            });
        }
        if obj.contains_key("data_uri") {
            return Ok(FileSource::DataUri {
                data_uri: required("data_uri")?,
                file_name: optional_string::<D::Error>(obj, "file_name")?,
            });
        }
        if obj.contains_key("url") {
            return Ok(FileSource::Url {
                url: required("url")?,
            });
        }
        if obj.contains_key("cache_key") {
            return Ok(FileSource::CacheRef {
                cache_key: required("cache_key")?,
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(D::Error::custom(format!(
            "Invalid source: expected an object with one of {}, but got keys: {:?}",
            SOURCE_KEYS, keys
        )))
    }
}

impl FileSource {
    /// Display name used in results and logs
    pub fn display_name(&self) -> String {
        match self {
            FileSource::Path { path } => path.clone(),
            FileSource::Base64 { .. } => "<base64>".to_string(),
            FileSource::DataUri { .. } => "<data-uri>".to_string(),
            FileSource::Url { url } => url.clone(),
            FileSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }
}

/// A resolved source
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub upload: Upload,
    pub source_name: String,
}

/// Read a local file
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedFile> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    Ok(ResolvedFile {
        upload: Upload::new(file_name, None, data),
        source_name: path.display().to_string(),
    })
}

/// Decode base64 content
pub fn resolve_base64(
    base64_data: &str,
    file_name: Option<&str>,
    mime_type: Option<&str>,
) -> Result<ResolvedFile> {
    let data = base64::engine::general_purpose::STANDARD.decode(base64_data.trim())?;
    Ok(ResolvedFile {
        upload: Upload::new(file_name.unwrap_or("upload"), mime_type, data),
        source_name: "<base64>".to_string(),
    })
}

/// Decode a data URI
pub fn resolve_data_uri(uri: &str, file_name: Option<&str>) -> Result<ResolvedFile> {
    let (mime_type, data) = data_uri::decode(uri)?;
    Ok(ResolvedFile {
        upload: Upload::new(file_name.unwrap_or("upload"), Some(&mime_type), data),
        source_name: "<data-uri>".to_string(),
    })
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // CGNAT 100.64/10
                || (a == 100 && (b & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link-local
                || (first & 0xFE00) == 0xFC00
                || (first & 0xFFC0) == 0xFE80
        }
    }
}

/// Resolve the URL host and refuse private or reserved addresses
async fn check_ssrf(url: &url::Url) -> Result<()> {
    let host = match url.host() {
        Some(url::Host::Domain(domain)) => domain,
        Some(url::Host::Ipv4(ip)) => return reject_private(url, IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => return reject_private(url, IpAddr::V6(ip)),
        None => {
            return Err(Error::SourceResolution {
                reason: "URL has no host".to_string(),
            })
        }
    };
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        reject_private(url, addr.ip())?;
    }
    Ok(())
}

fn reject_private(url: &url::Url, ip: IpAddr) -> Result<()> {
    if is_private_ip(&ip) {
        return Err(Error::SsrfBlocked {
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Last non-empty path segment of a URL, used as the file name
fn url_file_name(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .unwrap_or_else(|| "download".to_string())
}

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 5;

/// Download a file with SSRF protection and a streaming size cap
pub async fn resolve_url(
    url: &str,
    allow_private_urls: bool,
    max_download_bytes: u64,
) -> Result<ResolvedFile> {
    let parsed = url::Url::parse(url).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;

    let guard = move |hop: url::Url| -> BoxFuture<'static, Result<()>> {
        async move {
            if allow_private_urls {
                Ok(())
            } else {
                check_ssrf(&hop).await
            }
        }
        .boxed()
    };

    let mut resolved = download(parsed, max_download_bytes, &guard).await?;
    resolved.source_name = url.to_string();
    Ok(resolved)
}

/// Fetch `url`, following redirects by hand so `guard` sees every hop
async fn download<G>(url: url::Url, max_download_bytes: u64, guard: &G) -> Result<ResolvedFile>
where
    G: Fn(url::Url) -> BoxFuture<'static, Result<()>> + Sync,
{
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let mut current = url;
    let mut redirects = 0;
    let response = loop {
        if !matches!(current.scheme(), "http" | "https") {
            return Err(Error::SourceResolution {
                reason: format!("Unsupported URL scheme: {}", current.scheme()),
            });
        }
        guard(current.clone()).await?;

        let response = client.get(current.clone()).send().await?;
        if !response.status().is_redirection() {
            break response;
        }

        redirects += 1;
        if redirects > MAX_REDIRECTS {
            return Err(Error::SourceResolution {
                reason: format!("More than {} redirects", MAX_REDIRECTS),
            });
        }
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::SourceResolution {
                reason: format!("Redirect without a location ({})", response.status()),
            })?;
        let next = current.join(location).map_err(|e| Error::SourceResolution {
            reason: format!("Invalid redirect location: {}", e),
        })?;
        tracing::debug!(from = %current, to = %next, "following redirect");
        current = next;
    };

    if !response.status().is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {}", response.status()),
        });
    }

    if let Some(length) = response.content_length() {
        if length > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: length,
                max_size: max_download_bytes,
            });
        }
    }

    let declared_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().to_string());

    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
        if data.len() as u64 > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: data.len() as u64,
                max_size: max_download_bytes,
            });
        }
    }

    Ok(ResolvedFile {
        upload: Upload::new(url_file_name(&current), declared_mime.as_deref(), data),
        source_name: current.to_string(),
    })
}

/// Look up an earlier output
pub fn resolve_cache(cache_key: &str, cache: &OutputCache) -> Result<ResolvedFile> {
    let cached = cache.get(cache_key).ok_or_else(|| Error::CacheKeyNotFound {
        key: cache_key.to_string(),
    })?;

    Ok(ResolvedFile {
        upload: Upload::new(cached.file_name, Some(&cached.mime_type), cached.data),
        source_name: format!("<cache:{}>", cache_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CachedFile;

    #[test]
    fn test_source_deserialization() {
        let source: FileSource = serde_json::from_str(r#"{"path": "/a.pdf"}"#).unwrap();
        assert!(matches!(source, FileSource::Path { .. }));

        let source: FileSource =
            serde_json::from_str(r#"{"base64": "JVBERg==", "file_name": "a.pdf"}"#).unwrap();
        match source {
            FileSource::Base64 {
                file_name,
                mime_type,
                ..
            } => {
                assert_eq!(file_name.as_deref(), Some("a.pdf"));
                assert_eq!(mime_type, None);
            }
            other => panic!("unexpected source: {:?}", other),
        }

        let source: FileSource =
            serde_json::from_str(r#"{"data_uri": "data:image/png;base64,iVBORw=="}"#).unwrap();
        assert!(matches!(source, FileSource::DataUri { .. }));

        let source: FileSource = serde_json::from_str(r#"{"cache_key": "abc"}"#).unwrap();
        assert_eq!(source.display_name(), "<cache:abc>");
    }

    #[test]
    fn test_source_deserialization_errors() {
        let err = serde_json::from_str::<FileSource>(r#"{"file": "a.pdf"}"#).unwrap_err();
        assert!(err.to_string().contains("but got keys"));

        let err = serde_json::from_str::<FileSource>(r#""a.pdf""#).unwrap_err();
        assert!(err.to_string().contains("a string"));

        let err = serde_json::from_str::<FileSource>(r#"{"path": 3}"#).unwrap_err();
        assert!(err.to_string().contains("\"path\" must be a string"));
    }

    #[test]
    fn test_resolve_base64_sniffs_type() {
        let resolved = resolve_base64("JVBERi0xLjQ=", Some("doc.pdf"), Some("text/plain")).unwrap();
        assert_eq!(resolved.upload.mime_type, "application/pdf");
        assert_eq!(resolved.upload.file_name, "doc.pdf");
        assert_eq!(resolved.source_name, "<base64>");
    }

    #[test]
    fn test_resolve_base64_invalid() {
        assert!(matches!(
            resolve_base64("not valid base64!!!", None, None),
            Err(Error::Base64Decode(_))
        ));
    }

    #[test]
    fn test_resolve_data_uri() {
        let resolved = resolve_data_uri("data:text/csv;base64,YSxi", Some("t.csv")).unwrap();
        assert_eq!(resolved.upload.mime_type, "text/csv");
        assert_eq!(resolved.upload.data, b"a,b");
    }

    #[test]
    fn test_resolve_path_not_found() {
        assert!(matches!(
            resolve_path("/nonexistent/path/file.pdf"),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_cache() {
        let cache = OutputCache::new(4, 1024);
        let key = cache
            .insert(CachedFile::new("merged.pdf", "application/pdf", b"%PDF-1.7".to_vec()))
            .unwrap();

        let resolved = resolve_cache(&key, &cache).unwrap();
        assert_eq!(resolved.upload.file_name, "merged.pdf");
        assert!(resolved.upload.is_pdf());

        assert!(matches!(
            resolve_cache("missing", &cache),
            Err(Error::CacheKeyNotFound { .. })
        ));
    }

    #[test]
    fn test_url_file_name() {
        let url = url::Url::parse("https://example.com/docs/report.pdf?x=1").unwrap();
        assert_eq!(url_file_name(&url), "report.pdf");
        let url = url::Url::parse("https://example.com/").unwrap();
        assert_eq!(url_file_name(&url), "download");
    }

    #[tokio::test]
    async fn test_resolve_url_rejects_scheme() {
        let result = resolve_url("ftp://example.com/a.pdf", false, 1024).await;
        assert!(matches!(result, Err(Error::SourceResolution { .. })));
    }

    #[tokio::test]
    async fn test_resolve_url_blocks_loopback() {
        let result = resolve_url("http://127.0.0.1:9/a.pdf", false, 1024).await;
        assert!(matches!(result, Err(Error::SsrfBlocked { .. })));
    }

    #[tokio::test]
    async fn test_resolve_url_blocks_mapped_loopback() {
        let result = resolve_url("http://[::ffff:127.0.0.1]:9/a.pdf", false, 1024).await;
        assert!(matches!(result, Err(Error::SsrfBlocked { .. })));
    }

    #[test]
    fn test_resolve_url_follows_redirects() {
        let mut server = mockito::Server::new();
        let _start = server
            .mock("GET", "/start")
            .with_status(302)
            .with_header("location", "/files/final.pdf")
            .create();
        let _final = server
            .mock("GET", "/files/final.pdf")
            .with_status(200)
            .with_body("%PDF-1.4 body")
            .create();

        let url = format!("{}/start", server.url());
        let resolved = tokio_test::block_on(resolve_url(&url, true, 1024)).unwrap();
        assert_eq!(resolved.upload.file_name, "final.pdf");
        assert_eq!(resolved.source_name, url);
    }

    #[test]
    fn test_redirect_hops_are_checked() {
        let mut server = mockito::Server::new();
        let _start = server
            .mock("GET", "/start")
            .with_status(302)
            .with_header("location", "/internal/secret.pdf")
            .create();
        let internal = server
            .mock("GET", "/internal/secret.pdf")
            .with_body("%PDF-1.4 secret")
            .expect(0)
            .create();

        let guard = |hop: url::Url| -> BoxFuture<'static, Result<()>> {
            async move {
                if hop.path().starts_with("/internal") {
                    Err(Error::SsrfBlocked {
                        url: hop.to_string(),
                    })
                } else {
                    Ok(())
                }
            }
            .boxed()
        };

        let start = url::Url::parse(&format!("{}/start", server.url())).unwrap();
        let result = tokio_test::block_on(download(start, 1024, &guard));
        assert!(matches!(result, Err(Error::SsrfBlocked { .. })));
        internal.assert();
    }

    #[test]
    fn test_redirect_loop_gives_up() {
        let mut server = mockito::Server::new();
        let _loop = server
            .mock("GET", "/again")
            .with_status(302)
            .with_header("location", "/again")
            .expect_at_least(1)
            .create();

        let url = format!("{}/again", server.url());
        let result = tokio_test::block_on(resolve_url(&url, true, 1024));
        assert!(matches!(result, Err(Error::SourceResolution { .. })));
    }

    #[test]
    fn test_resolve_url_downloads() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/files/report.pdf")
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body("%PDF-1.4 body")
            .create();

        let url = format!("{}/files/report.pdf", server.url());
        let resolved = tokio_test::block_on(resolve_url(&url, true, 1024)).unwrap();
        assert_eq!(resolved.upload.file_name, "report.pdf");
        // sniffed content beats the header
        assert_eq!(resolved.upload.mime_type, "application/pdf");
        assert_eq!(resolved.source_name, url);
    }

    #[test]
    fn test_resolve_url_size_cap() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/big.pdf")
            .with_status(200)
            .with_body(vec![b'x'; 64])
            .create();

        let url = format!("{}/big.pdf", server.url());
        let result = tokio_test::block_on(resolve_url(&url, true, 16));
        assert!(matches!(
            result,
            Err(Error::DownloadTooLarge { max_size: 16, .. })
        ));
    }

    #[test]
    fn test_is_private_ip() {
        for ip in [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "255.255.255.255",
            "::1",
            "::",
            "fd00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
            "::ffff:169.254.169.254",
            "::ffff:10.0.0.1",
        ] {
            assert!(is_private_ip(&ip.parse().unwrap()), "{} should be private", ip);
        }
        for ip in ["8.8.8.8", "203.0.113.1", "2001:db8::1", "::ffff:8.8.8.8"] {
            assert!(!is_private_ip(&ip.parse().unwrap()), "{} should be public", ip);
        }
    }
}
