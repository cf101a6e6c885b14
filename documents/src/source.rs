//! Document sources and fetchers.
//!
//! A [`DocumentSource`] is either a remote identifier (DOI or URL) or an
//! uploaded file. Sources are read once at ingestion time; everything after
//! that works on plain text, regardless of where the content came from.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, info};
use url::Url;

use crate::document::DocumentId;
use crate::error::FetchError;
use crate::extraction::{MIME_PDF, RawContent};

/// Default resolver for bare DOIs.
pub const DEFAULT_DOI_RESOLVER: &str = "https://doi.org";

const DOI_PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Normalize a DOI given in any of its usual spellings.
///
/// Strips resolver prefixes and `doi:`, trims and lowercases. Returns `None`
/// when the result does not look like a DOI (`10.<registrant>/<suffix>`).
pub fn normalize_doi(raw: &str) -> Option<String> {
    let lower = raw.trim().to_ascii_lowercase();
    let mut doi = lower.as_str();
    for prefix in DOI_PREFIXES {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim();
            break;
        }
    }

    let (registrant, suffix) = doi.split_once('/')?;
    if registrant.starts_with("10.") && registrant.len() > 3 && !suffix.is_empty() {
        Some(doi.to_string())
    } else {
        None
    }
}

/// The DOI an identifier names, if any. Non-resolver URLs are never DOIs,
/// even when their path contains one.
fn doi_of(identifier: &str) -> Option<String> {
    let trimmed = identifier.trim();
    let lower = trimmed.to_ascii_lowercase();
    let is_resolver_url = DOI_PREFIXES[..4].iter().any(|p| lower.starts_with(p));
    if is_resolver_url || !trimmed.contains("://") {
        normalize_doi(trimmed)
    } else {
        None
    }
}

/// Fetches raw content for a remote identifier.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the content behind `identifier`.
    async fn fetch(&self, identifier: &str) -> Result<RawContent, FetchError>;
}

/// Fetcher for DOIs and http(s) URLs.
pub struct HttpFetcher {
    client: reqwest::Client,
    doi_resolver: String,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher resolving DOIs through doi.org.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            doi_resolver: DEFAULT_DOI_RESOLVER.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Use a different DOI resolver base URL.
    pub fn with_doi_resolver(mut self, base_url: impl Into<String>) -> Self {
        self.doi_resolver = base_url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Turn an identifier into the URL to request.
    pub fn resolve(&self, identifier: &str) -> Result<Url, FetchError> {
        let trimmed = identifier.trim();
        if let Some(doi) = doi_of(trimmed) {
            let base = self.doi_resolver.trim_end_matches('/');
            return Url::parse(&format!("{base}/{doi}"))
                .map_err(|e| FetchError::InvalidIdentifier(format!("{identifier}: {e}")));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| FetchError::InvalidIdentifier(format!("{identifier}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, identifier: &str) -> Result<RawContent, FetchError> {
        let url = self.resolve(identifier)?;
        debug!("Fetching {url}");

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/pdf, text/*;q=0.9")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyResponse(url.to_string()));
        }

        info!("Fetched {} bytes ({content_type}) from {url}", bytes.len());
        Ok(raw_content(bytes.to_vec(), &content_type))
    }
}

impl HttpFetcher {
    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            FetchError::Network(error)
        }
    }
}

fn raw_content(bytes: Vec<u8>, content_type: &str) -> RawContent {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime.eq_ignore_ascii_case(MIME_PDF) {
        RawContent::Pdf(bytes)
    } else {
        RawContent::Bytes {
            bytes,
            content_type: content_type.to_string(),
        }
    }
}

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// A DOI or URL to fetch.
    Remote { identifier: String },

    /// A file supplied directly by the user.
    Upload { filename: String, bytes: Vec<u8> },
}

impl DocumentSource {
    pub fn remote(identifier: impl Into<String>) -> Self {
        Self::Remote {
            identifier: identifier.into(),
        }
    }

    pub fn upload(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Upload {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Identifier the resulting document is known by.
    ///
    /// DOIs are normalized so the same paper submitted twice maps to one id.
    pub fn id(&self) -> DocumentId {
        match self {
            Self::Remote { identifier } => match doi_of(identifier) {
                Some(doi) => DocumentId::new(doi),
                None => DocumentId::new(identifier.trim()),
            },
            Self::Upload { filename, .. } => DocumentId::new(filename.as_str()),
        }
    }

    /// Read the raw content, fetching remote sources through `fetcher`.
    pub async fn read(&self, fetcher: &dyn SourceFetcher) -> Result<RawContent, FetchError> {
        match self {
            Self::Remote { identifier } => fetcher.fetch(identifier).await,
            Self::Upload { filename, bytes } => {
                if bytes.is_empty() {
                    return Err(FetchError::EmptyResponse(filename.clone()));
                }
                if filename.to_ascii_lowercase().ends_with(".pdf") {
                    Ok(RawContent::Pdf(bytes.clone()))
                } else {
                    Ok(RawContent::Bytes {
                        bytes: bytes.clone(),
                        content_type: "text/plain".to_string(),
                    })
                }
            }
        }
    }
}
