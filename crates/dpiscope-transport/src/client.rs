use async_trait::async_trait;
use bytes::Bytes;
use dpiscope_core::{ProbeConfig, ProbeError};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;

/// The three request shapes the probes need.
#[derive(Debug, Clone)]
pub enum ProbeRequest {
    /// Bodiless reachability check.
    Head,
    /// Large request body.
    Post { body: Bytes },
    /// Random data carried in the request line.
    Get { padding: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Head,
    Post,
    Get,
}

impl ProbeRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ProbeRequest::Head => RequestKind::Head,
            ProbeRequest::Post { .. } => RequestKind::Post,
            ProbeRequest::Get { .. } => RequestKind::Get,
        }
    }
}

/// One network exchange with a host.
///
/// Implementations must not apply timeouts of their own: the caller races
/// every call against its timer and drops the future when the timer wins.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Sends `request` and waits for the full response. Any HTTP status counts
    /// as a completed exchange.
    async fn send(&self, host: &str, request: ProbeRequest) -> Result<u16, ProbeError>;
}

#[async_trait]
impl<T: ProbeTransport + ?Sized> ProbeTransport for Arc<T> {
    async fn send(&self, host: &str, request: ProbeRequest) -> Result<u16, ProbeError> {
        (**self).send(host, request).await
    }
}

/// `reqwest`-backed transport.
///
/// Redirects are not followed; a redirect is already proof of a completed exchange.
pub struct HttpTransport {
    client: reqwest::Client,
    scheme: String,
}

impl HttpTransport {
    pub fn new(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .default_headers(header_map(config))
            .build()?;

        Ok(Self {
            client,
            scheme: config.scheme.clone(),
        })
    }

    /// Builds a cache-busting URL. Hosts given as full URLs keep their scheme and path.
    pub fn url_for(&self, host: &str, padding: Option<&str>) -> String {
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("{}://{}/", self.scheme, host)
        };
        let sep = if base.contains('?') { '&' } else { '?' };
        let nonce: u64 = rand::thread_rng().gen();
        match padding {
            Some(p) => format!("{}{}t={}&p={}", base, sep, nonce, p),
            None => format!("{}{}t={}", base, sep, nonce),
        }
    }
}

fn header_map(config: &ProbeConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(n), Ok(v)) => {
                headers.insert(n, v);
            }
            _ => tracing::warn!("transport: skipping invalid header `{}`", name),
        }
    }
    headers
}

fn network(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Network(e.to_string())
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn send(&self, host: &str, request: ProbeRequest) -> Result<u16, ProbeError> {
        let builder = match request {
            ProbeRequest::Head => self.client.head(self.url_for(host, None)),
            ProbeRequest::Post { body } => self.client.post(self.url_for(host, None)).body(body),
            ProbeRequest::Get { padding } => self.client.get(self.url_for(host, Some(&padding))),
        };

        let mut response = builder.send().await.map_err(network)?;
        let status = response.status().as_u16();

        // The exchange is only complete once the body has been drained.
        while response.chunk().await.map_err(network)?.is_some() {}

        Ok(status)
    }
}
