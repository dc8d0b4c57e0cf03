use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::config::ServerConfig;
use crate::error::ProxyError;
use crate::protocol::gemini::media::MediaFetcher;
use crate::protocol::gemini::GeminiBlob;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, ProxyError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(config.timeout));

    let proxy_url = config
        .proxy
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| ProxyError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !config.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ProxyError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client for upstream calls and remote image fetches.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the proxy URL is invalid or the
    /// client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            client: build_reqwest_client(config)?,
        })
    }

    /// POST a JSON body. Any upstream status is returned as a response.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the request cannot be executed.
    pub async fn post_json(
        &self,
        url: &url::Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        self.execute(http::Method::POST, url, headers, Some(body)).await
    }

    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the request cannot be executed.
    pub async fn get(
        &self,
        url: &url::Url,
        headers: HeaderMap,
    ) -> Result<reqwest::Response, ProxyError> {
        self.execute(http::Method::GET, url, headers, None).await
    }

    async fn execute(
        &self,
        method: http::Method,
        url: &url::Url,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut request = reqwest::Request::new(method, url.clone());
        *request.headers_mut() = headers;
        if let Some(body) = body {
            *request.body_mut() = Some(reqwest::Body::from(body));
        }
        self.client.execute(request).await.map_err(|err| {
            tracing::warn!(error = %err, path = url.path(), "upstream request failed");
            ProxyError::Transport(err.to_string())
        })
    }
}

async fn read_body(response: reqwest::Response) -> Result<Bytes, ProxyError> {
    response
        .bytes()
        .await
        .map_err(|err| ProxyError::Transport(format!("Failed to read upstream body: {err}")))
}

/// Turn a non-2xx upstream response into a relayable error.
pub async fn upstream_error(response: reqwest::Response) -> ProxyError {
    let status = response.status();
    let content_type = response.headers().get(CONTENT_TYPE).cloned();
    match response.bytes().await {
        Ok(body) => ProxyError::Upstream {
            status,
            content_type,
            body,
        },
        Err(err) => ProxyError::Transport(format!(
            "Failed to read upstream error body (status {status}): {err}"
        )),
    }
}

/// A successful upstream response read to the end.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl UpstreamReply {
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the body cannot be read.
    pub async fn read(response: reqwest::Response) -> Result<Self, ProxyError> {
        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = read_body(response).await?;
        Ok(Self {
            status,
            content_type,
            body,
        })
    }

    /// Decode the body as `T`.
    ///
    /// # Errors
    ///
    /// A body of another shape comes back as [`ProxyError::Upstream`], which
    /// relays it to the client unchanged.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProxyError> {
        serde_json::from_slice(&self.body).map_err(|err| {
            tracing::warn!(
                status = self.status.as_u16(),
                error = %err,
                "upstream body is not the expected JSON, relaying it unchanged"
            );
            self.clone().relay()
        })
    }

    /// Hand the response back to the client as received.
    #[must_use]
    pub fn relay(self) -> ProxyError {
        ProxyError::Upstream {
            status: self.status,
            content_type: self.content_type,
            body: self.body,
        }
    }
}

impl MediaFetcher for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<GeminiBlob, ProxyError> {
        let parsed = url::Url::parse(url)
            .map_err(|err| ProxyError::invalid_request(format!("{err}")))?;
        let response = self.get(&parsed, HeaderMap::new()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::with_status(
                status,
                format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("")),
            ));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = read_body(response).await?;
        Ok(GeminiBlob {
            mime_type,
            data: STANDARD.encode(&bytes),
        })
    }
}
