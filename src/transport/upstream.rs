//! URL and header construction for the Generative Language API.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::UpstreamConfig;
use crate::error::ProxyError;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-goog-api-key");
const API_CLIENT_HEADER: HeaderName = HeaderName::from_static("x-goog-api-client");

#[derive(Debug, Clone)]
pub struct UpstreamEndpoints {
    /// `{base_url}/{api_version}`, no trailing slash.
    root: String,
    api_client: HeaderValue,
}

impl UpstreamEndpoints {
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when `api_client` is not a valid header value.
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        let api_client = HeaderValue::from_str(&config.api_client)
            .map_err(|err| ProxyError::Config(format!("Invalid upstream.api_client: {err}")))?;
        Ok(Self {
            root: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.api_version.trim_matches('/')
            ),
            api_client,
        })
    }

    /// `models/{model}:generateContent`, or the `alt=sse` stream variant.
    ///
    /// # Errors
    ///
    /// Returns a 400 when the model name does not form a valid URL.
    pub fn generate_content(&self, model: &str, stream: bool) -> Result<url::Url, ProxyError> {
        let url = if stream {
            format!("{}/models/{model}:streamGenerateContent?alt=sse", self.root)
        } else {
            format!("{}/models/{model}:generateContent", self.root)
        };
        parse(&url)
    }

    /// `{resource}:batchEmbedContents`, where `resource` is `models/<name>`.
    ///
    /// # Errors
    ///
    /// Returns a 400 when the model name does not form a valid URL.
    pub fn batch_embed(&self, resource: &str) -> Result<url::Url, ProxyError> {
        parse(&format!("{}/{resource}:batchEmbedContents", self.root))
    }

    /// # Errors
    ///
    /// Returns a 400 when the configured root does not form a valid URL.
    pub fn models(&self) -> Result<url::Url, ProxyError> {
        parse(&format!("{}/models", self.root))
    }

    /// Headers for one upstream call. The client key is forwarded unchanged.
    ///
    /// # Errors
    ///
    /// Returns a 400 when the key contains bytes not allowed in a header.
    pub fn headers(&self, api_key: Option<&str>, json_body: bool) -> Result<HeaderMap, ProxyError> {
        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(API_CLIENT_HEADER, self.api_client.clone());
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| ProxyError::invalid_request("Invalid API key"))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }
        if json_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }
}

fn parse(url: &str) -> Result<url::Url, ProxyError> {
    url::Url::parse(url)
        .map_err(|err| ProxyError::invalid_request(format!("Invalid upstream URL {url:?}: {err}")))
}
