use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::transport::{HttpTransport, UpstreamEndpoints};

/// Shared application state, immutable after startup.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub endpoints: UpstreamEndpoints,
}

impl AppState {
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the HTTP client or upstream headers
    /// cannot be built from `config`.
    pub fn new(config: AppConfig) -> Result<Self, ProxyError> {
        let transport = HttpTransport::new(&config.server)?;
        let endpoints = UpstreamEndpoints::new(&config.upstream)?;
        Ok(Self {
            config,
            transport,
            endpoints,
        })
    }
}
