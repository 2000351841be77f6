pub mod vbout;

use serde::Deserialize;

use vbout::{Vbout, VboutConfig};

/// The default number of seconds until an external API request times out.
/// Used when a config does not provide its own value.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// The external API clients available to the webhook handlers.
pub struct Api {
    pub vbout: Vbout,
}

#[derive(Deserialize)]
pub struct Apis {
    pub vbout: VboutConfig,
}

#[derive(Debug)]
pub enum ApiError {
    ConfigurationError(String),
    NetworkError(reqwest::Error),
    VboutError(vbout::VboutError),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::ConfigurationError(e) => write!(f, "API configuration error: {e}"),
            ApiError::NetworkError(e) => write!(f, "Network error: {e}"),
            ApiError::VboutError(e) => write!(f, "VBout client error: {e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl Api {
    pub fn new(config: Apis) -> Result<Self, ApiError> {
        let vbout = Vbout::new(config.vbout)?;
        Ok(Self { vbout })
    }
}
