use serde_json::Value;
use thiserror::Error;

/// Every failure a user action or a proxied call can end in.
///
/// None of these are fatal: the page renders them into the transcript or a
/// placeholder, the proxy turns them into a JSON envelope with a status.
#[derive(Error, Debug, Clone)]
pub enum RoutineError {
    /// Catalog could not be fetched or parsed
    #[error("Unable to load products: {0}")]
    Load(String),

    #[error("Please select at least one product to generate a routine.")]
    EmptySelection,

    /// Neither a proxy URL nor a direct credential is configured
    #[error("Missing API configuration. For best practice deploy the edge proxy and set `proxy_url` in config.toml, or provide `api_key` for direct calls (not recommended in production).")]
    MissingConfiguration,

    /// The model API (or the proxy in front of it) answered with an error body
    #[error("{prefix} error: {detail}")]
    Upstream {
        prefix: &'static str,
        status: Option<u16>,
        detail: String,
        body: Value,
    },

    #[error("Unexpected {0} response format.")]
    UnexpectedFormat(&'static str),

    #[error("No response from API.")]
    NoResponse,

    /// Network failure on a model call
    #[error("Request failed: {0}")]
    Transport(String),

    /// Proxy-side: credential absent at call time
    #[error("{0}")]
    Configuration(String),

    /// Proxy-side: inbound body unparseable
    #[error("{0}")]
    BadRequest(String),
}

impl RoutineError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// HTTP status the proxy answers with for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Upstream {
                status: Some(status),
                ..
            } => *status,
            _ => 500,
        }
    }

    /// Body placed under `error` in the proxy envelope.
    pub fn envelope_body(&self) -> Value {
        match self {
            Self::Upstream { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for RoutineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
