//! Error Types

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Missing credential or invalid setting at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider string not in the allow-list
    #[error("Unsupported provider: {0}. Use 'openai' or 'anthropic'.")]
    UnsupportedProvider(String),

    /// Tool-hosting process unreachable or handshake failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server script does not end in a recognized extension
    #[error("Unsupported server script: {0} (must be a .py or .js file)")]
    UnsupportedServerScript(String),

    /// Client used before a tool session was attached
    #[error("Not connected to a tool server")]
    NotConnected,

    /// LLM provider returned an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited by the provider
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider rejected the credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Tool descriptor missing its name
    #[error("Invalid tool descriptor: {0}")]
    InvalidToolDescriptor(String),

    /// Tool call failed at the remote end
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool-call arguments were not a JSON object
    #[error("Could not parse arguments for {tool}: {reason}")]
    ArgumentDecode { tool: String, reason: String },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Whether the error came from talking to the LLM provider
    pub const fn is_provider_call(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Auth(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::UnsupportedProvider(_) | Self::UnsupportedServerScript(_) => self.to_string(),
            Self::Connection(msg) => format!("Could not reach the tool server: {msg}"),
            Self::NotConnected => "Not connected to a server. Connect first.".into(),
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your API key.".into(),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
