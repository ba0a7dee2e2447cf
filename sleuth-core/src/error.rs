/// Top-level Sleuth error type.
///
/// All fallible operations in `sleuth-core` return [`Result<T, SleuthError>`](Result).
/// The normalizer, classifier and graph builder never fail; errors only come
/// from configuration and the two network collaborators.
#[derive(thiserror::Error, Debug)]
pub enum SleuthError {
    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error communicating with an LLM provider.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Error fetching or reading the quote series.
    #[error("Quote error: {0}")]
    Quote(#[from] QuoteError),
}

/// Errors in Sleuth configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem I/O error reading or writing the config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from LLM provider interactions.
#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    /// Network-level failure connecting to the LLM provider.
    #[error("Network error: {0}")]
    Network(String),

    /// LLM API returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    ApiError {
        /// HTTP status code from the provider.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// LLM response envelope could not be parsed.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// LLM configuration is missing or invalid (API key, model, etc.).
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors from the quote provider.
#[derive(thiserror::Error, Debug)]
pub enum QuoteError {
    /// Transport failure (DNS, TLS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The quote endpoint answered with a non-success status.
    #[error("Quote API error (HTTP {status}): {body}")]
    Status {
        /// HTTP status code from the provider.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The request could not be formed from the given parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Quotes were required but the provider had no rows for the range.
    #[error("No price data for {ticker} between {start} and {end}")]
    Unavailable {
        ticker: String,
        start: String,
        end: String,
    },
}

/// Convenience alias for `Result<T, SleuthError>`.
pub type Result<T> = std::result::Result<T, SleuthError>;
