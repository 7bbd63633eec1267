use chrono::{DateTime, Utc};
use thiserror::Error;

/// Pipeline error taxonomy.
///
/// Only [`PipelineError::Auth`] and [`PipelineError::RecordSource`] abort a run.
/// Everything else is recovered per item and counted in the run summary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Credential exchange failed. The message is already redacted.
    #[error("authentication failed{}: {message}", status_suffix(.status))]
    Auth {
        /// HTTP status returned by the token endpoint, if a response arrived.
        status: Option<u16>,
        /// Redacted diagnostic message.
        message: String,
    },
    /// A record failed required-field or freshness checks.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Network failure or timeout on an API call.
    #[error("transport error: {0}")]
    Transport(String),
    /// The API answered a structurally valid request with a non-success status.
    #[error("API rejected request with status {status}: {message}")]
    ApiRejection {
        /// HTTP status code.
        status: u16,
        /// API-provided reason, preserved for diagnostics.
        message: String,
    },
    /// A successful quote could not be traced back to its client.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    /// The record source could not be read.
    #[error("record source unavailable: {0}")]
    RecordSource(String),
    /// Local persistence (token cache, result sink) failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// Error with context chain for better debugging.
    #[error("{context}: {source}")]
    WithContext {
        /// The underlying source of the error.
        source: Box<PipelineError>,
        /// Additional context message.
        context: String,
    },
}

/// Response bodies are cut to this many characters before they reach an error.
pub const MAX_ERROR_BODY_CHARS: usize = 300;

/// Cuts `text` to `max_chars` characters, marking the cut with `...`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

impl PipelineError {
    /// Returns `true` for errors that must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Auth { .. } | Self::RecordSource(_) => true,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Strips any context wrappers and returns the innermost error.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL in its message; strip it, query strings may carry secrets
        PipelineError::Transport(err.without_url().to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

/// Reasons a record is excluded before it reaches the quoting batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The source row is not a key/value mapping.
    #[error("row {row} is not a key/value mapping")]
    MalformedRow { row: usize },
    /// A required field is absent or empty.
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },
    /// Delivery frequency is not one of the supported schedules.
    #[error("unsupported delivery frequency `{value}` (expected 3 or 5)")]
    InvalidFrequency { value: String },
    /// A coordinate does not parse as a finite number.
    #[error("field `{field}` must be numeric, got `{value}`")]
    NonNumericCoordinate { field: &'static str, value: String },
    /// Pickup time is not an ISO-8601 UTC instant.
    #[error("pickup time `{value}` is not an ISO-8601 UTC instant: {reason}")]
    MalformedPickupTime { value: String, reason: String },
    /// Pickup time is not strictly in the future.
    #[error("stale pickup time {pickup} (run started at {now})")]
    StalePickupTime {
        pickup: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

impl ValidationError {
    /// Name of the offending field, when the error concerns a single field.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field } | Self::NonNumericCoordinate { field, .. } => Some(*field),
            Self::InvalidFrequency { .. } => Some("deliveryFrequency"),
            Self::MalformedPickupTime { .. } | Self::StalePickupTime { .. } => {
                Some("pickup_time_utc")
            }
            Self::MalformedRow { .. } => None,
        }
    }
}

/// A quote success whose client identity cannot be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("quote {quote_id}: originating record for client `{client_id}` has no `{field}`")]
    MissingClientField {
        quote_id: String,
        client_id: String,
        field: &'static str,
    },
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `PipelineError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e.into()),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}
