//! Error types for asinscout.
//!
//! Library crates use [`ScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only [`ScoutError::Validation`] (bad seed) and [`ScoutError::Config`] are
//! allowed to stop a run. Everything raised by a discovery source or a page
//! fetch is downgraded inside its stage to an empty result plus a diagnostic.

use std::path::PathBuf;

/// Top-level error type for all asinscout operations.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed seed identifier or other invalid input.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A relationship source could not produce anything (missing credential,
    /// upstream error, empty upstream result).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Network, status, or body failure while fetching a URL.
    #[error("fetch failed for {url} ({kind}): {message}")]
    Fetch {
        url: String,
        kind: FetchErrorKind,
        message: String,
    },

    /// HTML or JSON content could not be interpreted.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What went wrong during a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection, DNS, TLS or redirect failure.
    Transport,
    /// The request did not finish within its timeout.
    Timeout,
    /// The server answered with a non-success status.
    Status(u16),
    /// The body could not be read or decoded.
    Body,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::Timeout => f.write_str("timeout"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Body => f.write_str("body"),
        }
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a fetch error for `url`.
    pub fn fetch(url: impl Into<String>, kind: FetchErrorKind, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            kind,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Timeouts, transport failures, 429 and 5xx are transient; other
    /// statuses and undecodable bodies are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { kind, .. } => match kind {
                FetchErrorKind::Transport | FetchErrorKind::Timeout => true,
                FetchErrorKind::Status(code) => *code == 429 || (500..600).contains(code),
                FetchErrorKind::Body => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ScoutError::config("missing marketplace");
        assert_eq!(err.to_string(), "config error: missing marketplace");

        let err = ScoutError::fetch("https://x/dp/B0", FetchErrorKind::Status(503), "unavailable");
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn transient_classification() {
        let t = |kind| ScoutError::fetch("u", kind, "m").is_transient();
        assert!(t(FetchErrorKind::Timeout));
        assert!(t(FetchErrorKind::Transport));
        assert!(t(FetchErrorKind::Status(500)));
        assert!(t(FetchErrorKind::Status(429)));
        assert!(!t(FetchErrorKind::Status(404)));
        assert!(!t(FetchErrorKind::Status(403)));
        assert!(!t(FetchErrorKind::Body));
        assert!(!ScoutError::validation("x").is_transient());
    }
}
