use thiserror::Error;

/// Errors raised while talking to the daemon.
///
/// [`RpcError::Server`] keeps the daemon's message untouched so callers can
/// match consensus reject reasons (e.g. `bad-fork-block`) by substring.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status}")]
    Http { status: u16 },
    #[error("invalid JSON in response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },
    #[error("response carried neither result nor error")]
    MissingResult,
}

impl RpcError {
    /// True when this is a daemon-side error whose message contains `needle`.
    pub fn is_server_error_containing(&self, needle: &str) -> bool {
        matches!(self, Self::Server { message, .. } if message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_substring_match() {
        let err = RpcError::Server {
            code: -26,
            message: "bad-fork-block, block does not meet fork size".to_owned(),
        };

        assert!(err.is_server_error_containing("bad-fork-block"));
        assert!(!err.is_server_error_containing("bad-txns"));
    }

    #[test]
    fn non_server_errors_never_match() {
        assert!(!RpcError::MissingResult.is_server_error_containing("bad-fork-block"));
        assert!(!RpcError::Http { status: 502 }.is_server_error_containing(""));
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = RpcError::Server {
            code: -8,
            message: "unknown setting".to_owned(),
        };
        assert_eq!(err.to_string(), "server error -8: unknown setting");
    }
}
