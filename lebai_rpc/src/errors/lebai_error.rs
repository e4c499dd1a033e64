use thiserror::Error;

/// Failure of a single JSON-RPC exchange with the controller.
///
/// Transport-level variants cover everything that prevents a well-formed response from
/// arriving. `Rpc` and `Protocol` mean a response arrived but did not carry what the caller
/// needed.
#[derive(Debug, Clone, Error)]
pub enum LebaiError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("SendError: {0}")]
    FailedToSend(String),
    #[error("RecieveError: {0}")]
    FailedToReceive(String),
    #[error("Controller returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Unexpected response: {0}")]
    Protocol(String),
    #[error("Invalid driver configuration: {0}")]
    Configuration(String),
}

impl LebaiError {
    /// True when no usable response reached the caller.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LebaiError::Timeout(_)
                | LebaiError::HttpStatus(_)
                | LebaiError::FailedToSend(_)
                | LebaiError::FailedToReceive(_)
        )
    }
}
