use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `TernClientError` values.
pub enum TernClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no frame received within {idle_ms}ms")]
    IdleTimeout { idle_ms: u64 },
    #[error("stream ended before a terminal frame")]
    StreamEndedWithoutTerminal,
    #[error("stream ended inside an incomplete frame")]
    IncompleteFrame,
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("api request failed: {0}")]
    Api(String),
    #[error("a stream is already in flight for this session")]
    SessionBusy,
    #[error("history load was superseded by a newer session change")]
    HistoryLoadSuperseded,
    #[error("identity store error: {0}")]
    Identity(String),
}
