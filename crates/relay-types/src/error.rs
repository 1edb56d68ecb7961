use thiserror::Error;

/// Errors from delivering replies through a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send to chat '{chat_id}' failed: {reason}")]
    Send { chat_id: String, reason: String },

    #[error("transport closed")]
    Closed,
}

/// Errors from the batching queue intake.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("intake queue is full")]
    Full,

    #[error("batching queue is closed")]
    Closed,
}

/// Errors from the worker pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is stopped")]
    Stopped,
}

/// Errors surfaced by the pipeline's public operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("pipeline is shutting down")]
    ShuttingDown,
}

/// Errors from loading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("failed to write '{path}': {reason}")]
    Write { path: String, reason: String },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("config file already exists at '{0}'")]
    AlreadyExists(String),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Send {
            chat_id: "chat-9".to_string(),
            reason: "socket closed".to_string(),
        };
        assert_eq!(err.to_string(), "send to chat 'chat-9' failed: socket closed");
    }

    #[test]
    fn test_pipeline_error_from_queue() {
        let err: PipelineError = QueueError::Full.into();
        assert_eq!(err.to_string(), "intake queue is full");
        assert!(matches!(err, PipelineError::Queue(QueueError::Full)));
    }

    #[test]
    fn test_pipeline_error_from_pool() {
        let err: PipelineError = PoolError::Stopped.into();
        assert_eq!(err.to_string(), "worker pool is stopped");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Read {
            path: "/tmp/relay.toml".to_string(),
            reason: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/relay.toml"));
    }
}
