//! Server startup and serve errors.

/// Errors that stop the server from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listener.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Other listener I/O failure.
    #[error("listener i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Bearer handshake policy selected without a signing secret.
    #[error("bearer handshake auth requires a JWT secret")]
    MissingJwtSecret,
}
