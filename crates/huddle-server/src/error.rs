//! Server startup errors.

/// Errors that can occur while starting the server.
///
/// Everything after startup is scoped to a single connection or a single
/// delivery attempt and is handled in place; only binding can fail the
/// process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound or inspected.
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err = ServerError::from(io);
        assert!(err.to_string().contains("bind"));
    }
}
