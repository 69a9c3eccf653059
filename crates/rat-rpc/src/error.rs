//! RPC-layer error taxonomy. Each variant maps directly to one of the
//! status codes the original gRPC surface uses (`INVALID_ARGUMENT`,
//! `NOT_FOUND`, `RESOURCE_EXHAUSTED`); the `bins/*-server` HTTP layer maps
//! these onto HTTP status codes and sanitizes the message before writing
//! the response body.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// HTTP status code for this error, mirroring the gRPC status code the
    /// original proto surface would have used.
    pub fn status_code(&self) -> u16 {
        match self {
            RpcError::InvalidArgument(_) => 400,
            RpcError::NotFound(_) => 404,
            RpcError::ResourceExhausted(_) => 429,
            RpcError::Internal(_) => 500,
        }
    }

    pub fn sanitized_message(&self) -> String {
        crate::sanitize::sanitize_error(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_grpc_equivalents() {
        assert_eq!(RpcError::InvalidArgument("x".into()).status_code(), 400);
        assert_eq!(RpcError::NotFound("x".into()).status_code(), 404);
        assert_eq!(RpcError::ResourceExhausted("x".into()).status_code(), 429);
        assert_eq!(RpcError::Internal("x".into()).status_code(), 500);
    }
}
