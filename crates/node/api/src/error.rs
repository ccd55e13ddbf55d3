use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;
use wayfare_peers::RegistryError;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid wallet address {0:?}")]
    InvalidWallet(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidWallet(_) => StatusCode::BAD_REQUEST,
            Self::Registry(err) => match err {
                RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
                RegistryError::PoolExhausted(_)
                | RegistryError::ShuttingDown
                | RegistryError::CryptoUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                RegistryError::ApplyFailed(_) | RegistryError::InterfaceError(_) => {
                    StatusCode::BAD_GATEWAY
                }
                RegistryError::Store(_) | RegistryError::Task(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, err = %self, "Peer API request failed");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_peers::PoolExhausted;
    use wayfare_primitives::WalletAddress;
    use wayfare_tunnel::TunnelError;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::from(RegistryError::NotFound(WalletAddress::ZERO));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let exhausted = ApiError::from(RegistryError::PoolExhausted(PoolExhausted {
            subnet: "10.0.0.0/24".parse().unwrap(),
        }));
        assert_eq!(exhausted.status(), StatusCode::SERVICE_UNAVAILABLE);

        let apply = ApiError::from(RegistryError::ApplyFailed(TunnelError::Output {
            command: "wg set".to_string(),
            reason: "boom".to_string(),
        }));
        assert_eq!(apply.status(), StatusCode::BAD_GATEWAY);

        assert_eq!(
            ApiError::InvalidWallet("0x12".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
