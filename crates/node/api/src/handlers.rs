use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use wayfare_peers::RegistryError;
use wayfare_primitives::{PeerIdentity, WalletAddress};
use wayfare_tunnel::ClientConfig;

use crate::{ApiError, ApiState};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPeerRequest {
    pub wallet: String,
}

/// Body of `POST /peers`.
///
/// `config` and `wireguard_config` carry the client private key and are only
/// present on the call that created the peer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPeerResponse {
    pub ok: bool,
    pub peer: PeerIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ClientConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wireguard_config: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub live_peers: usize,
    pub shutting_down: bool,
}

fn parse_wallet(raw: &str) -> Result<WalletAddress, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidWallet(raw.to_string()))
}

pub(crate) async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let shutting_down = state.registry.is_closing();
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = HealthResponse {
        ok: !shutting_down,
        live_peers: state.registry.live_count(),
        shutting_down,
    };
    (status, Json(body))
}

pub(crate) async fn list_peers(State(state): State<ApiState>) -> Json<Vec<PeerIdentity>> {
    Json(state.registry.snapshot())
}

pub(crate) async fn get_peer(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
) -> Result<Json<PeerIdentity>, ApiError> {
    let wallet = parse_wallet(&wallet)?;
    state
        .registry
        .get(&wallet)
        .map(Json)
        .ok_or(ApiError::Registry(RegistryError::NotFound(wallet)))
}

pub(crate) async fn register_peer(
    State(state): State<ApiState>,
    Json(request): Json<RegisterPeerRequest>,
) -> Result<(StatusCode, Json<RegisterPeerResponse>), ApiError> {
    let wallet = parse_wallet(&request.wallet)?;
    let registration = state.registry.register_peer(wallet).await?;

    let Some(secret) = registration.secret else {
        let body = RegisterPeerResponse {
            ok: true,
            peer: registration.peer,
            config: None,
            wireguard_config: None,
        };
        return Ok((StatusCode::OK, Json(body)));
    };

    let config = ClientConfig::new(
        &secret,
        registration.peer.virtual_address,
        state.server_key,
        &state.tunnel,
    );
    let body = RegisterPeerResponse {
        ok: true,
        peer: registration.peer,
        wireguard_config: Some(config.to_string()),
        config: Some(config),
    };
    Ok((StatusCode::CREATED, Json(body)))
}

pub(crate) async fn remove_peer(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
) -> Result<Json<PeerIdentity>, ApiError> {
    let wallet = parse_wallet(&wallet)?;
    Ok(Json(state.registry.remove_peer(wallet).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wallet() {
        let wallet = parse_wallet(" 0x00000000000000000000000000000000000000aa ").unwrap();
        assert_eq!(wallet, WalletAddress::with_last_byte(0xaa));

        assert!(matches!(
            parse_wallet("not-a-wallet"),
            Err(ApiError::InvalidWallet(_))
        ));
        assert!(matches!(parse_wallet("0x1234"), Err(ApiError::InvalidWallet(_))));
    }
}
