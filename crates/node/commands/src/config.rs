//! Figment-based configuration loading.
//!
//! Configuration priority (highest wins):
//! 1. CLI arguments that differ from their defaults
//! 2. Config file (TOML)
//! 3. Environment variables (`WAYFARE_` prefix, e.g. `WAYFARE_TUNNEL__INTERFACE=wg1`)
//! 4. Defaults

use crate::cli::{
    ApiArgs, BackendArgs, MetricsArgs, NodeArgs, PeerArgs, ProviderArgs, TunnelArgs, UsageArgs,
};
use eyre::{Result, WrapErr, eyre};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use wayfare_node_core::constants::ENV_PREFIX;
use wayfare_primitives::WalletAddress;

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Local peer API.
    pub api: ApiArgs,

    /// Prometheus exporter.
    pub metrics: MetricsArgs,

    /// Tunnel interface.
    pub tunnel: TunnelArgs,

    /// Peer registry.
    pub peers: PeerArgs,

    /// Registration backend.
    pub backend: BackendArgs,

    /// Provider advertisement.
    pub provider: ProviderArgs,

    /// Usage metering and heartbeat.
    pub usage: UsageArgs,
}

impl NodeConfig {
    /// The configuration the command line describes on its own.
    pub fn from_args(args: &NodeArgs) -> Self {
        Self {
            api: args.api.clone(),
            metrics: args.metrics.clone(),
            tunnel: args.tunnel.clone(),
            peers: args.peers.clone(),
            backend: args.backend.clone(),
            provider: args.provider.clone(),
            usage: args.usage.clone(),
        }
    }

    /// Load configuration from defaults, environment and config file, then
    /// apply every field of `cli` that differs from its default.
    pub fn load(config_path: Option<&Path>, cli: &Self) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(eyre!("Config file {} does not exist", path.display()));
            }
            figment = figment.merge(Toml::file(path));
        }

        let defaults = serde_json::to_value(Self::default())?;
        let overrides = serde_json::to_value(cli)?;
        if let Some(changed) = changed_fields(overrides, &defaults) {
            figment = figment.merge(Serialized::defaults(changed));
        }

        figment.extract().wrap_err("Failed to load configuration")
    }

    /// Settings the node cannot run without.
    pub fn required(&self) -> Result<RequiredSettings> {
        let backend_url = self
            .backend
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| eyre!("Missing backend URL (set BACKEND_URL or --backend.url)"))?;
        let provider_wallet = self.provider.wallet.ok_or_else(|| {
            eyre!("Missing provider wallet (set PROVIDER_WALLET or --provider.wallet)")
        })?;

        Ok(RequiredSettings {
            backend_url,
            provider_wallet,
        })
    }
}

/// Values validated at startup, before the interface is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredSettings {
    pub backend_url: String,
    pub provider_wallet: WalletAddress,
}

/// Fields of `value` that differ from `base`, or `None` when nothing does.
fn changed_fields(value: Value, base: &Value) -> Option<Value> {
    match (value, base) {
        (Value::Object(fields), Value::Object(base_fields)) => {
            let changed: Map<String, Value> = fields
                .into_iter()
                .filter_map(|(key, field)| match base_fields.get(&key) {
                    Some(base_field) => changed_fields(field, base_field).map(|f| (key, f)),
                    None => Some((key, field)),
                })
                .collect();
            (!changed.is_empty()).then_some(Value::Object(changed))
        }
        (value, base) => (value != *base).then_some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.tunnel.interface, "wg0");
        assert_eq!(config.api.port, 4000);
        assert_eq!(config.usage.report_interval_ms, 60_000);
        assert_eq!(config.usage.heartbeat_interval_secs, 120);
        assert!(config.backend.url.is_none());
    }

    #[test]
    fn test_layering() {
        Jail::expect_with(|jail| {
            jail.set_env("WAYFARE_TUNNEL__INTERFACE", "wg-env");
            jail.set_env("WAYFARE_PROVIDER__REGION", "env-region");
            jail.set_env("WAYFARE_USAGE__MAX_PENDING", "5");
            jail.create_file(
                "config.toml",
                r#"
[provider]
region = "file-region"
capacity_mbps = 250

[backend]
url = "https://file.example/api"
"#,
            )?;

            let mut cli = NodeConfig::default();
            cli.provider.capacity_mbps = 500;

            let config = NodeConfig::load(Some(Path::new("config.toml")), &cli)
                .map_err(|e| e.to_string())?;

            // env only
            assert_eq!(config.tunnel.interface, "wg-env");
            assert_eq!(config.usage.max_pending, 5);
            // file over env
            assert_eq!(config.provider.region, "file-region");
            assert_eq!(config.backend.url.as_deref(), Some("https://file.example/api"));
            // cli over file
            assert_eq!(config.provider.capacity_mbps, 500);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(NodeConfig::load(Some(&path), &NodeConfig::default()).is_err());
    }

    #[test]
    fn test_required_settings() {
        let mut config = NodeConfig::default();
        let err = config.required().unwrap_err();
        assert!(err.to_string().contains("backend URL"));

        config.backend.url = Some("https://backend.example/api".to_string());
        let err = config.required().unwrap_err();
        assert!(err.to_string().contains("provider wallet"));

        config.provider.wallet = Some(WalletAddress::repeat_byte(0x11));
        let required = config.required().unwrap();
        assert_eq!(required.backend_url, "https://backend.example/api");
        assert_eq!(required.provider_wallet, WalletAddress::repeat_byte(0x11));
    }

    #[test]
    fn test_changed_fields() {
        let base = json!({ "a": { "x": 1, "y": 2 }, "b": "same" });
        let value = json!({ "a": { "x": 1, "y": 3 }, "b": "same", "c": true });

        assert_eq!(
            changed_fields(value, &base),
            Some(json!({ "a": { "y": 3 }, "c": true }))
        );
        assert_eq!(changed_fields(base.clone(), &base), None);
    }
}
