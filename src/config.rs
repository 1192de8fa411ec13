//! Static runner configuration: the validated registry of known networks and
//! the RPC endpoints captured from the environment at startup.

use itertools::Itertools;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::*;

/// Registry shipped with the binary, used when no `--config-path` is given.
const EMBEDDED_REGISTRY: &str = include_str!("../configs/runners.json");

/// Environment variables holding RPC endpoints are named
/// `RPC_URL_<NETWORK>`, e.g. `RPC_URL_FTM`.
pub const RPC_URL_VAR_PREFIX: &str = "RPC_URL_";

/// Snapshot artifact the parser writes for each registry key.
const ARTIFACTS: &[(&str, &str)] = &[
    ("FANTOM", "FTM_granary.json"),
    ("OPTIMISM", "optimism_granary.json"),
    ("FMONEY", "fantom_fmoney.json"),
];

fn artifact_for(key: &str) -> Option<&'static str> {
    ARTIFACTS
        .iter()
        .find_map(|(known, artifact)| (*known == key).then_some(*artifact))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Cannot start runner with {}. Available networks: {}",
        describe_request(.requested.as_ref()),
        .available.join(", ")
    )]
    ConfigNotFound { requested: Option<String>, available: Vec<String> },

    #[error("Could not find rpc url in env variable {var} for network {network}")]
    MissingRpcUrl { network: String, var: String },

    #[error("Invalid network registry: {0}")]
    InvalidRegistry(String),

    #[error("Failed to read network registry from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse network registry")]
    Json(#[from] serde_json::Error),
}

fn describe_request(requested: Option<&String>) -> String {
    match requested {
        Some(network) => format!("unknown network `{network}`"),
        None => "no network as first argument".to_string(),
    }
}

/// The lending protocol fork a runner scrapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Aave-style fork.
    Granary,
    /// Compound-style fork.
    Fmoney,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Granary => write!(f, "granary"),
            Protocol::Fmoney => write!(f, "fmoney"),
        }
    }
}

/// A single protocol deployment on a single network.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Registry key the runner was invoked with, e.g. `FANTOM`.
    #[serde(skip)]
    pub key: String,

    /// Snapshot artifact name, filled in from the static mapping.
    #[serde(skip)]
    pub artifact: String,

    pub protocol: Protocol,

    /// Network identifier understood by the pricing API, e.g. `ftm`.
    pub network: String,

    pub token_address: String,

    /// Protocol-specific fields, passed through to the parser untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Registry entries in document order, repeated keys included.
struct RawRegistry(Vec<(String, NetworkConfig)>);

impl<'de> Deserialize<'de> for RawRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawRegistry;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of network keys to network configurations")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(RawRegistry(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Every network a runner can be started for, validated once at startup.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkRegistry {
    /// The registry bundled from `configs/runners.json`.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_REGISTRY)
    }

    /// Read and validate a registry from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading network registry from {}", path.display());

        let json = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Io { path: path.display().to_string(), source }
        })?;

        Self::from_json(&json)
    }

    /// Parse and validate a registry. Keys are case-folded to upper case and
    /// each must have a snapshot artifact mapping. A key given twice, in any
    /// case, is rejected.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let RawRegistry(raw) = serde_json::from_str(json)?;
        if raw.is_empty() {
            return Err(ConfigError::InvalidRegistry(
                "no networks configured".to_string(),
            ));
        }

        let mut networks = BTreeMap::new();
        for (key, mut config) in raw {
            let key = key.to_uppercase();

            let artifact = artifact_for(&key).ok_or_else(|| {
                ConfigError::InvalidRegistry(format!(
                    "no output artifact is mapped for network {key}"
                ))
            })?;

            if config.network.trim().is_empty() {
                return Err(ConfigError::InvalidRegistry(format!(
                    "network {key} has an empty network identifier"
                )));
            }

            if config.token_address.trim().is_empty() {
                return Err(ConfigError::InvalidRegistry(format!(
                    "network {key} has an empty token address"
                )));
            }

            config.key = key.clone();
            config.artifact = artifact.to_string();

            if networks.insert(key.clone(), config).is_some() {
                return Err(ConfigError::InvalidRegistry(format!(
                    "network {key} is configured more than once"
                )));
            }
        }

        debug!("Loaded networks: {}", networks.keys().join(", "));
        Ok(Self { networks })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// Look up the configuration for the network argument. A missing or
    /// unknown argument lists every valid key.
    pub fn resolve(
        &self,
        requested: Option<&str>,
    ) -> Result<&NetworkConfig, ConfigError> {
        requested
            .and_then(|network| self.networks.get(&network.to_uppercase()))
            .ok_or_else(|| ConfigError::ConfigNotFound {
                requested: requested.map(str::to_string),
                available: self.keys().map(str::to_string).collect(),
            })
    }
}

/// RPC endpoints read from the environment once at startup.
#[derive(Debug, Clone, Default)]
pub struct RpcEndpoints {
    urls: BTreeMap<String, String>,
}

impl RpcEndpoints {
    /// Capture every `RPC_URL_*` variable from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    /// Keep the `RPC_URL_*` entries of the given variables. Blank values are
    /// treated as unset.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let urls = vars
            .into_iter()
            .map(|(name, value)| -> (String, String) {
                (name.into(), value.into())
            })
            .filter(|(name, value)| {
                name.starts_with(RPC_URL_VAR_PREFIX) && !value.trim().is_empty()
            })
            .collect();

        Self { urls }
    }

    /// Name of the variable holding the RPC endpoint for `network`.
    pub fn var_name(network: &str) -> String {
        format!("{RPC_URL_VAR_PREFIX}{}", network.to_uppercase().replace('-', "_"))
    }

    pub fn resolve(&self, network: &str) -> Result<&str, ConfigError> {
        let var = Self::var_name(network);
        match self.urls.get(&var) {
            Some(url) => Ok(url.trim()),
            None => Err(ConfigError::MissingRpcUrl {
                network: network.to_string(),
                var,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_registry_is_valid() -> anyhow::Result<()> {
        let registry = NetworkRegistry::embedded()?;
        assert_eq!(registry.keys().collect_vec(), ["FANTOM", "FMONEY", "OPTIMISM"]);

        let fmoney = registry.resolve(Some("FMONEY"))?;
        assert_eq!(fmoney.protocol, Protocol::Fmoney);
        assert_eq!(fmoney.network, "ftm");
        assert_eq!(fmoney.artifact, "fantom_fmoney.json");

        let optimism = registry.resolve(Some("OPTIMISM"))?;
        assert_eq!(optimism.artifact, "optimism_granary.json");

        Ok(())
    }

    #[test]
    fn test_resolve_is_case_insensitive() -> anyhow::Result<()> {
        let registry = NetworkRegistry::embedded()?;
        let fantom = registry.resolve(Some("fantom"))?;
        assert_eq!(fantom.key, "FANTOM");
        assert_eq!(fantom.artifact, "FTM_granary.json");
        Ok(())
    }

    #[test]
    fn test_unknown_network_lists_every_key() -> anyhow::Result<()> {
        let registry = NetworkRegistry::embedded()?;

        let err = registry.resolve(Some("ARBITRUM")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown network `ARBITRUM`"), "{message}");
        assert!(message.contains("FANTOM, FMONEY, OPTIMISM"), "{message}");

        let err = registry.resolve(None).unwrap_err();
        match err {
            ConfigError::ConfigNotFound { requested, available } => {
                assert_eq!(requested, None);
                assert_eq!(available, ["FANTOM", "FMONEY", "OPTIMISM"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn test_protocol_fields_are_passed_through() -> anyhow::Result<()> {
        let registry = NetworkRegistry::from_json(
            r#"{
                "fantom": {
                    "protocol": "granary",
                    "network": "ftm",
                    "tokenAddress": "0xABC",
                    "lendingPool": "0xDEF",
                    "deployBlock": 1234
                }
            }"#,
        )?;

        let fantom = registry.resolve(Some("FANTOM"))?;
        assert_eq!(fantom.token_address, "0xABC");
        assert_eq!(fantom.extra["lendingPool"], "0xDEF");
        assert_eq!(fantom.extra["deployBlock"], 1234);

        Ok(())
    }

    #[test]
    fn test_invalid_registries_fail_fast() {
        let unmapped = r#"{
            "ARBITRUM": { "protocol": "granary", "network": "arb", "tokenAddress": "0x1" }
        }"#;
        assert!(matches!(
            NetworkRegistry::from_json(unmapped),
            Err(ConfigError::InvalidRegistry(_))
        ));

        let empty_token = r#"{
            "FANTOM": { "protocol": "granary", "network": "ftm", "tokenAddress": " " }
        }"#;
        assert!(matches!(
            NetworkRegistry::from_json(empty_token),
            Err(ConfigError::InvalidRegistry(_))
        ));

        let duplicate = r#"{
            "FANTOM": { "protocol": "granary", "network": "ftm", "tokenAddress": "0x1" },
            "fantom": { "protocol": "granary", "network": "ftm", "tokenAddress": "0x2" }
        }"#;
        assert!(matches!(
            NetworkRegistry::from_json(duplicate),
            Err(ConfigError::InvalidRegistry(_))
        ));

        let repeated = r#"{
            "FMONEY": { "protocol": "fmoney", "network": "ftm", "tokenAddress": "0x1" },
            "FMONEY": { "protocol": "fmoney", "network": "ftm", "tokenAddress": "0x2" }
        }"#;
        let err = NetworkRegistry::from_json(repeated).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid network registry: network FMONEY is configured more than once"
        );

        assert!(matches!(
            NetworkRegistry::from_json("[]"),
            Err(ConfigError::Json(_))
        ));

        assert!(matches!(
            NetworkRegistry::from_json("{}"),
            Err(ConfigError::InvalidRegistry(_))
        ));

        let unknown_protocol = r#"{
            "FANTOM": { "protocol": "venus", "network": "ftm", "tokenAddress": "0x1" }
        }"#;
        assert!(matches!(
            NetworkRegistry::from_json(unknown_protocol),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = NetworkRegistry::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_rpc_endpoints() -> anyhow::Result<()> {
        let endpoints = RpcEndpoints::from_vars([
            ("RPC_URL_FTM", "https://rpc.ftm.example"),
            ("RPC_URL_OPTIMISM", "   "),
            ("HOME", "/root"),
        ]);

        assert_eq!(endpoints.resolve("ftm")?, "https://rpc.ftm.example");

        let err = endpoints.resolve("optimism").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find rpc url in env variable RPC_URL_OPTIMISM for network optimism"
        );

        assert_eq!(RpcEndpoints::var_name("base-sepolia"), "RPC_URL_BASE_SEPOLIA");
        assert!(endpoints.resolve("HOME").is_err());

        Ok(())
    }
}
