use std::{collections::BTreeMap, fmt, fs, path::Path};

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 8545;
/// first hardened BIP32 child index
const MAX_ADDRESS_INDEX: u32 = 1 << 31;

/// The network id a deployment target must report. `"*"` in the config
/// accepts whatever the node answers with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawNetworkId")]
pub enum NetworkId {
    Any,
    Id(u64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNetworkId {
    Id(u64),
    Text(String),
}

impl TryFrom<RawNetworkId> for NetworkId {
    type Error = String;

    fn try_from(value: RawNetworkId) -> Result<Self, Self::Error> {
        match value {
            RawNetworkId::Id(id) => Ok(NetworkId::Id(id)),
            RawNetworkId::Text(text) if text == "*" => Ok(NetworkId::Any),
            RawNetworkId::Text(text) => text
                .parse()
                .map(NetworkId::Id)
                .map_err(|_| format!("network_id must be \"*\" or an integer, got `{text}`")),
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Any => write!(f, "*"),
            NetworkId::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Remote node reached through an RPC url, with accounts derived from a
/// mnemonic that lives outside of the configuration file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteProvider {
    pub rpc_url: String,
    /// name of the environment variable holding the mnemonic
    pub mnemonic_env: String,
    #[serde(default)]
    pub address_index: u32,
    #[serde(default = "default_num_addresses")]
    pub num_addresses: u32,
}

fn default_num_addresses() -> u32 {
    1
}

fn default_confirmations() -> usize {
    1
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(skip)]
    pub name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub network_id: NetworkId,
    /// gas limit applied to transactions sent over rpc
    pub gas: Option<u64>,
    /// gas price in wei
    pub gas_price: Option<u64>,
    /// blocks a call transaction must be buried under, 1 = mined
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    pub provider: Option<RemoteProvider>,
}

impl NetworkConfig {
    pub fn rpc_url(&self) -> String {
        match (&self.provider, &self.host) {
            (Some(provider), _) => provider.rpc_url.clone(),
            (None, Some(host)) => format!("http://{host}:{}", self.port.unwrap_or(DEFAULT_PORT)),
            // unreachable for validated configs
            (None, None) => format!("http://127.0.0.1:{DEFAULT_PORT}"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            network: self.name.clone(),
            reason: reason.to_owned(),
        };

        match (&self.host, &self.provider) {
            (Some(_), Some(_)) => return Err(invalid("set either host/port or provider, not both")),
            (None, None) => return Err(invalid("one of host/port or provider is required")),
            _ => {}
        }
        if self.port.is_some() && self.host.is_none() {
            return Err(invalid("port given without host"));
        }
        if self.gas == Some(0) {
            return Err(invalid("gas limit must be positive"));
        }

        if let Some(provider) = &self.provider {
            Url::parse(&provider.rpc_url)
                .map_err(|e| invalid(&format!("bad rpc_url `{}`: {e}", provider.rpc_url)))?;
            if provider.mnemonic_env.trim().is_empty() {
                return Err(invalid("mnemonic_env must name an environment variable"));
            }
            if provider.num_addresses == 0 {
                return Err(invalid("num_addresses must unlock at least one account"));
            }
            match provider.address_index.checked_add(provider.num_addresses) {
                Some(end) if end <= MAX_ADDRESS_INDEX => {}
                _ => return Err(invalid("address_index + num_addresses leaves the non-hardened index range")),
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates every network, so that a broken entry is
    /// reported before anything touches a chain.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        for (name, network) in config.networks.iter_mut() {
            network.name = name.clone();
            network.validate()?;
        }
        Ok(config)
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORKS: &str = r#"
        [networks.local]
        host = "127.0.0.1"
        port = 8545
        network_id = "*"

        [networks.ropsten]
        network_id = 3
        gas = 8000000
        gas_price = 20000000000

        [networks.ropsten.provider]
        rpc_url = "https://ropsten.infura.io/v3/key"
        mnemonic_env = "MNEMONIC"
        address_index = 0
        num_addresses = 2
    "#;

    #[test]
    fn test_parse_networks() {
        let config = Config::from_toml_str(NETWORKS).unwrap();

        let local = config.network("local").unwrap();
        assert_eq!(local.name, "local");
        assert_eq!(local.network_id, NetworkId::Any);
        assert_eq!(local.rpc_url(), "http://127.0.0.1:8545");
        assert!(local.provider.is_none());
        assert_eq!(local.confirmations, 1);

        let ropsten = config.network("ropsten").unwrap();
        assert_eq!(ropsten.network_id, NetworkId::Id(3));
        assert_eq!(ropsten.gas, Some(8_000_000));
        assert_eq!(ropsten.gas_price, Some(20 * 1_000_000_000));
        assert_eq!(ropsten.rpc_url(), "https://ropsten.infura.io/v3/key");
        let provider = ropsten.provider.as_ref().unwrap();
        assert_eq!(provider.mnemonic_env, "MNEMONIC");
        assert_eq!(provider.num_addresses, 2);
    }

    #[test]
    fn test_unknown_network() {
        let config = Config::from_toml_str(NETWORKS).unwrap();
        let err = config.network("staging").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNetwork(name) if name == "staging"));
    }

    #[test]
    fn test_network_id_as_string() {
        let config = Config::from_toml_str(
            r#"
            [networks.dev]
            host = "localhost"
            network_id = "1337"
            "#,
        )
        .unwrap();
        let dev = config.network("dev").unwrap();
        assert_eq!(dev.network_id, NetworkId::Id(1337));
        assert_eq!(dev.rpc_url(), "http://localhost:8545");

        let err = Config::from_toml_str(
            r#"
            [networks.dev]
            host = "localhost"
            network_id = "mainnet"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_ambiguous_endpoint() {
        let err = Config::from_toml_str(
            r#"
            [networks.both]
            host = "127.0.0.1"
            network_id = 1

            [networks.both.provider]
            rpc_url = "https://example.org"
            mnemonic_env = "MNEMONIC"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { network, .. } if network == "both"));

        let err = Config::from_toml_str(
            r#"
            [networks.neither]
            network_id = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_rejects_bad_provider() {
        let err = Config::from_toml_str(
            r#"
            [networks.remote]
            network_id = 3

            [networks.remote.provider]
            rpc_url = "not a url"
            mnemonic_env = "MNEMONIC"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = Config::from_toml_str(
            r#"
            [networks.remote]
            network_id = 3

            [networks.remote.provider]
            rpc_url = "https://example.org"
            mnemonic_env = "MNEMONIC"
            num_addresses = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_rejects_address_range_overflow() {
        let provider = |index: u32, count: u32| {
            format!(
                r#"
                [networks.remote]
                network_id = 3

                [networks.remote.provider]
                rpc_url = "https://example.org"
                mnemonic_env = "MNEMONIC"
                address_index = {index}
                num_addresses = {count}
                "#
            )
        };

        for (index, count) in [(u32::MAX, 2), (MAX_ADDRESS_INDEX, 1), (MAX_ADDRESS_INDEX - 1, 2)] {
            let err = Config::from_toml_str(&provider(index, count)).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{index} + {count}");
        }
        Config::from_toml_str(&provider(MAX_ADDRESS_INDEX - 2, 2)).unwrap();
    }

    #[test]
    fn test_rejects_inline_mnemonic() {
        // secrets are referenced by env var name, never inlined
        let err = Config::from_toml_str(
            r#"
            [networks.remote]
            network_id = 3

            [networks.remote.provider]
            rpc_url = "https://example.org"
            mnemonic = "fat puzzle vicious turtle"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
