use {anyhow::Context, serde::Deserialize};

/// Settings shared by all pools built from snapshots.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Identifier reported in the meta info of every pool.
    #[serde(default = "default_dex_id")]
    pub dex_id: String,

    /// Gas estimate attached to every quote.
    #[serde(default = "default_swap_gas")]
    pub swap_gas: u64,
}

impl Config {
    pub fn from_toml(data: &str) -> anyhow::Result<Self> {
        toml::de::from_str(data).context("invalid balancer stable pool config")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dex_id: default_dex_id(),
            swap_gas: default_swap_gas(),
        }
    }
}

fn default_dex_id() -> String {
    "balancer-v2".to_string()
}

fn default_swap_gas() -> u64 {
    80_000
}
