use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Remote API settings
    pub api: ApiConfig,

    /// Line-delimited credential file
    pub accounts_path: String,

    /// Feature toggles
    pub features: FeatureConfig,

    /// Mining upgrade configuration
    pub mining: MiningConfig,

    /// Squad membership and donation
    pub squad: SquadConfig,

    /// Pauses between calls, accounts and cycles
    pub timing: TimingConfig,

    /// Response shape monitoring
    pub drift_guard: DriftGuardConfig,

    /// Rotating log file
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    pub user_agent: String,
    pub origin: String,
    pub referer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub enable_spin: bool,
    pub enable_combo: bool,
    pub enable_stake: bool,
    pub enable_mining_upgrade: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    pub enabled: bool,
    pub max_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Per-component settings keyed by the name used in the upgrade path
    pub components: BTreeMap<String, ComponentConfig>,

    /// Order in which components are upgraded, each one to exhaustion
    pub upgrade_sequence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SquadConfig {
    pub id: u64,

    /// Amount donated after joining; 0 disables donating
    pub donate_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub account_delay_secs: u64,
    pub cycle_delay_secs: u64,
    pub retry_backoff_secs: u64,
    pub spin_pause_ms: u64,
    pub upgrade_pause_ms: u64,

    /// Upper bound for retrying transport errors on the auth exchange
    pub auth_retry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftGuardConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
    pub max_files: usize,
}

/// Upgrade targets, cheapest last.
pub const DEFAULT_COMPONENTS: [(&str, u32); 4] =
    [("farmer", 10), ("beehive", 10), ("bee", 20), ("honey", 50)];

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            accounts_path: "data.txt".to_string(),
            features: FeatureConfig::default(),
            mining: MiningConfig::default(),
            squad: SquadConfig::default(),
            timing: TimingConfig::default(),
            drift_guard: DriftGuardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.beeharvest.life".to_string(),
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36".to_string(),
            origin: "https://beeharvest.life".to_string(),
            referer: "https://beeharvest.life/".to_string(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enable_spin: true,
            enable_combo: true,
            enable_stake: true,
            enable_mining_upgrade: true,
        }
    }
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_level: 10,
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        let components = DEFAULT_COMPONENTS
            .iter()
            .map(|(name, max_level)| {
                (
                    name.to_string(),
                    ComponentConfig {
                        enabled: true,
                        max_level: *max_level,
                    },
                )
            })
            .collect();

        Self {
            components,
            upgrade_sequence: DEFAULT_COMPONENTS
                .iter()
                .map(|(name, _)| name.to_string())
                .collect(),
        }
    }
}

impl Default for SquadConfig {
    fn default() -> Self {
        Self {
            id: 2637,
            donate_amount: 0.0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            account_delay_secs: 3,
            cycle_delay_secs: 600, // 10 minutes
            retry_backoff_secs: 60,
            spin_pause_ms: 1000,
            upgrade_pause_ms: 1000,
            auth_retry_secs: 15,
        }
    }
}

impl Default for DriftGuardConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_prefix: "beeharvest".to_string(),
            max_files: 7,
        }
    }
}

impl MiningConfig {
    /// Components in upgrade order, paired with their settings.
    pub fn ordered(&self) -> Vec<(&str, &ComponentConfig)> {
        self.upgrade_sequence
            .iter()
            .filter_map(|name| {
                self.components
                    .get(name)
                    .map(|component| (name.as_str(), component))
            })
            .collect()
    }
}

impl BotConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BotConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Read `path` if it exists, otherwise fall back to the stock settings.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(BotError::Config("api.base_url must not be empty".into()));
        }

        for name in &self.mining.upgrade_sequence {
            match self.mining.components.get(name) {
                None => {
                    return Err(BotError::Config(format!(
                        "upgrade_sequence names unknown component '{}'",
                        name
                    )))
                }
                Some(component) if component.max_level == 0 => {
                    return Err(BotError::Config(format!(
                        "component '{}' needs a max_level above 0",
                        name
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}
