use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::Direction;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub pair: PairConfig,
    pub quote_venue: VenueConfig,
    pub reference_venue: VenueConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    pub dry_run: DryRunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    /// Base asset traded (e.g., "sol")
    pub base: String,
    /// Quote currency both venues price in (e.g., "usdt")
    pub quote: String,
}

impl PairConfig {
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote).to_uppercase()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Human-readable venue name, used in logs only
    pub name: String,
    /// Minimum price increment
    pub tick_size: Decimal,
    /// Volume precision; sizes are floored to a multiple of this
    pub volume_step: Decimal,
    /// Smallest order the venue accepts
    pub min_volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePriceMode {
    /// Last trade on the reference venue
    LastTrade,
    /// Exponentially decayed volume-weighted mid over the top levels
    DecayedMid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_reference_price")]
    pub reference_price: ReferencePriceMode,
    /// Levels used for the decayed mid
    #[serde(default = "default_decay_levels")]
    pub decay_levels: usize,
    /// Decay rate per level index
    #[serde(default = "default_decay_lambda")]
    pub decay_lambda: f64,
    /// Levels kept per book side
    #[serde(default = "default_book_depth")]
    pub book_depth: usize,
}

fn default_reference_price() -> ReferencePriceMode {
    ReferencePriceMode::DecayedMid
}

fn default_decay_levels() -> usize {
    10
}

fn default_decay_lambda() -> f64 {
    0.1
}

fn default_book_depth() -> usize {
    10
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            reference_price: default_reference_price(),
            decay_levels: default_decay_levels(),
            decay_lambda: default_decay_lambda(),
            book_depth: default_book_depth(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionMode {
    /// Derive direction from quote-venue inventory value
    Inventory,
    /// Use `fixed_direction` at startup, flip only on exhaustion
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Required edge over the reference price before quoting (bps)
    pub min_edge_bps: u32,
    /// Resting orders whose edge falls below this are cancelled (bps)
    pub cancel_edge_bps: u32,
    /// Resting orders whose edge grows beyond this are cancelled (bps)
    #[serde(default)]
    pub max_edge_bps: Option<u32>,
    /// Tick steps the quote may walk from the edge floor toward the book
    #[serde(default = "default_max_walk_ticks")]
    pub max_walk_ticks: u32,
    /// Maximum age of a resting order in milliseconds
    pub order_ttl_ms: u64,
    /// Hard cap on a single resting order
    #[serde(default)]
    pub max_order_volume: Option<Decimal>,
    #[serde(default = "default_direction_mode")]
    pub direction_mode: DirectionMode,
    #[serde(default)]
    pub fixed_direction: Option<Direction>,
}

fn default_max_walk_ticks() -> u32 {
    20
}

fn default_direction_mode() -> DirectionMode {
    DirectionMode::Inventory
}

impl StrategyConfig {
    pub fn min_edge(&self) -> Decimal {
        Decimal::from(self.min_edge_bps) / Decimal::from(10_000)
    }

    pub fn cancel_edge(&self) -> Decimal {
        Decimal::from(self.cancel_edge_bps) / Decimal::from(10_000)
    }

    pub fn max_edge(&self) -> Option<Decimal> {
        self.max_edge_bps
            .map(|bps| Decimal::from(bps) / Decimal::from(10_000))
    }

    pub fn order_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.order_ttl_ms as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Wait for a placement push before assuming venue state is unknown
    #[serde(default = "default_placement_timeout")]
    pub placement_timeout_ms: u64,
    /// Wait for a cancel push before assuming venue state is unknown
    #[serde(default = "default_cancel_timeout")]
    pub cancel_timeout_ms: u64,
    /// Wait for hedge confirmation before reconciling
    #[serde(default = "default_hedge_timeout")]
    pub hedge_timeout_ms: u64,
    /// Upper bound on a single venue call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_placement_timeout() -> u64 {
    3000
}

fn default_cancel_timeout() -> u64 {
    15_000
}

fn default_hedge_timeout() -> u64 {
    10_000
}

fn default_request_timeout() -> u64 {
    5000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            placement_timeout_ms: default_placement_timeout(),
            cancel_timeout_ms: default_cancel_timeout(),
            hedge_timeout_ms: default_hedge_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ExecutionConfig {
    pub fn placement_timeout(&self) -> Duration {
        Duration::from_millis(self.placement_timeout_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn hedge_timeout(&self) -> Duration {
        Duration::from_millis(self.hedge_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// Pause between the two bulk cancels
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,
    /// Wall-clock ceiling between full restarts (0 disables)
    #[serde(default = "default_restart_interval")]
    pub restart_interval_secs: u64,
    /// Time given to streams to populate books and balances at startup
    #[serde(default = "default_warmup")]
    pub warmup_ms: u64,
    /// Delay before re-running a reconciliation that failed to rebuild
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_cancel_grace() -> u64 {
    5000
}

fn default_restart_interval() -> u64 {
    // 23h58m
    86_280
}

fn default_warmup() -> u64 {
    3000
}

fn default_retry_backoff() -> u64 {
    10_000
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cancel_grace_ms: default_cancel_grace(),
            restart_interval_secs: default_restart_interval(),
            warmup_ms: default_warmup(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl RecoveryConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn restart_interval(&self) -> Option<Duration> {
        (self.restart_interval_secs > 0).then(|| Duration::from_secs(self.restart_interval_secs))
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Dry-run venue settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaperConfig {
    /// Starting balances on the quote venue
    #[serde(default)]
    pub quote_balances: std::collections::HashMap<String, Decimal>,
    /// Starting balances on the reference venue
    #[serde(default)]
    pub reference_balances: std::collections::HashMap<String, Decimal>,
    /// Fill resting orders when the venue's own book crosses them
    #[serde(default)]
    pub simulate_fills: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    /// Enable dry run mode (no real orders)
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("dry_run.enabled", true)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("XEMM_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (XEMM__STRATEGY__MIN_EDGE_BPS, etc.)
            .add_source(
                Environment::with_prefix("XEMM")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Default configuration for a SOL/USDT pair
    pub fn default_config(dry_run: bool) -> Self {
        use rust_decimal_macros::dec;

        Self {
            pair: PairConfig {
                base: "sol".to_string(),
                quote: "usdt".to_string(),
            },
            quote_venue: VenueConfig {
                name: "max".to_string(),
                tick_size: dec!(0.01),
                volume_step: dec!(0.0001),
                min_volume: dec!(0.0002),
            },
            reference_venue: VenueConfig {
                name: "gateio".to_string(),
                tick_size: dec!(0.01),
                volume_step: dec!(0.0001),
                min_volume: dec!(0.0001),
            },
            market_data: MarketDataConfig::default(),
            strategy: StrategyConfig {
                min_edge_bps: 10,
                cancel_edge_bps: 7,
                max_edge_bps: None,
                max_walk_ticks: default_max_walk_ticks(),
                order_ttl_ms: 10_000,
                max_order_volume: None,
                direction_mode: DirectionMode::Inventory,
                fixed_direction: None,
            },
            execution: ExecutionConfig::default(),
            recovery: RecoveryConfig::default(),
            paper: PaperConfig::default(),
            dry_run: DryRunConfig { enabled: dry_run },
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (label, venue) in [
            ("quote_venue", &self.quote_venue),
            ("reference_venue", &self.reference_venue),
        ] {
            if venue.tick_size <= Decimal::ZERO {
                errors.push(format!("{label}.tick_size must be positive"));
            }
            if venue.volume_step <= Decimal::ZERO {
                errors.push(format!("{label}.volume_step must be positive"));
            }
            if venue.min_volume < venue.volume_step {
                errors.push(format!("{label}.min_volume must be at least volume_step"));
            }
        }

        if self.pair.base.trim().is_empty() || self.pair.quote.trim().is_empty() {
            errors.push("pair.base and pair.quote must be set".to_string());
        }

        // Validate strategy params
        if self.strategy.min_edge_bps == 0 {
            errors.push("min_edge_bps must be positive".to_string());
        }

        if self.strategy.cancel_edge_bps > self.strategy.min_edge_bps {
            errors.push(
                "cancel_edge_bps should not exceed min_edge_bps (fresh quotes would be cancelled)"
                    .to_string(),
            );
        }

        if let Some(max_edge) = self.strategy.max_edge_bps {
            if max_edge <= self.strategy.min_edge_bps {
                errors.push("max_edge_bps must exceed min_edge_bps".to_string());
            }
        }

        if self.strategy.order_ttl_ms == 0 {
            errors.push("order_ttl_ms must be positive".to_string());
        }

        if self.strategy.direction_mode == DirectionMode::Fixed
            && self.strategy.fixed_direction.is_none()
        {
            errors.push("fixed_direction is required when direction_mode = fixed".to_string());
        }

        if let Some(cap) = self.strategy.max_order_volume {
            if cap < self.quote_venue.min_volume {
                errors.push("max_order_volume is below quote_venue.min_volume".to_string());
            }
        }

        if self.market_data.reference_price == ReferencePriceMode::DecayedMid
            && (self.market_data.decay_levels == 0 || self.market_data.decay_lambda < 0.0)
        {
            errors.push("decayed mid needs decay_levels > 0 and decay_lambda >= 0".to_string());
        }

        if self.market_data.book_depth < self.market_data.decay_levels {
            errors.push("book_depth must cover decay_levels".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default_config(true);
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy.min_edge(), dec!(0.001));
        assert_eq!(config.strategy.cancel_edge(), dec!(0.0007));
        assert_eq!(config.pair.symbol(), "SOLUSDT");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default_config(true);
        config.quote_venue.tick_size = Decimal::ZERO;
        config.strategy.cancel_edge_bps = 20;
        config.strategy.direction_mode = DirectionMode::Fixed;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("tick_size")));
        assert!(errors.iter().any(|e| e.contains("cancel_edge_bps")));
        assert!(errors.iter().any(|e| e.contains("fixed_direction")));
    }

    #[test]
    fn test_restart_interval_zero_disables() {
        let mut recovery = RecoveryConfig::default();
        assert!(recovery.restart_interval().is_some());
        recovery.restart_interval_secs = 0;
        assert!(recovery.restart_interval().is_none());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = std::env::temp_dir().join(format!("xemm-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            r#"
[pair]
base = "sol"
quote = "usdt"

[quote_venue]
name = "max"
tick_size = "0.01"
volume_step = "0.0001"
min_volume = "0.0002"

[reference_venue]
name = "gateio"
tick_size = "0.01"
volume_step = "0.0001"
min_volume = "0.0001"

[strategy]
min_edge_bps = 10
cancel_edge_bps = 7
order_ttl_ms = 10000
direction_mode = "fixed"
fixed_direction = "quote_venue_sells"

[recovery]
cancel_grace_ms = 250
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.quote_venue.min_volume, dec!(0.0002));
        assert_eq!(config.strategy.fixed_direction, Some(Direction::QuoteVenueSells));
        assert_eq!(config.recovery.cancel_grace_ms, 250);
        assert_eq!(config.execution.placement_timeout_ms, 3000);
        assert!(config.dry_run.enabled);
        assert!(config.validate().is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
