use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

/// Live ingestion policy: threshold + delta + sample interval + stop timeout.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Power above which a channel counts as running (W)
    pub power_threshold_w: f64,
    /// Power change that forces a write while running (W)
    pub delta_threshold_w: f64,
    /// Silence after which a synthetic stop row is written
    pub stop_timeout: Duration,
    /// Checkpoint interval while running, in minutes
    pub sample_interval_minutes: u32,
    /// Per-channel overrides of `sample_interval_minutes`, keyed by channel label
    pub channel_sample_intervals: HashMap<String, u32>,
    /// Upper bound of events accepted by one batch submission
    pub batch_max_events: usize,
}

impl IngestConfig {
    /// Sample interval for a channel, never zero.
    #[must_use]
    pub fn sample_interval_for(&self, channel: &str) -> u32 {
        self.channel_sample_intervals
            .get(channel)
            .copied()
            .unwrap_or(self.sample_interval_minutes)
            .max(1)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            power_threshold_w: 10.0,
            delta_threshold_w: 50.0,
            stop_timeout: Duration::from_secs(120),
            sample_interval_minutes: 2,
            channel_sample_intervals: HashMap::new(),
            batch_max_events: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub gap_threshold_minutes: i64,
    pub min_duration_minutes: i64,
    pub default_lookback_days: i64,
    /// Plausible mains band used for the voltage median
    pub voltage_min_v: f64,
    pub voltage_max_v: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            gap_threshold_minutes: 4,
            min_duration_minutes: 2,
            default_lookback_days: 7,
            voltage_min_v: 180.0,
            voltage_max_v: 260.0,
        }
    }
}

/// Emission factors for the CO2e avoided estimate.
#[derive(Debug, Clone)]
pub struct ImpactConfig {
    pub default_dbo5_mg_l: f64,
    pub bo_factor: f64,
    pub mcf_fosse: f64,
    pub mcf_fpv: f64,
    pub gwp_ch4: f64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            default_dbo5_mg_l: 570.0,
            bo_factor: 0.6,
            mcf_fosse: 0.5,
            mcf_fpv: 0.03,
            gwp_ch4: 28.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // API settings
    pub api_host: String,
    pub api_port: u16,

    // Rate limiting
    pub disable_rate_limiting: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,

    // Caching
    pub cache_ttl_seconds: u64,
    pub cache_max_bytes: u64,

    // Domain settings
    pub ingest: IngestConfig,
    pub cycles: CycleConfig,
    pub impact: ImpactConfig,

    // Application metadata
    pub deployment: Deployment,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set,
    /// or `ConfigError::Invalid` if `CHANNEL_SAMPLE_INTERVALS` cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let ingest_defaults = IngestConfig::default();
        let cycle_defaults = CycleConfig::default();
        let impact_defaults = ImpactConfig::default();

        let channel_sample_intervals = match env::var("CHANNEL_SAMPLE_INTERVALS") {
            Ok(raw) => parse_channel_intervals(&raw)?,
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // API settings
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env_or("API_PORT", 3000),

            // Rate limiting
            disable_rate_limiting: env_or("DISABLE_RATE_LIMITING", false),
            rate_limit_per_second: env_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst: env_or("RATE_LIMIT_BURST", 60),

            // Caching
            cache_ttl_seconds: env_or("CACHE_TTL_SECONDS", 300),
            cache_max_bytes: env_or("CACHE_MAX_BYTES", 52_428_800), // 50MB default

            ingest: IngestConfig {
                power_threshold_w: env_or("POWER_THRESHOLD_W", ingest_defaults.power_threshold_w),
                delta_threshold_w: env_or("DELTA_THRESHOLD_W", ingest_defaults.delta_threshold_w),
                stop_timeout: Duration::from_secs(env_or(
                    "STOP_TIMEOUT_SECONDS",
                    ingest_defaults.stop_timeout.as_secs(),
                )),
                sample_interval_minutes: env_or(
                    "SAMPLE_INTERVAL_MINUTES",
                    ingest_defaults.sample_interval_minutes,
                ),
                channel_sample_intervals,
                batch_max_events: env_or("BATCH_MAX_EVENTS", ingest_defaults.batch_max_events),
            },

            cycles: CycleConfig {
                gap_threshold_minutes: env_or(
                    "GAP_THRESHOLD_MINUTES",
                    cycle_defaults.gap_threshold_minutes,
                ),
                min_duration_minutes: env_or(
                    "MIN_CYCLE_DURATION_MINUTES",
                    cycle_defaults.min_duration_minutes,
                ),
                default_lookback_days: env_or(
                    "DEFAULT_DAYS_HISTORY",
                    cycle_defaults.default_lookback_days,
                ),
                voltage_min_v: env_or("VOLTAGE_MIN_V", cycle_defaults.voltage_min_v),
                voltage_max_v: env_or("VOLTAGE_MAX_V", cycle_defaults.voltage_max_v),
            },

            impact: ImpactConfig {
                default_dbo5_mg_l: env_or("DEFAULT_DBO5_MG_L", impact_defaults.default_dbo5_mg_l),
                bo_factor: env_or("CO2E_BO_FACTOR", impact_defaults.bo_factor),
                mcf_fosse: env_or("CO2E_MCF_FOSSE", impact_defaults.mcf_fosse),
                mcf_fpv: env_or("CO2E_MCF_FPV", impact_defaults.mcf_fpv),
                gwp_ch4: env_or("CO2E_GWP_CH4", impact_defaults.gwp_ch4),
            },

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        })
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse `"switch:0=1,switch:2=5"` into a channel -> interval map.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` on a malformed pair or a zero interval.
pub fn parse_channel_intervals(raw: &str) -> Result<HashMap<String, u32>, ConfigError> {
    let mut intervals = HashMap::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (channel, minutes) = pair
            .rsplit_once('=')
            .ok_or_else(|| ConfigError::Invalid("CHANNEL_SAMPLE_INTERVALS", pair.to_string()))?;

        let minutes: u32 = minutes
            .trim()
            .parse()
            .ok()
            .filter(|m| *m > 0)
            .ok_or_else(|| ConfigError::Invalid("CHANNEL_SAMPLE_INTERVALS", pair.to_string()))?;

        intervals.insert(channel.trim().to_string(), minutes);
    }

    Ok(intervals)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
