use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default = "default_venue_a")]
    pub venue_a: VenueConfig,
    #[serde(default = "default_venue_b")]
    pub venue_b: VenueConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

/// One venue: where to ask, what to ask for, and what to fake when it won't answer.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub market_id: String,
    pub base_url: String,
    pub sim_price_min: f64,
    pub sim_price_max: f64,
    pub sim_volume_min: u64,
    pub sim_volume_max: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_spread_threshold")]
    pub spread_threshold: f64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    #[serde(default = "default_unit_size")]
    pub unit_size: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            spread_threshold: default_spread_threshold(),
            fee_rate: default_fee_rate(),
            unit_size: default_unit_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default)]
    pub window_before_minutes: u32,
    #[serde(default = "default_window_after")]
    pub window_after_minutes: u32,
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default)]
    pub report_trigger: ReportTrigger,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            window_before_minutes: 0,
            window_after_minutes: default_window_after(),
            utc_offset: default_utc_offset(),
            tick_secs: default_tick_secs(),
            report_trigger: ReportTrigger::default(),
        }
    }
}

/// When a fired sample also regenerates the report. Matched against the
/// slot boundary, so a sample taken at 23:58 for the 00:00 slot counts as 00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReportTrigger {
    EverySample,
    #[default]
    Hourly,
    Daily { hour: u32 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Sub-hour heatmap columns in minutes; 0 keeps one column per hour.
    #[serde(default)]
    pub sub_bucket_minutes: u32,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            sub_bucket_minutes: 0,
        }
    }
}

fn default_log_path() -> PathBuf { PathBuf::from("spread_log.csv") }
fn default_http_timeout() -> u64 { 10 }
fn default_spread_threshold() -> f64 { 0.03 }
fn default_fee_rate() -> f64 { 0.015 }
fn default_unit_size() -> f64 { 100.0 }
fn default_interval_minutes() -> u32 { 60 }
fn default_window_after() -> u32 { 1 }
fn default_utc_offset() -> String { "+00:00".to_string() }
fn default_tick_secs() -> u64 { 20 }
fn default_output_dir() -> PathBuf { PathBuf::from("spread_reports") }

fn default_venue_a() -> VenueConfig {
    VenueConfig {
        market_id: "bitcoin-price-prediction-8h".to_string(),
        base_url: "https://gamma-api.polymarket.com".to_string(),
        sim_price_min: 0.45,
        sim_price_max: 0.55,
        sim_volume_min: 1_000,
        sim_volume_max: 10_000,
    }
}

fn default_venue_b() -> VenueConfig {
    VenueConfig {
        market_id: "btc-8h-prediction".to_string(),
        base_url: "https://api.limitless.exchange".to_string(),
        sim_price_min: 0.45,
        sim_price_max: 0.55,
        sim_volume_min: 500,
        sim_volume_max: 5_000,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            venue_a: default_venue_a(),
            venue_b: default_venue_b(),
            strategy: StrategyConfig::default(),
            schedule: ScheduleConfig::default(),
            report: ReportSettings::default(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: f64 },

    #[error("unit_size must be positive, got {0}")]
    NonPositiveUnitSize(f64),

    #[error("{0}: market_id must not be empty")]
    EmptyMarketId(&'static str),

    #[error("{0}: base_url must not be empty")]
    EmptyBaseUrl(&'static str),

    #[error("{venue}: invalid simulated {what} band [{min}, {max}]")]
    InvalidSimBand { venue: &'static str, what: &'static str, min: f64, max: f64 },

    #[error("interval_minutes must divide a day evenly, got {0}")]
    InvalidInterval(u32),

    #[error("alignment window ({before}m before + {after}m after) must be non-empty and fit inside a {interval}m interval")]
    InvalidWindow { before: u32, after: u32, interval: u32 },

    #[error("tick of {tick}s can skip a {window}s alignment window")]
    TickTooCoarse { tick: u64, window: u64 },

    #[error("sub_bucket_minutes must divide 60, got {0}")]
    InvalidSubBucket(u32),

    #[error("daily report hour must be in 0..24, got {0}")]
    InvalidReportHour(u32),

    #[error("invalid utc_offset {0:?}, expected something like \"+08:00\"")]
    InvalidUtcOffset(String),

    #[error("http_timeout_secs must be positive")]
    ZeroTimeout,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Apply environment overrides on top of the file.
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(url) = &env.venue_a_base_url {
            self.venue_a.base_url = url.clone();
        }
        if let Some(url) = &env.venue_b_base_url {
            self.venue_b.base_url = url.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("spread_threshold", self.strategy.spread_threshold)?;
        check_fraction("fee_rate", self.strategy.fee_rate)?;
        if self.strategy.unit_size.is_nan() || self.strategy.unit_size <= 0.0 {
            return Err(ConfigError::NonPositiveUnitSize(self.strategy.unit_size));
        }
        if self.system.http_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        check_venue("venue_a", &self.venue_a)?;
        check_venue("venue_b", &self.venue_b)?;

        let schedule = &self.schedule;
        let interval = schedule.interval_minutes;
        if interval == 0 || (24 * 60) % interval != 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        let window = schedule.window_before_minutes + schedule.window_after_minutes;
        if schedule.window_after_minutes == 0 || window > interval {
            return Err(ConfigError::InvalidWindow {
                before: schedule.window_before_minutes,
                after: schedule.window_after_minutes,
                interval,
            });
        }
        let window_secs = u64::from(window) * 60;
        if schedule.tick_secs == 0 || schedule.tick_secs > window_secs {
            return Err(ConfigError::TickTooCoarse {
                tick: schedule.tick_secs,
                window: window_secs,
            });
        }
        if let ReportTrigger::Daily { hour } = schedule.report_trigger {
            if hour >= 24 {
                return Err(ConfigError::InvalidReportHour(hour));
            }
        }
        self.utc_offset()?;

        let sub = self.report.sub_bucket_minutes;
        if sub != 0 && 60 % sub != 0 {
            return Err(ConfigError::InvalidSubBucket(sub));
        }

        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.schedule.utc_offset)
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange { name, value })
    }
}

fn check_venue(name: &'static str, venue: &VenueConfig) -> Result<(), ConfigError> {
    if venue.market_id.trim().is_empty() {
        return Err(ConfigError::EmptyMarketId(name));
    }
    if venue.base_url.trim().is_empty() {
        return Err(ConfigError::EmptyBaseUrl(name));
    }
    let (lo, hi) = (venue.sim_price_min, venue.sim_price_max);
    if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo >= hi {
        return Err(ConfigError::InvalidSimBand { venue: name, what: "price", min: lo, max: hi });
    }
    if venue.sim_volume_min >= venue.sim_volume_max {
        return Err(ConfigError::InvalidSimBand {
            venue: name,
            what: "volume",
            min: venue.sim_volume_min as f64,
            max: venue.sim_volume_max as f64,
        });
    }
    Ok(())
}

/// Parse "+08:00", "-0530", "+8" or "Z" into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidUtcOffset(raw.to_string());
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub venue_a_base_url: Option<String>,
    pub venue_b_base_url: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            venue_a_base_url: std::env::var("VENUE_A_BASE_URL").ok(),
            venue_b_base_url: std::env::var("VENUE_B_BASE_URL").ok(),
        }
    }
}
