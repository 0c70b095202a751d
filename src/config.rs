use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::ConfigError;

pub const DEFAULT_CAPACITY: u32 = 5;
pub const DEFAULT_REFILL_WINDOW: Duration = Duration::from_secs(10);
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(60);
pub const DEFAULT_GRACE: Duration = Duration::from_micros(100);

// How a client identity is derived from the connection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityMode {
    // Peer IP address only
    #[default]
    Ip,
    // Full peer socket address (ip:port)
    Socket,
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "admission-gate")]
#[command(about = "Per-client rate limiting admission layer for HTTP services")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // Bucket capacity (max burst per client)
    #[arg(long, env = "RATE_LIMIT_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: u32,

    // Seconds it takes to refill a whole bucket
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value_t = DEFAULT_REFILL_WINDOW.as_secs())]
    pub refill_window: u64,

    // Sweep period in seconds, also the idle threshold for eviction
    #[arg(long, env = "RATE_LIMIT_SWEEP", default_value_t = DEFAULT_SWEEP_PERIOD.as_secs())]
    pub sweep_period: u64,

    // Grace period (microseconds) a request may wait for an imminent token
    #[arg(long, env = "RATE_LIMIT_GRACE_US", default_value_t = 100)]
    pub grace_micros: u64,

    // Identity source
    #[arg(long, env = "RATE_LIMIT_IDENTITY", value_enum, default_value_t = IdentityMode::Ip)]
    pub identity: IdentityMode,

    // Base log level, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn limiter_config(&self) -> Result<LimiterConfig, ConfigError> {
        let config = LimiterConfig {
            capacity: self.capacity,
            refill_window: Duration::from_secs(self.refill_window),
            sweep_period: Duration::from_secs(self.sweep_period),
            grace: Duration::from_micros(self.grace_micros),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Tunables of the admission controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum burst per client; a fresh bucket starts with this many tokens.
    pub capacity: u32,
    /// Time for an empty bucket to refill to `capacity`.
    pub refill_window: Duration,
    /// Sweeper tick, and the idle time after which a session is evicted.
    pub sweep_period: Duration,
    /// How long a request may wait for a token that is about to accrue.
    pub grace: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            refill_window: DEFAULT_REFILL_WINDOW,
            sweep_period: DEFAULT_SWEEP_PERIOD,
            grace: DEFAULT_GRACE,
        }
    }
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.refill_window.is_zero() {
            return Err(ConfigError::ZeroDuration("refill window"));
        }
        if self.sweep_period.is_zero() {
            return Err(ConfigError::ZeroDuration("sweep period"));
        }
        Ok(())
    }

    // Time for a single token to accrue, never zero
    pub fn token_interval(&self) -> Duration {
        (self.refill_window / self.capacity.max(1)).max(Duration::from_nanos(1))
    }
}
