// Logging setup - tracing-subscriber fmt output filtered by EnvFilter
//
// RUST_LOG wins when set. Otherwise the filter is the configured base level
// plus a few quieter dependencies; DEBUG=1 forces the base level to debug.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const NOISY: &[(&str, &str)] = &[("hyper", "warn"), ("hyper_util", "warn"), ("tower", "warn")];

fn debug_forced() -> bool {
    std::env::var("DEBUG").is_ok_and(|v| v == "1")
}

pub fn build_env_filter(level: &str, debug: bool) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let base = if debug { "debug" } else { level };
    let mut directives = vec![base.to_string()];
    for (target, lvl) in NOISY {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow::anyhow!("Invalid tracing filter '{}': {}", filter_str, e))
}

pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = build_env_filter(level, debug_forced())?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filter_for_known_levels() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            assert!(build_env_filter(level, false).is_ok());
        }
    }

    #[test]
    fn debug_flag_overrides_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let filter = build_env_filter("warn", true).unwrap();
        assert!(filter.to_string().contains("debug"));
    }
}
