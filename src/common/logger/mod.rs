use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;

pub use formatter::*;

use crate::configs::Config;

fn filter_directive(config: &Config) -> String {
    let log_level = config
        .logging
        .as_ref()
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    let filters = config
        .logging
        .as_ref()
        .and_then(|l| l.filters.as_deref())
        .unwrap_or("");

    if filters.is_empty() {
        format!("{},hyper=warn,reqwest=warn", log_level)
    } else {
        format!("{},hyper=warn,reqwest=warn,{}", log_level, filters)
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the config.
pub fn init(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stdout_layer = fmt::layer()
        .event_format(CustomFormatter::new(true))
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::LoggingConfig;

    #[test]
    fn test_filter_directive_from_config() {
        let mut config = Config::default();
        assert_eq!(filter_directive(&config), "info,hyper=warn,reqwest=warn");

        config.logging = Some(LoggingConfig {
            level: Some("debug".into()),
            filters: Some("ytpipe::sources=trace".into()),
        });
        assert_eq!(
            filter_directive(&config),
            "debug,hyper=warn,reqwest=warn,ytpipe::sources=trace"
        );
    }
}
