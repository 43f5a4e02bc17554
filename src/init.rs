// Logging/tracing setup

use batchsink_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Install the global subscriber described by `config`.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the existing one is left untouched.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_new(config.log_level.trim()).unwrap_or_else(|err| {
        eprintln!(
            "batchsink: invalid log level {:?} ({}), using info",
            config.log_level, err
        );
        EnvFilter::new("info")
    });

    let output = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_keeps_first_subscriber() {
        let json = LoggingConfig {
            log_level: "not a valid filter [".to_string(),
            log_format: LogFormat::Json,
        };
        init_tracing(&json);
        assert!(!init_tracing(&LoggingConfig::default()));
        tracing::info!("still logging after repeated init");
    }
}
