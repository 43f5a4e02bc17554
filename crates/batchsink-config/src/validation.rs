// Configuration validation
//
// Rejects zero-valued limits and warns about settings likely to hurt.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &SinkConfig) -> Result<()> {
    validate_producer_config(&config.producer)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

pub fn validate_producer_config(config: &ProducerConfig) -> Result<()> {
    if config.batch_size == 0 {
        bail!("producer.batch_size must be greater than 0");
    }

    if config.dispatch_workers == 0 {
        bail!("producer.dispatch_workers must be greater than 0");
    }

    if config.max_batch_age_ms == Some(0) {
        bail!("producer.max_batch_age_ms must be greater than 0 when set");
    }

    if config.max_outstanding_records == Some(0) {
        bail!("producer.max_outstanding_records must be greater than 0 when set");
    }

    if config.batch_size > 10_000 {
        warn!(
            batch_size = config.batch_size,
            "producer.batch_size is very large; remote stores usually cap batch writes"
        );
    }

    if config.dispatch_workers > 1 {
        warn!(
            dispatch_workers = config.dispatch_workers,
            "multiple dispatch workers only preserve per-worker FIFO order"
        );
    }

    if let Some(limit) = config.max_outstanding_records {
        if limit < config.batch_size {
            warn!(
                max_outstanding_records = limit,
                batch_size = config.batch_size,
                "outstanding limit below batch size; try_add rejects before a group can fill"
            );
        }
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    if config.log_level.trim().is_empty() {
        bail!("logging.log_level must not be empty");
    }
    Ok(())
}
