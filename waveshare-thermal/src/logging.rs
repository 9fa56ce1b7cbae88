// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Structured logging setup for the module binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "waveshare_thermal=info";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`, which takes precedence over [`DEFAULT_FILTER`].
pub fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!("waveshare_thermal={}", level)),
        None => EnvFilter::new(DEFAULT_FILTER),
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .compact(),
        )
        .try_init()?;

    tracing::debug!("Structured logging initialized");
    Ok(())
}

/// Route logs to the test harness. Safe to call from every test.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("waveshare_thermal=debug"))
        .with(fmt::layer().with_test_writer().compact())
        .try_init();
}
