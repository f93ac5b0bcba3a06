// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Logging and metrics setup for the `helm-cache` binary

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// `RUST_LOG` wins over `level` when set
fn log_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create log filter")
}

fn build_subscriber<W>(filter: EnvFilter, format: &str, writer: W) -> BoxedSubscriber
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => Box::new(builder.json().with_current_span(true).finish()),
        _ => Box::new(builder.compact().finish()),
    }
}

/// Initialize tracing subscriber for logging.
///
/// `format` is `text` or `json`.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let subscriber = build_subscriber(log_filter(level)?, format, std::io::stdout);
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

/// Run `f` under a temporary subscriber, for work done before the
/// configured logging exists (loading the configuration itself).
///
/// Flags apply when given; otherwise `info` and text output.
pub fn with_startup_logging<T>(level: Option<&str>, format: Option<&str>, f: impl FnOnce() -> T) -> Result<T> {
    let subscriber = build_subscriber(
        log_filter(level.unwrap_or("info"))?,
        format.unwrap_or("text"),
        std::io::stdout,
    );
    Ok(tracing::subscriber::with_default(subscriber, f))
}

/// Serve Prometheus metrics on `0.0.0.0:<port>/metrics`
pub fn install_metrics_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start Prometheus exporter on {}", addr))?;

    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_cache_core::domain::collector_config::CollectorConfigManifest;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_overrides_are_logged_during_startup() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = build_subscriber(EnvFilter::new("info"), "text", move || writer.clone());

        let config = tracing::subscriber::with_default(subscriber, || {
            let mut config = CollectorConfigManifest::default();
            config.apply_overrides_from(|key| {
                (key == "CHARTMUSEUM_URL").then(|| "http://museum:8080".to_string())
            });
            config
        });

        assert_eq!(config.spec.registry.url, "http://museum:8080");
        assert!(captured.text().contains("Environment override: CHARTMUSEUM_URL=http://museum:8080"));
    }

    #[test]
    fn test_startup_logging_returns_closure_result() {
        let value = with_startup_logging(Some("warn"), Some("json"), || 42).unwrap();
        assert_eq!(value, 42);
    }
}
