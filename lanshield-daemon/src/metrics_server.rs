//! Prometheus metrics endpoint.
//!
//! Uses the HTTP listener built into `metrics-exporter-prometheus`.
//! Metric names live in `lanshield_core::metrics`.

use std::net::SocketAddr;

use anyhow::Result;
use lanshield_core::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Parse the scrape listener address from configuration.
pub fn listen_address(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is served",
            config.endpoint
        ));
    }
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {e}"))
}

/// Install the global recorder and start the HTTP listener.
///
/// Call once per process; a second install fails.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_address(config)?;
    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    lanshield_core::metrics::describe_all();
    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_listen_address() {
        let addr = listen_address(&MetricsConfig::default()).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:9100");
    }

    #[test]
    fn rejects_other_endpoints() {
        let config = MetricsConfig {
            endpoint: "/stats".to_owned(),
            ..MetricsConfig::default()
        };
        assert!(listen_address(&config).is_err());
    }

    #[test]
    fn rejects_bad_address() {
        let config = MetricsConfig {
            listen_addr: "not-an-ip".to_owned(),
            ..MetricsConfig::default()
        };
        assert!(listen_address(&config).is_err());
    }
}
