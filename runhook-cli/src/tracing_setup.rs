//! Logging for the runhook CLI
//!
//! Console logs always go to stderr so command output stays pipeable.
//! `RUST_LOG` overrides the level picked from `--debug`. Built with the
//! `telemetry` feature, `--otel` also exports spans over OTLP to
//! `OTEL_EXPORTER_OTLP_ENDPOINT` as `OTEL_SERVICE_NAME`.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    pub debug: bool,
    pub otel: bool,
}

fn default_directive(config: &TracingConfig) -> &'static str {
    if config.debug {
        "debug"
    } else {
        "info"
    }
}

fn env_filter(config: &TracingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(config)))
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(config: &TracingConfig) -> Result<()> {
    let console = fmt::layer()
        .with_target(config.debug)
        .with_writer(std::io::stderr)
        .compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(console);

    #[cfg(feature = "telemetry")]
    let registry = {
        let otlp = if config.otel {
            Some(otlp::tracer()?)
        } else {
            None
        };
        registry.with(otlp.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer)))
    };

    registry.try_init().map_err(|err| anyhow!(err))?;

    if config.otel && cfg!(not(feature = "telemetry")) {
        tracing::warn!("--otel ignored: built without the telemetry feature");
    }
    Ok(())
}

#[cfg(feature = "telemetry")]
mod otlp {
    use anyhow::{anyhow, Result};
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{Tracer, TracerProvider};

    const DEFAULT_ENDPOINT: &str = "http://localhost:4317";
    const DEFAULT_SERVICE: &str = "runhook";

    pub(super) fn tracer() -> Result<Tracer> {
        let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let service =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE.to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .build()
            .map_err(|err| anyhow!("failed to build OTLP exporter for {}: {}", endpoint, err))?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(opentelemetry_sdk::Resource::new(vec![KeyValue::new(
                "service.name",
                service,
            )]))
            .build();
        let tracer = provider.tracer(DEFAULT_SERVICE);

        // Export stops once the provider drops
        let _ = opentelemetry::global::set_tracer_provider(provider);
        Ok(tracer)
    }
}

/// Flush pending spans
pub fn shutdown_otel() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_default_level() {
        assert_eq!(default_directive(&TracingConfig::default()), "info");
        assert_eq!(
            default_directive(&TracingConfig {
                debug: true,
                otel: false,
            }),
            "debug"
        );
    }
}
