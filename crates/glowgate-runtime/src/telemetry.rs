//! Tracing and OpenTelemetry initialisation for the gateway process.
//!
//! The binary resolves a [`TelemetryConfig`] from its own configuration
//! (file plus environment) and calls [`init_tracing`] once, before serving.
//!
//! | Setting | Effect |
//! |---|---|
//! | [`TelemetryConfig::log_format`] | `compact` console lines or newline-delimited JSON. |
//! | [`TelemetryConfig::default_filter`] | Filter used when `RUST_LOG` is unset. |
//! | [`TelemetryConfig::otlp_endpoint`] | When set, spans (including per-request spans) are exported over OTLP/HTTP. |

use std::fmt;
use std::str::FromStr;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console log encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        })
    }
}

/// Everything [`init_tracing`] needs to know about the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `service.name` on exported spans; also the tracer name.
    pub service_name: String,
    /// `service.version` on exported spans.
    pub service_version: String,
    pub log_format: LogFormat,
    pub default_filter: String,
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    /// Compact logs at `info`, no span export.
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            log_format: LogFormat::Compact,
            default_filter: "info".to_string(),
            otlp_endpoint: None,
        }
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attribute(KeyValue::new("service.version", self.service_version.clone()))
            .build()
    }
}

/// Install the global `tracing` subscriber.
///
/// The returned [`TracerProviderGuard`] must be held for the lifetime of the
/// process; dropping it flushes pending spans. A second call keeps the first
/// subscriber and reports the conflict on stderr.
pub fn init_tracing(config: &TelemetryConfig) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let provider = build_provider(config);
    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(config.service_name.clone()))
    });

    let registry = tracing_subscriber::registry().with(env_filter).with(otel_layer);
    let installed = match config.log_format {
        LogFormat::Json => registry.with(log_fmt::layer().json()).try_init(),
        LogFormat::Compact => registry.with(log_fmt::layer().compact()).try_init(),
    };
    if let Err(e) = installed {
        eprintln!("[{}] tracing already initialised: {e}", config.service_name);
    }

    TracerProviderGuard(provider)
}

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// `None` without an endpoint or when the exporter cannot be built (reported
/// on stderr, tracing is not up yet).
fn build_provider(config: &TelemetryConfig) -> Option<SdkTracerProvider> {
    let endpoint = config.otlp_endpoint.as_deref()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[{}] OTLP exporter init failed: {e}", config.service_name))
        .ok()?;

    Some(
        SdkTracerProvider::builder()
            .with_resource(config.resource())
            // Simple exporter: no Tokio runtime needed at init time.
            .with_simple_exporter(exporter)
            .build(),
    )
}
