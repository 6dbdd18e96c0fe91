//! Process-wide `tracing` setup for programs embedding the XNav client.
//!
//! The client library itself only emits `tracing` events; robot programs and
//! tools call [`init_tracing`] once at startup to decide where they go.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `XNAV_LOG_FORMAT` | `json` for newline-delimited JSON, `pretty` for multi-line, anything else for compact lines. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL.  When set, spans are exported. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = xnav_client::telemetry::init_tracing("xnav-monitor");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Console output format selected by `XNAV_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse an `XNAV_LOG_FORMAT` value; unknown values fall back to
    /// [`LogFormat::Compact`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }

    fn from_env() -> Self {
        std::env::var("XNAV_LOG_FORMAT")
            .map(|v| Self::parse(&v))
            .unwrap_or(LogFormat::Compact)
    }
}

/// Install the global subscriber.
///
/// Safe to call more than once: later calls leave the first subscriber in
/// place and return an empty guard.  The returned [`TracerProviderGuard`]
/// must be held until shutdown; dropping it flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("xnav")));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init();

    match installed {
        Ok(()) => TracerProviderGuard(provider),
        Err(_) => {
            // Someone else owns the global subscriber; do not leak a provider
            // that nothing reports to.
            TracerProviderGuard::shutdown_now(provider);
            TracerProviderGuard(None)
        }
    }
}

/// RAII guard that shuts down the OTel [`SdkTracerProvider`] on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }

    fn shutdown_now(provider: Option<SdkTracerProvider>) {
        if let Some(provider) = provider
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[xnav] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        Self::shutdown_now(self.0.take());
    }
}

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Uses the synchronous exporter so no async runtime has to exist yet; robot
/// programs usually start logging before anything else.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[xnav] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
