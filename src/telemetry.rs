use anyhow::Result;
use opentelemetry::global;
use std::fs::OpenOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn service_name() -> String {
    std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "rigger".to_string())
}

/// Sets up the tracing subscriber. The exporter is chosen via OTEL_EXPORTER:
/// "otlp" ships spans to a collector, "file" appends plain logs to LOG_FILE,
/// anything else logs to stdout.
pub fn init_telemetry() -> Result<()> {
    match std::env::var("OTEL_EXPORTER").as_deref() {
        Ok("otlp") => init_otlp(),
        Ok("file") => init_file(),
        _ => init_stdout(),
    }
}

fn init_otlp() -> Result<()> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
            opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                service_name(),
            )]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Ok(())
}

fn init_stdout() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Ok(())
}

fn init_file() -> Result<()> {
    let log_file_path =
        std::env::var("LOG_FILE").unwrap_or_else(|_| "rigger.log".to_string());
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Arc::new(log_file))
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Ok(())
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
