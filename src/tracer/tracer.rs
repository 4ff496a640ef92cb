use opentelemetry::trace::TraceError;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Config, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;
use crate::config::settings::Tracer;

pub const TRACER_NAME: &str = "rs-emotion-detection-svc";

pub fn init_tracer_provider(tracer: &Tracer, service_name: &str) -> Result<TracerProvider, TraceError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&tracer.uri)
        .build()?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            Config::default()
                .with_resource(Resource::new(vec![KeyValue::new(SERVICE_NAME, service_name.to_string())])),
        )
        .build())
}
