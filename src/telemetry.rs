use base64::Engine;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry_otlp::{MetricExporter, Protocol, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::metrics::periodic_reader_with_async_runtime::PeriodicReader;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::trace::span_processor_with_async_runtime::BatchSpanProcessor;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{ExporterKind, ObservabilityConfig};
use crate::error::Outcome;

const INSTRUMENTATION_SCOPE: &str = "chat-proxy";

#[derive(Clone)]
pub struct Metrics {
    requests: Counter<u64>,
    outcomes: Counter<u64>,
    latency_ms: Histogram<f64>,
}

impl Metrics {
    fn from_meter(meter: &Meter) -> Self {
        let requests = meter
            .u64_counter("chat.proxy.requests")
            .with_description("Chat requests received")
            .build();
        let outcomes = meter
            .u64_counter("chat.proxy.outcomes")
            .with_description("Chat requests by terminal outcome")
            .build();
        let latency_ms = meter
            .f64_histogram("chat.proxy.latency_ms")
            .with_unit("ms")
            .with_description("Chat request latency in ms")
            .build();
        Self {
            requests,
            outcomes,
            latency_ms,
        }
    }

    /// Instruments on the global meter; no-op until a provider is installed.
    pub fn noop() -> Self {
        Self::from_meter(&global::meter(INSTRUMENTATION_SCOPE))
    }

    pub fn record_request(&self) {
        self.requests.add(1, &[]);
    }

    pub fn record_outcome(&self, outcome: Outcome, latency: Duration) {
        let attrs = [KeyValue::new("outcome", outcome.as_str())];
        self.outcomes.add(1, &attrs);
        self.latency_ms.record(latency.as_secs_f64() * 1000.0, &attrs);
    }
}

/// Owns the SDK providers so they can be flushed on shutdown.
pub struct Telemetry {
    pub metrics: Metrics,
    tracer_provider: SdkTracerProvider,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    pub fn init(config: &ObservabilityConfig) -> Self {
        let resource = || {
            Resource::builder()
                .with_service_name(config.service_name.clone())
                .build()
        };

        let tracer_provider = match build_span_exporter(config) {
            Ok(Some(exporter)) => SdkTracerProvider::builder()
                .with_span_processor(BatchSpanProcessor::builder(exporter, runtime::Tokio).build())
                .with_resource(resource())
                .build(),
            Ok(None) => SdkTracerProvider::builder().with_resource(resource()).build(),
            Err(err) => {
                eprintln!("tracing init error (fallback to noop): {}", err);
                SdkTracerProvider::builder().with_resource(resource()).build()
            }
        };
        global::set_tracer_provider(tracer_provider.clone());

        let (metrics, meter_provider) = match build_metric_exporter(config) {
            Ok(Some(exporter)) => {
                let provider = SdkMeterProvider::builder()
                    .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
                    .with_resource(resource())
                    .build();
                let metrics = Metrics::from_meter(&provider.meter(INSTRUMENTATION_SCOPE));
                global::set_meter_provider(provider.clone());
                (metrics, Some(provider))
            }
            Ok(None) => (Metrics::noop(), None),
            Err(err) => {
                eprintln!("metrics init error (fallback to noop): {}", err);
                (Metrics::noop(), None)
            }
        };

        Self {
            metrics,
            tracer_provider,
            meter_provider,
        }
    }

    pub fn shutdown(self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            tracing::warn!("tracer provider shutdown failed: {}", err);
        }
        if let Some(provider) = self.meter_provider {
            if let Err(err) = provider.shutdown() {
                tracing::warn!("meter provider shutdown failed: {}", err);
            }
        }
    }
}

fn langfuse_headers(config: &ObservabilityConfig) -> HashMap<String, String> {
    let auth = base64::engine::general_purpose::STANDARD.encode(format!(
        "{}:{}",
        config.otlp_http.public_key, config.otlp_http.secret_key
    ));
    HashMap::from([(String::from("Authorization"), format!("Basic {}", auth))])
}

fn build_span_exporter(config: &ObservabilityConfig) -> Result<Option<SpanExporter>, String> {
    let exporter = match config.exporters.tracing {
        ExporterKind::None => return Ok(None),
        ExporterKind::OtlpGrpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.otlp_grpc.endpoint.clone())
            .with_timeout(Duration::from_millis(config.otlp_grpc.timeout_ms))
            .build(),
        ExporterKind::LangfuseHttp => SpanExporter::builder()
            .with_http()
            .with_endpoint(config.otlp_http.traces_endpoint())
            .with_protocol(Protocol::HttpBinary)
            .with_timeout(Duration::from_millis(config.otlp_http.timeout_ms))
            .with_headers(langfuse_headers(config))
            .build(),
    };
    exporter
        .map(Some)
        .map_err(|e| format!("trace exporter init error: {}", e))
}

fn build_metric_exporter(config: &ObservabilityConfig) -> Result<Option<MetricExporter>, String> {
    let exporter = match config.exporters.metrics {
        ExporterKind::None => return Ok(None),
        ExporterKind::OtlpGrpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.otlp_grpc.endpoint.clone())
            .with_protocol(Protocol::Grpc)
            .with_timeout(Duration::from_millis(config.otlp_grpc.timeout_ms))
            .build(),
        ExporterKind::LangfuseHttp => MetricExporter::builder()
            .with_http()
            .with_endpoint(config.otlp_http.metrics_endpoint())
            .with_protocol(Protocol::HttpBinary)
            .with_timeout(Duration::from_millis(config.otlp_http.timeout_ms))
            .with_headers(langfuse_headers(config))
            .build(),
    };
    exporter
        .map(Some)
        .map_err(|e| format!("metrics exporter init error: {}", e))
}

pub fn start_request_span(request_id: &str, model: &str) -> global::BoxedSpan {
    let tracer = global::tracer(INSTRUMENTATION_SCOPE);
    let mut span = tracer.start("chat.proxy.request");
    span.set_attribute(KeyValue::new("request.id", request_id.to_string()));
    span.set_attribute(KeyValue::new("model", model.to_string()));
    span
}

pub fn finish_request_span(mut span: global::BoxedSpan, outcome: Outcome, status: u16) {
    span.set_attribute(KeyValue::new("outcome", outcome.as_str()));
    span.set_attribute(KeyValue::new("http.status", i64::from(status)));
    span.end();
}
