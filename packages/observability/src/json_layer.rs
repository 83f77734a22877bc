//! JSON layer for structured logging.
//!
//! Each event becomes one JSONL line with timestamp, level, service, pid,
//! target, message and the event's structured fields. Field values pass
//! through [`crate::redact_value`] first.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::redact::redact_value;

/// One JSONL line, borrowed from the event being written.
#[derive(Debug, Serialize)]
pub struct LogLine<'a> {
    pub timestamp: String,
    pub level: &'a str,
    pub service: &'a str,
    pub pid: u32,
    pub target: &'a str,
    pub message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Span names from the root down, joined with `:`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Collects an event's fields, pulling `message` out separately.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn record_value(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.message = Some(match value {
                Value::String(text) => text,
                other => other.to_string(),
            });
            return;
        }
        self.fields.insert(name.to_string(), redact_value(name, &value));
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON number form.
        let value = match serde_json::Number::from_f64(value) {
            Some(number) => Value::Number(number),
            None => Value::String(value.to_string()),
        };
        self.record_value(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, Value::String(value.to_string()));
    }
}

/// Layer that writes one JSON object per event.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, writer: W) -> Self {
        Self {
            service: service.into(),
            pid: std::process::id(),
            writer,
        }
    }
}

fn span_scope<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let names: Vec<&str> = ctx
        .event_scope(event)?
        .from_root()
        .map(|span| span.name())
        .collect();
    (!names.is_empty()).then(|| names.join(":"))
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let metadata = event.metadata();

        let line = LogLine {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: metadata.level().as_str(),
            service: &self.service,
            pid: self.pid,
            target: metadata.target(),
            message: collector.message.unwrap_or_default(),
            fields: collector.fields,
            scope: span_scope(event, &ctx),
            file: metadata.file(),
            line: metadata.line(),
        };

        if let Ok(mut encoded) = serde_json::to_vec(&line) {
            encoded.push(b'\n');
            let _ = self.writer.make_writer().write_all(&encoded);
        }
    }
}
