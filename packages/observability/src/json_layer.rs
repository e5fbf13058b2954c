//! Layer rendering each event as one JSON object per line.
//!
//! Keys: `timestamp`, `level`, `service`, `pid`, `target`, `message`, plus
//! `fields`, `span`, `file` and `line` when present.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Event fields, with `message` split out.
#[derive(Default)]
struct EventFields {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl EventFields {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            let text = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            self.message = Some(text);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON number form.
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: &str, make_writer: W) -> Self {
        Self {
            service: service.to_string(),
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut recorded = EventFields::default();
        event.record(&mut recorded);
        let meta = event.metadata();

        let mut line = Map::new();
        line.insert(
            "timestamp".into(),
            Utc::now()
                .to_rfc3339_opts(SecondsFormat::Micros, true)
                .into(),
        );
        line.insert("level".into(), meta.level().as_str().into());
        line.insert("service".into(), self.service.as_str().into());
        line.insert("pid".into(), self.pid.into());
        line.insert("target".into(), meta.target().into());
        line.insert("message".into(), recorded.message.unwrap_or_default().into());
        if !recorded.fields.is_empty() {
            line.insert("fields".into(), Value::Object(recorded.fields));
        }
        if let Some(span) = ctx.event_span(event) {
            line.insert("span".into(), span.name().into());
        }
        if let Some(file) = meta.file() {
            line.insert("file".into(), file.into());
        }
        if let Some(number) = meta.line() {
            line.insert("line".into(), number.into());
        }

        let mut text = Value::Object(line).to_string();
        text.push('\n');
        let _ = self.make_writer.make_writer().write_all(text.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn lines_for(emit: impl FnOnce()) -> Vec<Value> {
        let captured = Captured::default();
        let subscriber =
            tracing_subscriber::registry().with(JsonLayer::new("siws-test", captured.clone()));
        tracing::subscriber::with_default(subscriber, emit);

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_one_line_per_event() {
        let lines = lines_for(|| {
            tracing::info!(adapter = "phantom", attempt = 2u64, "auto-connect failed");
            tracing::warn!(ok = false, "cleanup failed");
        });
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["service"], "siws-test");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["message"], "auto-connect failed");
        assert_eq!(lines[0]["fields"]["adapter"], "phantom");
        assert_eq!(lines[0]["fields"]["attempt"], 2);
        assert_eq!(lines[0]["pid"], std::process::id());

        assert_eq!(lines[1]["level"], "WARN");
        assert_eq!(lines[1]["fields"]["ok"], false);
    }

    #[test]
    fn test_optional_keys_omitted() {
        let lines = lines_for(|| tracing::debug!("no fields"));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].get("fields").is_none());
        assert!(lines[0].get("span").is_none());
    }

    #[test]
    fn test_span_name_recorded() {
        let lines = lines_for(|| {
            let span = tracing::info_span!("handshake");
            let _entered = span.enter();
            tracing::info!(phase = ?"handshaking", "phase change");
        });
        assert_eq!(lines[0]["span"], "handshake");
        assert_eq!(lines[0]["fields"]["phase"], "\"handshaking\"");
    }
}
