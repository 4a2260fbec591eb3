//! Syslog-flavoured lines for text-log appliances.
//!
//! `MMM dd HH:MM:SS host tag: body`, where the body is the record's
//! `message` field verbatim when present, otherwise space-joined
//! `key=value` pairs.

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;

use avalon_core::registry::BuildContext;
use avalon_core::{AvalonError, Format, Payload, Record, RecordSource};

pub struct TextLogFormat {
    tag: &'static str,
}

impl TextLogFormat {
    pub fn new() -> Self {
        TextLogFormat { tag: "avalon" }
    }

    fn host(record: &Record) -> &str {
        for key in ["host", "sensor", "exporter"] {
            if let Some(Value::String(host)) = record.get(key) {
                return host;
            }
        }
        "localhost"
    }

    fn body(record: &Record) -> String {
        if let Some(Value::String(message)) = record.get("message") {
            return message.clone();
        }
        record
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for TextLogFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl Format for TextLogFormat {
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload> {
        let mut out = String::new();
        for _ in 0..size {
            let record = source.next()?;
            let stamp = Utc::now().format("%b %e %H:%M:%S");
            out.push_str(&format!(
                "{stamp} {} {}: {}\n",
                Self::host(&record),
                self.tag,
                Self::body(&record)
            ));
        }
        Ok(Payload::Text(out))
    }
}

pub(crate) fn build(_ctx: &BuildContext<'_>) -> Result<Box<dyn Format>, AvalonError> {
    Ok(Box::new(TextLogFormat::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::FixedSource;
    use serde_json::json;

    #[test]
    fn key_value_body_with_host() {
        let mut format = TextLogFormat::new();
        let mut source =
            FixedSource::new(vec![json!({"host": "fw1", "severity": 6, "action": "Built"})]);
        let Payload::Text(text) = format.batch(&mut source, 1).unwrap() else {
            panic!("expected text")
        };
        assert!(text.contains(" fw1 avalon: "), "line: {text}");
        assert!(text.contains("severity=6"));
        assert!(text.contains("action=Built"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn message_field_wins() {
        let mut format = TextLogFormat::new();
        let mut source =
            FixedSource::new(vec![json!({"message": "link flap on ge-0/0/1", "noise": 1})]);
        let Payload::Text(text) = format.batch(&mut source, 1).unwrap() else {
            panic!("expected text")
        };
        assert!(text.trim_end().ends_with("link flap on ge-0/0/1"));
    }

    #[test]
    fn zero_size_is_an_empty_payload() {
        let mut format = TextLogFormat::new();
        let mut source = FixedSource::new(Vec::new());
        assert!(format.batch(&mut source, 0).unwrap().is_empty());
    }
}
