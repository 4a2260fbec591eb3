//! # Avalon I/O - Format and Medium Implementations
//!
//! This crate provides the concrete batch serializers and sink connectors
//! shipped with Avalon.
//!
//! ## Formats
//! - **json-lines**: one compact JSON object per line (the default)
//! - **csv**: comma-separated rows with a header derived from the first record
//! - **text-log**: syslog-flavoured lines for text-log appliances
//!
//! ## Mediums
//! - **stdout**: development and piping output (the default)
//! - **file**: append to a local file
//! - **http**: POST each batch to an endpoint, with internal retry on 5xx
//! - **kafka**: produce each batch as one message to a topic
//!
//! Mediums own their sink connection and whatever retry policy fits the
//! protocol; a returned error means the batch is lost and the scheduler's
//! count guard issues a replacement.

use avalon_core::registry::{ExtensionMeta, FormatEntry, MediumEntry};
use avalon_core::{AvalonError, Registry};

/// CSV batch serializer
pub mod format_csv;

/// JSON-lines batch serializer
pub mod format_json_lines;

/// Syslog-flavoured line serializer
pub mod format_text_log;

/// Local file append medium
pub mod medium_file;

/// HTTP POST medium
pub mod medium_http;

/// Kafka producer medium
pub mod medium_kafka;

/// Standard output medium
pub mod medium_stdout;

/// Register every built-in format and medium.
pub fn register(registry: &mut Registry) -> Result<(), AvalonError> {
    registry.register_format(FormatEntry {
        meta: ExtensionMeta::new("csv"),
        build: format_csv::build,
    })?;
    registry.register_format(FormatEntry {
        meta: ExtensionMeta::new("json-lines"),
        build: format_json_lines::build,
    })?;
    registry.register_format(FormatEntry {
        meta: ExtensionMeta::new("text-log"),
        build: format_text_log::build,
    })?;

    registry.register_medium(MediumEntry {
        meta: ExtensionMeta::new("file").with_args(medium_file::args),
        build: medium_file::build,
    })?;
    registry.register_medium(MediumEntry {
        meta: ExtensionMeta::new("http").with_args(medium_http::args),
        build: medium_http::build,
    })?;
    registry.register_medium(MediumEntry {
        meta: ExtensionMeta::new("kafka").with_args(medium_kafka::args),
        build: medium_kafka::build,
    })?;
    registry.register_medium(MediumEntry {
        meta: ExtensionMeta::new("stdout"),
        build: medium_stdout::build,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalon_core::args::{ArgKind, ArgValue, ExtensionArgs, ParsedArgs, ParsedValue};
    use avalon_core::{Record, RecordSource};
    use std::collections::VecDeque;

    /// Bind extension args the way the CLI parse would surface them,
    /// declared defaults included.
    pub(crate) fn bound_args(meta: &ExtensionMeta, values: &[(&str, &str)]) -> ExtensionArgs {
        let mut parsed = ParsedArgs::default();
        for spec in (meta.args)() {
            match spec.kind {
                ArgKind::Value { default: Some(default), .. } => parsed.insert(
                    spec.dest,
                    ParsedValue {
                        value: ArgValue::Str(default.to_string()),
                        user_supplied: false,
                        index: None,
                    },
                ),
                ArgKind::Flag => parsed.insert(
                    spec.dest,
                    ParsedValue {
                        value: ArgValue::Bool(false),
                        user_supplied: false,
                        index: None,
                    },
                ),
                _ => {}
            }
        }
        for (dest, value) in values {
            parsed.insert(
                *dest,
                ParsedValue {
                    value: ArgValue::Str((*value).to_string()),
                    user_supplied: true,
                    index: None,
                },
            );
        }
        ExtensionArgs::bind(meta, &parsed)
    }

    /// Record source over a fixed list, for format tests.
    pub(crate) struct FixedSource {
        records: VecDeque<Record>,
    }

    impl FixedSource {
        pub(crate) fn new(values: Vec<serde_json::Value>) -> Self {
            FixedSource {
                records: values
                    .into_iter()
                    .map(|v| v.as_object().cloned().unwrap())
                    .collect(),
            }
        }
    }

    impl RecordSource for FixedSource {
        fn next(&mut self) -> anyhow::Result<Record> {
            self.records
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("source exhausted"))
        }
    }

    #[test]
    fn registration_is_stable() {
        let mut registry = Registry::default();
        register(&mut registry).unwrap();
        assert_eq!(registry.list_formats(), vec!["csv", "json-lines", "text-log"]);
        assert_eq!(registry.list_mediums(), vec!["file", "http", "kafka", "stdout"]);
    }
}
