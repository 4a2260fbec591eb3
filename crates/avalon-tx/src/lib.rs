//! # Avalon Transformations - Record Mapping Extensions
//!
//! Mapping extensions rewrite or drop records between the model and the
//! format. A producer's chain is assembled from three sources, in order:
//! mappings braced onto its model spec (`snort{file://tag.map}`), global
//! `--map` URIs, and the registered extensions below, each of which joins the
//! chain only when its own flag is supplied:
//!
//! - **identifier** (`--identifier-field FIELD`): stamps a per-producer tag,
//!   which makes the interleaving of parallel instances observable at the sink
//! - **timestamp** (`--timestamp-field FIELD`): stamps mapping-time RFC 3339
//! - **sample** (`--sample-every N`): keeps one record out of every N
//!
//! The `file://` URIs load the declarative transform language in
//! [`inline`]; returning no record from any mapping drops it without
//! counting toward `--number`.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use avalon_core::args::ArgSpec;
use avalon_core::registry::{BuildContext, ExtensionMeta, MappingEntry};
use avalon_core::{AvalonError, Mapping, Record, Registry};

pub mod inline;

/// Register every built-in mapping extension.
pub fn register(registry: &mut Registry) -> Result<(), AvalonError> {
    registry.register_mapping(MappingEntry {
        meta: ExtensionMeta::new("identifier").with_args(identifier_args),
        enabled: |args| args.supplied("field"),
        build: build_identifier,
    })?;
    registry.register_mapping(MappingEntry {
        meta: ExtensionMeta::new("sample").with_args(sample_args),
        enabled: |args| args.supplied("every"),
        build: build_sample,
    })?;
    registry.register_mapping(MappingEntry {
        meta: ExtensionMeta::new("timestamp").with_args(timestamp_args),
        enabled: |args| args.supplied("field"),
        build: build_timestamp,
    })?;
    Ok(())
}

/// Stamps each record with a tag unique to its producer instance.
pub struct IdentifierMapping {
    field: String,
    tag: String,
}

impl Mapping for IdentifierMapping {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>> {
        record.insert(self.field.clone(), Value::String(self.tag.clone()));
        Ok(Some(record))
    }
}

fn identifier_args() -> Vec<ArgSpec> {
    vec![ArgSpec::value(
        "identifier_field",
        "identifier-field",
        "Stamp each record with a per-producer identifier in this field",
        "FIELD",
    )]
}

fn build_identifier(ctx: &BuildContext<'_>) -> Result<Box<dyn Mapping>, AvalonError> {
    Ok(Box::new(IdentifierMapping {
        field: ctx.args.get_str("field")?,
        tag: format!("producer-{}", ctx.instance),
    }))
}

/// Stamps mapping-time RFC 3339 into the given field.
pub struct TimestampMapping {
    field: String,
}

impl Mapping for TimestampMapping {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>> {
        record.insert(
            self.field.clone(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Ok(Some(record))
    }
}

fn timestamp_args() -> Vec<ArgSpec> {
    vec![ArgSpec::value(
        "timestamp_field",
        "timestamp-field",
        "Stamp the mapping-time timestamp into this field",
        "FIELD",
    )]
}

fn build_timestamp(ctx: &BuildContext<'_>) -> Result<Box<dyn Mapping>, AvalonError> {
    Ok(Box::new(TimestampMapping { field: ctx.args.get_str("field")? }))
}

/// Keeps one record out of every N.
pub struct SampleMapping {
    every: u64,
    seen: u64,
}

impl Mapping for SampleMapping {
    fn map(&mut self, record: Record) -> Result<Option<Record>> {
        self.seen += 1;
        if self.seen % self.every == 0 {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}

fn sample_args() -> Vec<ArgSpec> {
    vec![ArgSpec::value("sample_every", "sample-every", "Keep one record out of every N", "N")]
}

fn build_sample(ctx: &BuildContext<'_>) -> Result<Box<dyn Mapping>, AvalonError> {
    let every = ctx.args.get_u64("every")?;
    if every == 0 {
        return Err(AvalonError::config("sample: --sample-every must be at least 1"));
    }
    Ok(Box::new(SampleMapping { every, seen: 0 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalon_core::args::{ArgValue, ExtensionArgs, ParsedArgs, ParsedValue};
    use serde_json::json;

    pub(crate) fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn bound(meta: &ExtensionMeta, values: &[(&str, &str)]) -> ExtensionArgs {
        let mut parsed = ParsedArgs::default();
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

    #[test]
    fn registration_is_stable() {
        let mut registry = Registry::default();
        register(&mut registry).unwrap();
        assert_eq!(registry.list_mappings(), vec!["identifier", "sample", "timestamp"]);
    }

    #[test]
    fn identifier_tags_by_instance() {
        let meta = ExtensionMeta::new("identifier").with_args(identifier_args);
        let args = bound(&meta, &[("identifier_field", "tag")]);
        let mut first =
            build_identifier(&BuildContext { args: &args, seed: 0, instance: 0 }).unwrap();
        let mut second =
            build_identifier(&BuildContext { args: &args, seed: 0, instance: 1 }).unwrap();
        let a = first.map(record(json!({"x": 1}))).unwrap().unwrap();
        let b = second.map(record(json!({"x": 1}))).unwrap().unwrap();
        assert_eq!(a["tag"], "producer-0");
        assert_eq!(b["tag"], "producer-1");
    }

    #[test]
    fn sample_keeps_one_in_n() {
        let meta = ExtensionMeta::new("sample").with_args(sample_args);
        let args = bound(&meta, &[("sample_every", "3")]);
        assert!(args.supplied("every"));
        let mut sample = build_sample(&BuildContext { args: &args, seed: 0, instance: 0 }).unwrap();
        let survivors: usize = (0..9)
            .filter(|_| sample.map(record(json!({}))).unwrap().is_some())
            .count();
        assert_eq!(survivors, 3);
    }

    #[test]
    fn sample_rejects_zero() {
        let meta = ExtensionMeta::new("sample").with_args(sample_args);
        let args = bound(&meta, &[("sample_every", "0")]);
        assert!(build_sample(&BuildContext { args: &args, seed: 0, instance: 0 }).is_err());
    }

    #[test]
    fn timestamp_stamps_rfc3339() {
        let meta = ExtensionMeta::new("timestamp").with_args(timestamp_args);
        let args = bound(&meta, &[("timestamp_field", "seen_at")]);
        let mut ts = build_timestamp(&BuildContext { args: &args, seed: 0, instance: 0 }).unwrap();
        let out = ts.map(record(json!({}))).unwrap().unwrap();
        let stamp = out["seen_at"].as_str().unwrap();
        assert!(stamp.contains('T') && stamp.ends_with('Z'));
    }
}
