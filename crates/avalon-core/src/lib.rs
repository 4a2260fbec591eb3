//! # Avalon Core - Generation Pipeline Runtime
//!
//! This crate provides the foundational types, traits, and runtime for the Avalon
//! streaming test-data generator. It defines the five extension families, the
//! explicit registry that binds them together, the argument binder that hydrates
//! extension instances from CLI input, and the scheduler that fans records out
//! across weighted producers under a global rate limit and record budget.
//!
//! ## Key Components
//!
//! - **Extension Traits**: [`Model`], [`Mapping`], [`Format`], [`Medium`], and
//!   [`Generic`], the contracts concrete extensions implement
//! - **Registry**: Build-time extension registry keyed by `(family, title)`
//! - **Argument Binder**: Declarative argument schema with prefix/mapping
//!   hydration into typed per-extension views
//! - **Scheduler**: Weighted producer fan-out, rate governor, count budget,
//!   and the parallel writer pool with back-pressure
//!
//! ## Example Usage
//!
//! ```rust
//! use avalon_core::parse_producer_specs;
//!
//! // `10snort1000` means: ten parallel snort instances with weight 1000
//! # fn example() -> anyhow::Result<()> {
//! let specs = parse_producer_specs(&["10snort1000".to_string()])?;
//! assert_eq!(specs[0].count, 10);
//! assert_eq!(specs[0].weight, 1000);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub mod args;
pub mod error;
pub mod governor;
pub mod registry;
pub mod scheduler;
pub mod spec;

pub use args::{ArgKind, ArgSpec, ArgValue, ExtensionArgs, HookContext, ParsedArgs, ParserSpec};
pub use error::{AvalonError, WriteError, EXIT_CONFIG, EXIT_FAILURE};
pub use governor::{CountBudget, Dispatcher, Grant, RateGovernor};
pub use registry::{
    BuildContext, Family, FormatEntry, GenericEntry, MappingEntry, MediumEntry, ModelEntry,
    Registry,
};
pub use registry::ExtensionMeta;
pub use scheduler::{
    run_pipeline, NamedMapping, PipelineConfig, PipelineReport, ProducerSetup,
    MAX_CONSECUTIVE_FORMAT_ERRORS, MAX_CONSECUTIVE_MAPPING_ERRORS, MAX_CONSECUTIVE_MODEL_ERRORS,
    MAX_MEDIUM_FAILURES,
};
pub use spec::{parse_producer_specs, ProducerSpec};

/// A synthesized record: a mapping from field names to dynamic values.
///
/// Records are produced by a [`Model`], possibly rewritten or dropped by the
/// mapping chain, and consumed by a [`Format`]. They live only until their
/// batch is serialized.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Convert any serializable value into a [`Record`].
///
/// Fails when the value does not serialize to a JSON object.
pub fn record_from<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got {other}"),
    }
}

/// Payload encoding declared by a format, consulted by mediums that care
/// (e.g. the HTTP content type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Text,
    Binary,
}

/// One serialized batch: an opaque payload covering up to `batch-size`
/// consecutive records from a single producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// A `size = 0` batch serializes to an empty payload; mediums accept it
    /// as a no-op.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Payload::Text(_) => Encoding::Text,
            Payload::Bytes(_) => Encoding::Binary,
        }
    }
}

/// Trait for record-producing extensions.
///
/// A model yields an unbounded lazy sequence of records. Each producer worker
/// owns its own instance, so implementations keep per-instance state (RNG,
/// counters) without synchronization.
pub trait Model: Send {
    /// Produce the next record.
    ///
    /// Errors are counted by the scheduler; after
    /// [`MAX_CONSECUTIVE_MODEL_ERRORS`] the producer is retired.
    fn next(&mut self) -> Result<Record>;
}

/// Trait for record-transforming extensions.
///
/// Returning `Ok(None)` drops the record: it never reaches the sink and does
/// not count toward `--number`.
pub trait Mapping: Send {
    fn map(&mut self, record: Record) -> Result<Option<Record>>;
}

/// Model-shaped proxy handed to formats.
///
/// The scheduler interposes the mapping chain here: `next()` yields records
/// that already went through every mapping, so a format that drives record
/// production itself still observes mapped output.
pub trait RecordSource {
    fn next(&mut self) -> Result<Record>;
}

/// Trait for batch-serializing extensions.
///
/// `batch` must consume exactly `size` records from the source and return one
/// opaque payload; record order in the payload matches `next()` call order.
/// `size = 0` returns an empty payload.
pub trait Format: Send {
    fn encoding(&self) -> Encoding {
        Encoding::Text
    }

    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload>;
}

/// Trait for batch-delivering extensions.
///
/// A medium owns its connection to the sink and performs whatever retries fit
/// its protocol before giving up. Each writer slot owns its own instance, so
/// mediums may run many in parallel without internal locking.
#[async_trait]
pub trait Medium: Send {
    /// Deliver one batch. A returned error means the batch is lost; the
    /// scheduler's count guard will issue a replacement.
    async fn write(&mut self, batch: &Payload) -> std::result::Result<(), WriteError>;

    /// Flush and release the sink connection during drain.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn Medium>")
    }
}

/// Lifecycle-only extension family observing startup.
///
/// Hooks run in stable title order; any error aborts startup with
/// [`AvalonError::GenericHookFailed`].
pub trait Generic: Send {
    /// Called before any extension contributes arguments.
    fn pre_add_args(&mut self, parser: &mut ParserSpec) -> Result<()> {
        let _ = parser;
        Ok(())
    }

    /// Called after all extensions contributed arguments, before parsing.
    fn post_add_args(&mut self, parser: &mut ParserSpec) -> Result<()> {
        let _ = parser;
        Ok(())
    }

    /// Called after parsing, before the pipeline is constructed.
    fn post_parse_args(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_from_object() {
        #[derive(Serialize)]
        struct Probe {
            name: &'static str,
            port: u16,
        }
        let rec = record_from(&Probe { name: "dns", port: 53 }).unwrap();
        assert_eq!(rec.get("name"), Some(&json!("dns")));
        assert_eq!(rec.get("port"), Some(&json!(53)));
    }

    #[test]
    fn record_from_rejects_scalars() {
        assert!(record_from(&42u32).is_err());
    }

    #[test]
    fn empty_payloads() {
        assert!(Payload::Text(String::new()).is_empty());
        assert!(!Payload::Bytes(vec![0]).is_empty());
        assert_eq!(Payload::Text("ab".into()).len(), 2);
    }
}
