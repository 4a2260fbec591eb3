//! The explicit extension registry.
//!
//! Extensions do not get discovered by scanning: each built-in crate exposes a
//! `register(&mut Registry)` call and the binary links the set. Titles are
//! unique per family; a collision is a startup error.

use std::collections::BTreeMap;
use std::fmt;

use crate::args::{ArgSpec, ExtensionArgs, ParserSpec};
use crate::error::AvalonError;
use crate::{Format, Generic, Mapping, Medium, Model};

/// The five extension families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Family {
    Model,
    Mapping,
    Format,
    Medium,
    Generic,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Model => "model",
            Family::Mapping => "mapping",
            Family::Format => "format",
            Family::Medium => "medium",
            Family::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Registry entry metadata shared by every family.
#[derive(Debug, Clone)]
pub struct ExtensionMeta {
    /// Unique title within the family.
    pub title: &'static str,
    /// Argument namespace prefix; `None` means `"<title>_"`.
    pub args_prefix: Option<&'static str>,
    /// `(destination, attribute)` pairs attached outside the prefix rule.
    pub args_mapping: &'static [(&'static str, &'static str)],
    /// Class-level argument contributions.
    pub args: fn() -> Vec<ArgSpec>,
}

fn no_args() -> Vec<ArgSpec> {
    Vec::new()
}

impl ExtensionMeta {
    pub fn new(title: &'static str) -> Self {
        ExtensionMeta { title, args_prefix: None, args_mapping: &[], args: no_args }
    }

    pub fn with_prefix(mut self, prefix: &'static str) -> Self {
        self.args_prefix = Some(prefix);
        self
    }

    pub fn with_mapping(mut self, mapping: &'static [(&'static str, &'static str)]) -> Self {
        self.args_mapping = mapping;
        self
    }

    pub fn with_args(mut self, args: fn() -> Vec<ArgSpec>) -> Self {
        self.args = args;
        self
    }

    /// Effective argument prefix: explicit override or `"<title>_"`.
    pub fn prefix(&self) -> String {
        match self.args_prefix {
            Some(p) => p.to_string(),
            None => format!("{}_", self.title),
        }
    }
}

/// Context handed to extension constructors.
pub struct BuildContext<'a> {
    /// The hydrated argument view for this extension.
    pub args: &'a ExtensionArgs,
    /// Run seed; instances derive their own streams from it.
    pub seed: u64,
    /// Instance ordinal: producer index for models, mappings, and formats;
    /// writer-slot index for mediums.
    pub instance: usize,
}

pub type BuildModel = fn(&BuildContext<'_>) -> Result<Box<dyn Model>, AvalonError>;
pub type BuildMapping = fn(&BuildContext<'_>) -> Result<Box<dyn Mapping>, AvalonError>;
pub type BuildFormat = fn(&BuildContext<'_>) -> Result<Box<dyn Format>, AvalonError>;
pub type BuildMedium = fn(&BuildContext<'_>) -> Result<Box<dyn Medium>, AvalonError>;
pub type BuildGeneric = fn() -> Box<dyn Generic>;

pub struct ModelEntry {
    pub meta: ExtensionMeta,
    pub build: BuildModel,
}

pub struct MappingEntry {
    pub meta: ExtensionMeta,
    /// Registered mappings join the chain only when their own flags were
    /// supplied; this predicate decides.
    pub enabled: fn(&ExtensionArgs) -> bool,
    pub build: BuildMapping,
}

pub struct FormatEntry {
    pub meta: ExtensionMeta,
    pub build: BuildFormat,
}

pub struct MediumEntry {
    pub meta: ExtensionMeta,
    pub build: BuildMedium,
}

pub struct GenericEntry {
    pub meta: ExtensionMeta,
    pub build: BuildGeneric,
}

/// All known extensions, keyed by `(family, title)`.
///
/// `BTreeMap` keeps titles in stable order, which fixes both `--list-*`
/// output and generic hook ordering.
#[derive(Default)]
pub struct Registry {
    models: BTreeMap<&'static str, ModelEntry>,
    mappings: BTreeMap<&'static str, MappingEntry>,
    formats: BTreeMap<&'static str, FormatEntry>,
    mediums: BTreeMap<&'static str, MediumEntry>,
    generics: BTreeMap<&'static str, GenericEntry>,
}

fn duplicate(family: Family, title: &str) -> AvalonError {
    AvalonError::DuplicateExtension { family, title: title.to_string() }
}

impl Registry {
    pub fn register_model(&mut self, entry: ModelEntry) -> Result<(), AvalonError> {
        let title = entry.meta.title;
        if self.models.insert(title, entry).is_some() {
            return Err(duplicate(Family::Model, title));
        }
        Ok(())
    }

    pub fn register_mapping(&mut self, entry: MappingEntry) -> Result<(), AvalonError> {
        let title = entry.meta.title;
        if self.mappings.insert(title, entry).is_some() {
            return Err(duplicate(Family::Mapping, title));
        }
        Ok(())
    }

    pub fn register_format(&mut self, entry: FormatEntry) -> Result<(), AvalonError> {
        let title = entry.meta.title;
        if self.formats.insert(title, entry).is_some() {
            return Err(duplicate(Family::Format, title));
        }
        Ok(())
    }

    pub fn register_medium(&mut self, entry: MediumEntry) -> Result<(), AvalonError> {
        let title = entry.meta.title;
        if self.mediums.insert(title, entry).is_some() {
            return Err(duplicate(Family::Medium, title));
        }
        Ok(())
    }

    pub fn register_generic(&mut self, entry: GenericEntry) -> Result<(), AvalonError> {
        let title = entry.meta.title;
        if self.generics.insert(title, entry).is_some() {
            return Err(duplicate(Family::Generic, title));
        }
        Ok(())
    }

    pub fn model(&self, title: &str) -> Option<&ModelEntry> {
        self.models.get(title)
    }

    pub fn format(&self, title: &str) -> Option<&FormatEntry> {
        self.formats.get(title)
    }

    pub fn medium(&self, title: &str) -> Option<&MediumEntry> {
        self.mediums.get(title)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelEntry> {
        self.models.values()
    }

    pub fn mappings(&self) -> impl Iterator<Item = &MappingEntry> {
        self.mappings.values()
    }

    pub fn formats(&self) -> impl Iterator<Item = &FormatEntry> {
        self.formats.values()
    }

    pub fn mediums(&self) -> impl Iterator<Item = &MediumEntry> {
        self.mediums.values()
    }

    pub fn generics(&self) -> impl Iterator<Item = &GenericEntry> {
        self.generics.values()
    }

    pub fn list_models(&self) -> Vec<&'static str> {
        self.models.keys().copied().collect()
    }

    pub fn list_mappings(&self) -> Vec<&'static str> {
        self.mappings.keys().copied().collect()
    }

    pub fn list_formats(&self) -> Vec<&'static str> {
        self.formats.keys().copied().collect()
    }

    pub fn list_mediums(&self) -> Vec<&'static str> {
        self.mediums.keys().copied().collect()
    }

    /// Every argument contribution across all families, paired with the
    /// contributing title for `help_heading` grouping.
    pub fn argument_contributions(&self) -> Vec<(&'static str, ArgSpec)> {
        let mut out = Vec::new();
        let metas = self
            .models
            .values()
            .map(|e| &e.meta)
            .chain(self.mappings.values().map(|e| &e.meta))
            .chain(self.formats.values().map(|e| &e.meta))
            .chain(self.mediums.values().map(|e| &e.meta))
            .chain(self.generics.values().map(|e| &e.meta));
        for meta in metas {
            for spec in (meta.args)() {
                out.push((meta.title, spec));
            }
        }
        out
    }

    /// Destinations that match neither the contributing extension's prefix
    /// nor its mapping; such arguments still parse but never attach.
    pub fn arg_binding_warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        let metas = self
            .models
            .values()
            .map(|e| &e.meta)
            .chain(self.mappings.values().map(|e| &e.meta))
            .chain(self.formats.values().map(|e| &e.meta))
            .chain(self.mediums.values().map(|e| &e.meta))
            .chain(self.generics.values().map(|e| &e.meta));
        for meta in metas {
            let prefix = meta.prefix();
            for spec in (meta.args)() {
                let mapped = meta.args_mapping.iter().any(|(d, _)| *d == spec.dest);
                let prefixed =
                    spec.dest.strip_prefix(&prefix).map(|r| !r.is_empty()).unwrap_or(false);
                if !mapped && !prefixed {
                    out.push(format!(
                        "extension {}: argument `{}` matches neither prefix `{}` nor its \
                         mapping and will not attach",
                        meta.title, spec.dest, prefix
                    ));
                }
            }
        }
        out
    }

    /// Log the binding warnings; call once tracing is initialized.
    pub fn check_arg_bindings(&self) {
        for warning in self.arg_binding_warnings() {
            tracing::warn!("{warning}");
        }
    }

    /// Fold every contributed argument into the parser spec, grouped by
    /// title. Flags help decide `ArgKind` rendering downstream.
    pub fn contribute_args(&self, parser: &mut ParserSpec) {
        for (title, spec) in self.argument_contributions() {
            parser.push(Some(title), spec);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_noop_model(_: &BuildContext<'_>) -> Result<Box<dyn Model>, AvalonError> {
        struct Noop;
        impl Model for Noop {
            fn next(&mut self) -> anyhow::Result<crate::Record> {
                Ok(crate::Record::new())
            }
        }
        Ok(Box::new(Noop))
    }

    fn entry(title: &'static str) -> ModelEntry {
        ModelEntry { meta: ExtensionMeta::new(title), build: build_noop_model }
    }

    #[test]
    fn duplicate_title_is_rejected() {
        let mut reg = Registry::default();
        reg.register_model(entry("snort")).unwrap();
        let err = reg.register_model(entry("snort")).unwrap_err();
        assert!(matches!(err, AvalonError::DuplicateExtension { family: Family::Model, .. }));
    }

    #[test]
    fn same_title_across_families_is_fine() {
        let mut reg = Registry::default();
        reg.register_model(entry("plain")).unwrap();
        reg.register_format(FormatEntry {
            meta: ExtensionMeta::new("plain"),
            build: |_| {
                struct F;
                impl Format for F {
                    fn batch(
                        &mut self,
                        _: &mut dyn crate::RecordSource,
                        _: usize,
                    ) -> anyhow::Result<crate::Payload> {
                        Ok(crate::Payload::Text(String::new()))
                    }
                }
                Ok(Box::new(F))
            },
        })
        .unwrap();
        assert_eq!(reg.list_models(), vec!["plain"]);
        assert_eq!(reg.list_formats(), vec!["plain"]);
    }

    #[test]
    fn listing_is_idempotent_and_sorted() {
        let mut reg = Registry::default();
        reg.register_model(entry("snort")).unwrap();
        reg.register_model(entry("asa")).unwrap();
        reg.register_model(entry("netflow")).unwrap();
        let first = reg.list_models();
        assert_eq!(first, vec!["asa", "netflow", "snort"]);
        assert_eq!(first, reg.list_models());
    }

    #[test]
    fn default_prefix_is_title_underscore() {
        assert_eq!(ExtensionMeta::new("snort").prefix(), "snort_");
        assert_eq!(ExtensionMeta::new("json-lines").with_prefix("json_").prefix(), "json_");
    }

    #[test]
    fn mismatched_destination_is_flagged() {
        fn bad_args() -> Vec<ArgSpec> {
            vec![ArgSpec::value("sensor_name", "sensor-name", "sensor", "NAME")]
        }
        let mut reg = Registry::default();
        reg.register_model(ModelEntry {
            meta: ExtensionMeta::new("snort").with_args(bad_args),
            build: build_noop_model,
        })
        .unwrap();
        let warnings = reg.arg_binding_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("sensor_name"));
    }
}
