//! Declarative argument schema and the extension argument binder.
//!
//! Extensions contribute [`ArgSpec`]s instead of touching the CLI parser
//! directly; the binary renders the collected [`ParserSpec`] into real
//! command-line options and feeds the parse results back as [`ParsedArgs`].
//! [`ExtensionArgs::bind`] then hydrates a typed per-extension view using the
//! prefix/mapping attachment rules, failing closed on missing or malformed
//! values.

use std::collections::BTreeMap;

use crate::error::AvalonError;
use crate::registry::ExtensionMeta;

/// One argument contributed by an extension (or by the core surface).
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Destination name on the parsed namespace, e.g. `snort_sensor`.
    pub dest: &'static str,
    /// Long option name without the leading dashes, e.g. `snort-sensor`.
    pub long: &'static str,
    pub short: Option<char>,
    pub help: &'static str,
    pub kind: ArgKind,
}

#[derive(Debug, Clone)]
pub enum ArgKind {
    /// Boolean switch.
    Flag,
    /// Single-valued option.
    Value { default: Option<&'static str>, hint: &'static str },
    /// Repeatable option, collected in command-line order.
    List { hint: &'static str },
}

impl ArgSpec {
    pub fn flag(dest: &'static str, long: &'static str, help: &'static str) -> Self {
        ArgSpec { dest, long, short: None, help, kind: ArgKind::Flag }
    }

    pub fn value(
        dest: &'static str,
        long: &'static str,
        help: &'static str,
        hint: &'static str,
    ) -> Self {
        ArgSpec { dest, long, short: None, help, kind: ArgKind::Value { default: None, hint } }
    }

    pub fn list(
        dest: &'static str,
        long: &'static str,
        help: &'static str,
        hint: &'static str,
    ) -> Self {
        ArgSpec { dest, long, short: None, help, kind: ArgKind::List { hint } }
    }

    pub fn default(mut self, value: &'static str) -> Self {
        if let ArgKind::Value { default, .. } = &mut self.kind {
            *default = Some(value);
        }
        self
    }

    pub fn short(mut self, c: char) -> Self {
        self.short = Some(c);
        self
    }
}

/// An argument queued for the parser, grouped under the contributing
/// extension's title.
#[derive(Debug, Clone)]
pub struct ParserEntry {
    pub heading: Option<&'static str>,
    pub spec: ArgSpec,
}

/// The assembled extension argument surface, in contribution order.
///
/// Generic hooks receive `&mut ParserSpec` at the `pre_add_args` and
/// `post_add_args` stages and may append arguments of their own.
#[derive(Debug, Clone, Default)]
pub struct ParserSpec {
    entries: Vec<ParserEntry>,
}

impl ParserSpec {
    pub fn push(&mut self, heading: Option<&'static str>, spec: ArgSpec) {
        self.entries.push(ParserEntry { heading, spec });
    }

    pub fn entries(&self) -> &[ParserEntry] {
        &self.entries
    }
}

/// A parsed argument value in its pre-typed shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

/// A parsed destination plus its provenance.
#[derive(Debug, Clone)]
pub struct ParsedValue {
    pub value: ArgValue,
    /// True when the user supplied the value on the command line (as opposed
    /// to a declared default).
    pub user_supplied: bool,
    /// First command-line index when user-supplied; drives auto-medium
    /// selection ties.
    pub index: Option<usize>,
}

/// Every parsed extension destination, keyed by destination name.
#[derive(Debug, Clone, Default)]
pub struct ParsedArgs {
    values: BTreeMap<String, ParsedValue>,
}

impl ParsedArgs {
    pub fn insert(&mut self, dest: impl Into<String>, value: ParsedValue) {
        self.values.insert(dest.into(), value);
    }

    pub fn get(&self, dest: &str) -> Option<&ParsedValue> {
        self.values.get(dest)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParsedValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The typed argument view hydrated onto one extension instance.
///
/// Attachment rules: a destination appearing in the extension's
/// `args_mapping` attaches under the mapped attribute name; a destination
/// starting with the extension's `args_prefix` attaches with the prefix
/// stripped; anything else is ignored (another extension may claim it).
#[derive(Debug, Clone, Default)]
pub struct ExtensionArgs {
    title: String,
    attrs: BTreeMap<String, ParsedValue>,
}

impl ExtensionArgs {
    pub fn bind(meta: &ExtensionMeta, parsed: &ParsedArgs) -> Self {
        let prefix = meta.prefix();
        let mut attrs = BTreeMap::new();
        for (dest, value) in parsed.iter() {
            if let Some((_, attr)) = meta.args_mapping.iter().find(|(d, _)| *d == dest) {
                attrs.insert((*attr).to_string(), value.clone());
            } else if let Some(rest) = dest.strip_prefix(&prefix) {
                if !rest.is_empty() {
                    attrs.insert(rest.to_string(), value.clone());
                }
            }
        }
        ExtensionArgs { title: meta.title.to_string(), attrs }
    }

    fn missing(&self, attr: &str) -> AvalonError {
        AvalonError::config(format!("{}: missing required argument `{attr}`", self.title))
    }

    fn malformed(&self, attr: &str, expected: &str) -> AvalonError {
        AvalonError::config(format!("{}: argument `{attr}` is not a valid {expected}", self.title))
    }

    pub fn get_str(&self, attr: &str) -> Result<String, AvalonError> {
        match self.attrs.get(attr) {
            Some(ParsedValue { value: ArgValue::Str(s), .. }) => Ok(s.clone()),
            Some(_) => Err(self.malformed(attr, "string")),
            None => Err(self.missing(attr)),
        }
    }

    pub fn get_u64(&self, attr: &str) -> Result<u64, AvalonError> {
        self.get_str(attr)?.parse().map_err(|_| self.malformed(attr, "integer"))
    }

    pub fn get_f64(&self, attr: &str) -> Result<f64, AvalonError> {
        self.get_str(attr)?.parse().map_err(|_| self.malformed(attr, "number"))
    }

    /// Missing flags read as false.
    pub fn get_flag(&self, attr: &str) -> bool {
        matches!(
            self.attrs.get(attr),
            Some(ParsedValue { value: ArgValue::Bool(true), .. })
        )
    }

    pub fn get_list(&self, attr: &str) -> Vec<String> {
        match self.attrs.get(attr) {
            Some(ParsedValue { value: ArgValue::List(items), .. }) => items.clone(),
            Some(ParsedValue { value: ArgValue::Str(s), .. }) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// True when the user supplied this attribute on the command line.
    pub fn supplied(&self, attr: &str) -> bool {
        self.attrs.get(attr).map(|v| v.user_supplied).unwrap_or(false)
    }

    /// Lowest command-line index across all user-supplied attributes.
    pub fn first_index(&self) -> Option<usize> {
        self.attrs
            .values()
            .filter(|v| v.user_supplied)
            .filter_map(|v| v.index)
            .min()
    }
}

/// State handed to `post_parse_args` hooks.
///
/// Hooks read the parsed namespace and fill the out-slots the binary honors
/// before pipeline construction.
#[derive(Debug)]
pub struct HookContext<'a> {
    pub args: &'a ParsedArgs,
    /// Log filter directive requested by a hook (e.g. the verbosity generic).
    pub log_filter: Option<String>,
    /// Run seed requested by a hook (e.g. the seed generic).
    pub seed: Option<u64>,
}

impl<'a> HookContext<'a> {
    pub fn new(args: &'a ParsedArgs) -> Self {
        HookContext { args, log_filter: None, seed: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(entries: &[(&str, ArgValue, bool, Option<usize>)]) -> ParsedArgs {
        let mut out = ParsedArgs::default();
        for (dest, value, user, index) in entries {
            out.insert(
                *dest,
                ParsedValue { value: value.clone(), user_supplied: *user, index: *index },
            );
        }
        out
    }

    #[test]
    fn prefix_attachment_strips_title() {
        let meta = ExtensionMeta::new("snort");
        let parsed = parsed(&[
            ("snort_sensor", ArgValue::Str("ids7".into()), true, Some(3)),
            ("asa_hostname", ArgValue::Str("fw1".into()), true, Some(5)),
        ]);
        let args = ExtensionArgs::bind(&meta, &parsed);
        assert_eq!(args.get_str("sensor").unwrap(), "ids7");
        // the other extension's namespace is not attached
        assert!(args.get_str("hostname").is_err());
    }

    #[test]
    fn mapping_wins_over_prefix() {
        let meta = ExtensionMeta::new("seed").with_mapping(&[("seed", "value")]);
        let parsed = parsed(&[("seed", ArgValue::Str("42".into()), true, Some(1))]);
        let args = ExtensionArgs::bind(&meta, &parsed);
        assert_eq!(args.get_u64("value").unwrap(), 42);
    }

    #[test]
    fn explicit_prefix_override() {
        let meta = ExtensionMeta::new("json-lines").with_prefix("json_");
        let parsed = parsed(&[("json_pretty", ArgValue::Bool(true), true, Some(2))]);
        let args = ExtensionArgs::bind(&meta, &parsed);
        assert!(args.get_flag("pretty"));
    }

    #[test]
    fn getters_fail_closed() {
        let meta = ExtensionMeta::new("http");
        let parsed = parsed(&[("http_timeout", ArgValue::Str("abc".into()), false, None)]);
        let args = ExtensionArgs::bind(&meta, &parsed);
        assert!(args.get_u64("timeout").is_err());
        assert!(args.get_str("url").is_err());
        assert!(!args.get_flag("verify"));
    }

    #[test]
    fn first_index_skips_defaults() {
        let meta = ExtensionMeta::new("kafka");
        let parsed = parsed(&[
            ("kafka_brokers", ArgValue::Str("localhost:9092".into()), false, None),
            ("kafka_topic", ArgValue::Str("logs".into()), true, Some(7)),
        ]);
        let args = ExtensionArgs::bind(&meta, &parsed);
        assert!(!args.supplied("brokers"));
        assert!(args.supplied("topic"));
        assert_eq!(args.first_index(), Some(7));
    }
}
