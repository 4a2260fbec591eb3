//! The inline mapping language behind `file://` URLs.
//!
//! Instead of loading executable code at runtime, Avalon constrains inline
//! mappings to a declarative transform language, one operation per line:
//!
//! ```text
//! # stamp and reshape
//! set environment "staging"
//! rename msg message
//! remove sig_rev
//! keep timestamp message severity
//! drop every 2
//! drop when severity = 6
//! ```
//!
//! `set` and `drop when` values parse as JSON first and fall back to bare
//! strings. `drop every <n>` keeps record n, 2n, ... and drops the rest;
//! `drop when` drops records whose field equals the value. Operations apply
//! in file order; the first drop wins.
//!
//! Relative paths resolve against the working directory, then against each
//! entry of the `AVALON_MAPPING_PATH` list variable.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::Value;

use avalon_core::{AvalonError, Mapping, Record};

/// Colon-separated directory list searched for relative mapping files.
pub const MAPPING_PATH_VAR: &str = "AVALON_MAPPING_PATH";

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Set { field: String, value: Value },
    Rename { from: String, to: String },
    Remove { field: String },
    Keep { fields: Vec<String> },
    DropEvery { n: u64 },
    DropWhen { field: String, value: Value },
}

/// A compiled inline mapping.
pub struct InlineMapping {
    ops: Vec<Op>,
    seen: u64,
}

impl Mapping for InlineMapping {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>> {
        self.seen += 1;
        for op in &self.ops {
            match op {
                Op::Set { field, value } => {
                    record.insert(field.clone(), value.clone());
                }
                Op::Rename { from, to } => {
                    if let Some(value) = record.remove(from) {
                        record.insert(to.clone(), value);
                    }
                }
                Op::Remove { field } => {
                    record.remove(field);
                }
                Op::Keep { fields } => {
                    record.retain(|key, _| fields.iter().any(|f| f == key));
                }
                Op::DropEvery { n } => {
                    if self.seen % n != 0 {
                        return Ok(None);
                    }
                }
                Op::DropWhen { field, value } => {
                    if record.get(field) == Some(value) {
                        return Ok(None);
                    }
                }
            }
        }
        Ok(Some(record))
    }
}

/// Load an inline mapping from a `file://` URL.
pub fn load(url: &str) -> Result<Box<dyn Mapping>, AvalonError> {
    let path = url.strip_prefix("file://").ok_or_else(|| {
        AvalonError::config(format!("unsupported mapping URL `{url}`: only file:// is handled"))
    })?;
    let resolved = resolve(Path::new(path))
        .ok_or_else(|| AvalonError::config(format!("mapping file not found: {path}")))?;
    let text = std::fs::read_to_string(&resolved).map_err(|err| {
        AvalonError::config(format!("cannot read mapping {}: {err}", resolved.display()))
    })?;
    let ops = parse(&text).map_err(|err| AvalonError::config(format!("{url}: {err}")))?;
    Ok(Box::new(InlineMapping { ops, seen: 0 }))
}

fn resolve(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }
    if path.is_absolute() {
        return None;
    }
    let dirs = std::env::var(MAPPING_PATH_VAR).ok()?;
    dirs.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(path))
        .find(|candidate| candidate.exists())
}

fn parse(text: &str) -> Result<Vec<Op>, String> {
    let mut ops = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        ops.push(parse_line(line).map_err(|err| format!("line {}: {err}", lineno + 1))?);
    }
    if ops.is_empty() {
        return Err("no operations".to_string());
    }
    Ok(ops)
}

fn parse_line(line: &str) -> Result<Op, String> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();
    match verb {
        "set" => {
            let (field, raw) = rest
                .split_once(char::is_whitespace)
                .ok_or("expected `set <field> <value>`")?;
            Ok(Op::Set { field: field.to_string(), value: parse_value(raw.trim()) })
        }
        "rename" => {
            let (from, to) = rest
                .split_once(char::is_whitespace)
                .ok_or("expected `rename <old> <new>`")?;
            let to = to.trim();
            if to.is_empty() || to.contains(char::is_whitespace) {
                return Err("expected `rename <old> <new>`".to_string());
            }
            Ok(Op::Rename { from: from.to_string(), to: to.to_string() })
        }
        "remove" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Err("expected `remove <field>`".to_string());
            }
            Ok(Op::Remove { field: rest.to_string() })
        }
        "keep" => {
            let fields: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if fields.is_empty() {
                return Err("expected `keep <field>...`".to_string());
            }
            Ok(Op::Keep { fields })
        }
        "drop" => {
            if let Some(raw) = rest.strip_prefix("every") {
                let n: u64 =
                    raw.trim().parse().map_err(|_| "expected `drop every <n>`".to_string())?;
                if n == 0 {
                    return Err("drop interval must be at least 1".to_string());
                }
                Ok(Op::DropEvery { n })
            } else if let Some(cond) = rest.strip_prefix("when") {
                let (field, raw) = cond
                    .split_once('=')
                    .ok_or("expected `drop when <field> = <value>`")?;
                let field = field.trim();
                if field.is_empty() {
                    return Err("expected `drop when <field> = <value>`".to_string());
                }
                Ok(Op::DropWhen { field: field.to_string(), value: parse_value(raw.trim()) })
            } else {
                Err("expected `drop every <n>` or `drop when <field> = <value>`".to_string())
            }
        }
        other => Err(format!("unknown operation `{other}`")),
    }
}

/// JSON first, bare string as a convenience fallback.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
