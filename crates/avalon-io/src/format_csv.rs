//! Comma-separated rows with a header derived from the first record.
//!
//! The column set is fixed by the first record this instance sees; the
//! header row is written once per instance (formats are per-producer state).
//! Scalar values render bare, composites as embedded JSON.

use anyhow::{Context, Result};
use serde_json::Value;

use avalon_core::registry::BuildContext;
use avalon_core::{AvalonError, Format, Payload, Record, RecordSource};

pub struct CsvFormat {
    columns: Option<Vec<String>>,
    header_written: bool,
}

impl CsvFormat {
    pub fn new() -> Self {
        CsvFormat { columns: None, header_written: false }
    }

    fn render(value: Option<&Value>) -> Result<String> {
        Ok(match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(composite) => serde_json::to_string(composite)?,
        })
    }
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl Format for CsvFormat {
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload> {
        if size == 0 {
            return Ok(Payload::Text(String::new()));
        }
        let mut records: Vec<Record> = Vec::with_capacity(size);
        for _ in 0..size {
            records.push(source.next()?);
        }

        let columns = self.columns.get_or_insert_with(|| {
            let mut keys: Vec<String> = records[0].keys().cloned().collect();
            keys.sort();
            keys
        });

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        if !self.header_written {
            writer.write_record(columns.iter())?;
            self.header_written = true;
        }
        for record in &records {
            let mut row = Vec::with_capacity(columns.len());
            for column in columns.iter() {
                row.push(Self::render(record.get(column))?);
            }
            writer.write_record(&row)?;
        }
        let bytes = writer.into_inner().context("csv writer flush failed")?;
        Ok(Payload::Text(String::from_utf8(bytes)?))
    }
}

pub(crate) fn build(_ctx: &BuildContext<'_>) -> Result<Box<dyn Format>, AvalonError> {
    Ok(Box::new(CsvFormat::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::FixedSource;
    use serde_json::json;

    #[test]
    fn header_once_then_rows() {
        let mut format = CsvFormat::new();
        let mut source = FixedSource::new(vec![
            json!({"b": 2, "a": "x"}),
            json!({"a": "y", "b": 3}),
        ]);
        let Payload::Text(first) = format.batch(&mut source, 2).unwrap() else {
            panic!("expected text")
        };
        assert_eq!(first, "a,b\nx,2\ny,3\n");

        // second batch from the same instance repeats no header
        let mut source = FixedSource::new(vec![json!({"a": "z", "b": 4})]);
        let Payload::Text(second) = format.batch(&mut source, 1).unwrap() else {
            panic!("expected text")
        };
        assert_eq!(second, "z,4\n");
    }

    #[test]
    fn missing_and_composite_values() {
        let mut format = CsvFormat::new();
        let mut source = FixedSource::new(vec![
            json!({"a": 1, "b": {"nested": true}, "c": null}),
            json!({"a": 2}),
        ]);
        let Payload::Text(text) = format.batch(&mut source, 2).unwrap() else {
            panic!("expected text")
        };
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "a,b,c");
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].contains("nested"));
        assert_eq!(lines[2], "2,,");
    }

    #[test]
    fn zero_size_is_an_empty_payload() {
        let mut format = CsvFormat::new();
        let mut source = FixedSource::new(Vec::new());
        assert!(format.batch(&mut source, 0).unwrap().is_empty());
    }
}
