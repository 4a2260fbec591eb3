//! One compact JSON object per line, newline-terminated.

use anyhow::Result;

use avalon_core::registry::BuildContext;
use avalon_core::{AvalonError, Format, Payload, RecordSource};

pub struct JsonLinesFormat;

impl Format for JsonLinesFormat {
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload> {
        let mut out = String::new();
        for _ in 0..size {
            let record = source.next()?;
            out.push_str(&serde_json::to_string(&record)?);
            out.push('\n');
        }
        Ok(Payload::Text(out))
    }
}

pub(crate) fn build(_ctx: &BuildContext<'_>) -> Result<Box<dyn Format>, AvalonError> {
    Ok(Box::new(JsonLinesFormat))
}
