//! Local file medium: append each batch to `--file-name`.

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use avalon_core::args::ArgSpec;
use avalon_core::registry::BuildContext;
use avalon_core::{AvalonError, Medium, Payload, WriteError};

pub struct FileMedium {
    file: File,
    flush_every_batch: bool,
}

#[async_trait]
impl Medium for FileMedium {
    async fn write(&mut self, batch: &Payload) -> Result<(), WriteError> {
        self.file
            .write_all(batch.as_bytes())
            .await
            .map_err(|err| WriteError::fatal(anyhow::Error::from(err)))?;
        if self.flush_every_batch {
            self.file
                .flush()
                .await
                .map_err(|err| WriteError::fatal(anyhow::Error::from(err)))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

pub(crate) fn args() -> Vec<ArgSpec> {
    vec![
        ArgSpec::value("file_name", "file-name", "Path of the output file", "PATH"),
        ArgSpec::flag("file_flush", "file-flush", "Flush after every batch"),
    ]
}

pub(crate) fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Medium>, AvalonError> {
    let path = ctx.args.get_str("name")?;
    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .map_err(|err| AvalonError::config(format!("cannot open --file-name {path}: {err}")))?;
    Ok(Box::new(FileMedium {
        file: File::from_std(file),
        flush_every_batch: ctx.args.get_flag("flush"),
    }))
}
