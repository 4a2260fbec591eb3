//! Standard output medium, the default sink.

use async_trait::async_trait;
use tokio::io::{self, AsyncWriteExt};

use avalon_core::registry::BuildContext;
use avalon_core::{AvalonError, Medium, Payload, WriteError};

pub struct StdoutMedium {
    out: io::Stdout,
}

#[async_trait]
impl Medium for StdoutMedium {
    async fn write(&mut self, batch: &Payload) -> Result<(), WriteError> {
        self.out
            .write_all(batch.as_bytes())
            .await
            .map_err(|err| WriteError::fatal(anyhow::Error::from(err)))?;
        self.out
            .flush()
            .await
            .map_err(|err| WriteError::fatal(anyhow::Error::from(err)))?;
        Ok(())
    }
}

pub(crate) fn build(_ctx: &BuildContext<'_>) -> Result<Box<dyn Medium>, AvalonError> {
    Ok(Box::new(StdoutMedium { out: io::stdout() }))
}
