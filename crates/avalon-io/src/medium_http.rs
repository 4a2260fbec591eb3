//! HTTP medium: POST each batch to `--http-url`.
//!
//! Transport errors and 5xx responses are treated as transient and retried
//! internally with a linear backoff; 4xx responses are not retried. Once the
//! attempts are spent the batch is reported lost and the count guard issues a
//! replacement.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use uuid::Uuid;

use avalon_core::args::ArgSpec;
use avalon_core::registry::BuildContext;
use avalon_core::{AvalonError, Encoding, Medium, Payload, WriteError};

pub struct HttpMedium {
    client: reqwest::Client,
    url: String,
    retries: u64,
}

fn content_type(batch: &Payload) -> &'static str {
    match batch.encoding() {
        Encoding::Text => "text/plain; charset=utf-8",
        Encoding::Binary => "application/octet-stream",
    }
}

#[async_trait]
impl Medium for HttpMedium {
    async fn write(&mut self, batch: &Payload) -> Result<(), WriteError> {
        let mut last: Option<anyhow::Error> = None;
        for attempt in 1..=self.retries + 1 {
            let response = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, content_type(batch))
                .header("x-avalon-batch", Uuid::new_v4().to_string())
                .body(batch.as_bytes().to_vec())
                .send()
                .await;
            match response {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) if response.status().is_server_error() => {
                    last = Some(anyhow::anyhow!("HTTP {} from {}", response.status(), self.url));
                }
                Ok(response) => {
                    return Err(WriteError::fatal(anyhow::anyhow!(
                        "HTTP {} from {}",
                        response.status(),
                        self.url
                    )));
                }
                Err(err) => last = Some(anyhow::Error::from(err)),
            }
            if attempt <= self.retries {
                if let Some(err) = &last {
                    tracing::warn!(url = %self.url, attempt, error = %err, "retrying batch POST");
                }
                tokio::time::sleep(Duration::from_millis(200 * attempt)).await;
            }
        }
        Err(WriteError::retriable(
            last.unwrap_or_else(|| anyhow::anyhow!("HTTP retries exhausted for {}", self.url)),
        ))
    }
}

pub(crate) fn args() -> Vec<ArgSpec> {
    vec![
        ArgSpec::value("http_url", "http-url", "Endpoint each batch is POSTed to", "URL"),
        ArgSpec::value("http_timeout", "http-timeout", "Request timeout in seconds", "SECS")
            .default("30"),
        ArgSpec::value("http_retries", "http-retries", "Retries per batch on 5xx", "N")
            .default("2"),
    ]
}

pub(crate) fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Medium>, AvalonError> {
    let url = ctx.args.get_str("url")?;
    let timeout = ctx.args.get_u64("timeout")?;
    let retries = ctx.args.get_u64("retries")?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()
        .map_err(|err| AvalonError::Other(err.into()))?;
    Ok(Box::new(HttpMedium { client, url, retries }))
}
