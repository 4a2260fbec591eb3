//! Kafka medium: produce each batch as one message to `--kafka-topic`.
//!
//! Delivery retries below the message timeout are librdkafka's business; a
//! send that still fails is reported as a lost batch.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use avalon_core::args::ArgSpec;
use avalon_core::registry::BuildContext;
use avalon_core::{AvalonError, Medium, Payload, WriteError};

pub struct KafkaMedium {
    producer: FutureProducer,
    topic: String,
}

#[async_trait]
impl Medium for KafkaMedium {
    async fn write(&mut self, batch: &Payload) -> Result<(), WriteError> {
        let record = FutureRecord::to(&self.topic).payload(batch.as_bytes()).key("");
        match self.producer.send(record, Duration::from_secs(0)).await {
            Ok(_) => Ok(()),
            Err((err, _)) => Err(WriteError::retriable(err)),
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.producer.flush(Duration::from_secs(10))?;
        Ok(())
    }
}

pub(crate) fn args() -> Vec<ArgSpec> {
    vec![
        ArgSpec::value(
            "kafka_brokers",
            "kafka-brokers",
            "Comma-separated bootstrap broker list",
            "LIST",
        )
        .default("localhost:9092"),
        ArgSpec::value("kafka_topic", "kafka-topic", "Topic each batch is produced to", "NAME"),
        ArgSpec::value(
            "kafka_timeout_ms",
            "kafka-timeout-ms",
            "Message delivery timeout in milliseconds",
            "N",
        )
        .default("30000"),
    ]
}

pub(crate) fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Medium>, AvalonError> {
    let brokers = ctx.args.get_str("brokers")?;
    let topic = ctx.args.get_str("topic")?;
    let timeout_ms = ctx.args.get_u64("timeout_ms")?;
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", timeout_ms.to_string())
        .create()
        .map_err(|err| AvalonError::Other(err.into()))?;
    Ok(Box::new(KafkaMedium { producer, topic }))
}
