//! Network flow summaries, loosely NetFlow v5 shaped.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use avalon_core::args::ArgSpec;
use avalon_core::registry::BuildContext;
use avalon_core::{record_from, AvalonError, Model, Record};

use crate::{ephemeral_port, external_ip, instance_rng, internal_ip};

const TCP_FLAGS: &[&str] = &["S", "SA", "A", "PA", "FA", "R"];

#[derive(Serialize)]
struct Flow<'a> {
    timestamp: String,
    exporter: &'a str,
    proto: u8,
    src: String,
    src_port: u16,
    dst: String,
    dst_port: u16,
    packets: u64,
    bytes: u64,
    duration_ms: u64,
    tcp_flags: &'a str,
}

pub struct NetflowModel {
    exporter: String,
    rng: StdRng,
}

impl Model for NetflowModel {
    fn next(&mut self) -> Result<Record> {
        let packets = self.rng.random_range(1..=10_000u64);
        // rough payload spread per packet
        let bytes = packets * self.rng.random_range(40..=1460u64);
        let proto: u8 = if self.rng.random_range(0..10) < 8 { 6 } else { 17 };
        record_from(&Flow {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            exporter: &self.exporter,
            proto,
            src: internal_ip(&mut self.rng),
            src_port: ephemeral_port(&mut self.rng),
            dst: external_ip(&mut self.rng),
            dst_port: self.rng.random_range(1..=49151),
            packets,
            bytes,
            duration_ms: self.rng.random_range(1..=120_000),
            tcp_flags: TCP_FLAGS[self.rng.random_range(0..TCP_FLAGS.len())],
        })
    }
}

pub(crate) fn args() -> Vec<ArgSpec> {
    vec![ArgSpec::value(
        "netflow_exporter",
        "netflow-exporter",
        "Exporter identifier stamped on every flow",
        "NAME",
    )
    .default("rtr01")]
}

pub(crate) fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Model>, AvalonError> {
    Ok(Box::new(NetflowModel { exporter: ctx.args.get_str("exporter")?, rng: instance_rng(ctx) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalon_core::registry::ExtensionMeta;

    #[test]
    fn flow_shape() {
        let meta = ExtensionMeta::new("netflow").with_args(args);
        let bound = crate::tests::bound_args(&meta, &[]);
        let mut flows = build(&BuildContext { args: &bound, seed: 1, instance: 0 }).unwrap();
        let record = flows.next().unwrap();
        assert_eq!(record["exporter"], "rtr01");
        let packets = record["packets"].as_u64().unwrap();
        let bytes = record["bytes"].as_u64().unwrap();
        assert!(packets >= 1);
        assert!(bytes >= packets * 40);
    }
}
