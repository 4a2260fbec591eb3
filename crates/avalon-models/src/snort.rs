//! IDS fast-alert records in the shape snort emits them.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use avalon_core::args::ArgSpec;
use avalon_core::registry::BuildContext;
use avalon_core::{record_from, AvalonError, Model, Record};

use crate::{ephemeral_port, external_ip, instance_rng, internal_ip};

// (sig_id, msg, classification, priority)
const SIGNATURES: &[(u32, &str, &str, u8)] = &[
    (384, "ICMP PING", "misc-activity", 3),
    (408, "ICMP Echo Reply", "misc-activity", 3),
    (527, "BAD-TRAFFIC same SRC/DST", "bad-unknown", 2),
    (648, "SHELLCODE x86 NOOP", "shellcode-detect", 1),
    (716, "INFO TELNET access", "not-suspicious", 3),
    (1243, "WEB-IIS ISAPI .ida attempt", "web-application-attack", 1),
    (1394, "SHELLCODE x86 inc ecx NOOP", "shellcode-detect", 1),
    (1411, "SNMP public access udp", "attempted-recon", 2),
    (1417, "SNMP request udp", "attempted-recon", 2),
    (2003, "MS-SQL Worm propagation attempt", "misc-attack", 2),
];

const PROTOCOLS: &[&str] = &["TCP", "UDP", "ICMP"];

#[derive(Serialize)]
struct Alert<'a> {
    timestamp: String,
    sensor: &'a str,
    sig_gen: u32,
    sig_id: u32,
    sig_rev: u32,
    msg: &'a str,
    classification: &'a str,
    priority: u8,
    proto: &'a str,
    src: String,
    src_port: u16,
    dst: String,
    dst_port: u16,
}

pub struct SnortModel {
    sensor: String,
    rng: StdRng,
}

impl Model for SnortModel {
    fn next(&mut self) -> Result<Record> {
        let (sig_id, msg, classification, priority) =
            SIGNATURES[self.rng.random_range(0..SIGNATURES.len())];
        let proto = PROTOCOLS[self.rng.random_range(0..PROTOCOLS.len())];
        record_from(&Alert {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            sensor: &self.sensor,
            sig_gen: 1,
            sig_id,
            sig_rev: self.rng.random_range(1..=12),
            msg,
            classification,
            priority,
            proto,
            src: external_ip(&mut self.rng),
            src_port: ephemeral_port(&mut self.rng),
            dst: internal_ip(&mut self.rng),
            dst_port: self.rng.random_range(1..=1024),
        })
    }
}

pub(crate) fn args() -> Vec<ArgSpec> {
    vec![ArgSpec::value(
        "snort_sensor",
        "snort-sensor",
        "Sensor name stamped on every alert",
        "NAME",
    )
    .default("sensor01")]
}

pub(crate) fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Model>, AvalonError> {
    Ok(Box::new(SnortModel { sensor: ctx.args.get_str("sensor")?, rng: instance_rng(ctx) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalon_core::registry::ExtensionMeta;

    fn model(seed: u64, instance: usize) -> Box<dyn Model> {
        let meta = ExtensionMeta::new("snort").with_args(args);
        let bound = crate::tests::bound_args(&meta, &[("snort_sensor", "ids-lab")]);
        build(&BuildContext { args: &bound, seed, instance }).unwrap()
    }

    #[test]
    fn alert_shape() {
        let mut snort = model(11, 0);
        let record = snort.next().unwrap();
        for field in
            ["timestamp", "sensor", "sig_id", "msg", "classification", "priority", "src", "dst"]
        {
            assert!(record.contains_key(field), "missing {field}");
        }
        assert_eq!(record["sensor"], "ids-lab");
        assert_eq!(record["sig_gen"], 1);
    }

    #[test]
    fn seeded_instances_are_reproducible() {
        let mut first = model(42, 3);
        let mut second = model(42, 3);
        for _ in 0..5 {
            let x: Record = first.next().unwrap();
            let y: Record = second.next().unwrap();
            assert_eq!(x["sig_id"], y["sig_id"]);
            assert_eq!(x["src"], y["src"]);
            assert_eq!(x["dst_port"], y["dst_port"]);
        }
    }

    #[test]
    fn different_instances_diverge() {
        let a = model(42, 0).next().unwrap();
        let b = model(42, 1).next().unwrap();
        // same run seed, different producer ordinals
        assert_ne!((a["src"].clone(), a["src_port"].clone()), (b["src"].clone(), b["src_port"].clone()));
    }
}
