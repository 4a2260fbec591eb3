//! Cisco-ASA-style firewall session records.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use avalon_core::args::ArgSpec;
use avalon_core::registry::BuildContext;
use avalon_core::{record_from, AvalonError, Model, Record};

use crate::{ephemeral_port, external_ip, instance_rng, internal_ip};

// (message_id, severity, action)
const MESSAGES: &[(&str, u8, &str)] = &[
    ("302013", 6, "Built inbound TCP connection"),
    ("302014", 6, "Teardown TCP connection"),
    ("302015", 6, "Built outbound UDP connection"),
    ("302016", 6, "Teardown UDP connection"),
    ("106023", 4, "Deny tcp src outside"),
    ("305011", 6, "Built dynamic TCP translation"),
    ("113019", 4, "Session disconnected"),
];

const PROTOCOLS: &[&str] = &["tcp", "udp"];

#[derive(Serialize)]
struct Session<'a> {
    timestamp: String,
    host: &'a str,
    severity: u8,
    message_id: &'a str,
    action: &'a str,
    proto: &'a str,
    src: String,
    src_port: u16,
    dst: String,
    dst_port: u16,
    connection_id: u32,
}

pub struct AsaModel {
    hostname: String,
    rng: StdRng,
    connection_id: u32,
}

impl Model for AsaModel {
    fn next(&mut self) -> Result<Record> {
        let (message_id, severity, action) = MESSAGES[self.rng.random_range(0..MESSAGES.len())];
        self.connection_id = self.connection_id.wrapping_add(1);
        record_from(&Session {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            host: &self.hostname,
            severity,
            message_id,
            action,
            proto: PROTOCOLS[self.rng.random_range(0..PROTOCOLS.len())],
            src: internal_ip(&mut self.rng),
            src_port: ephemeral_port(&mut self.rng),
            dst: external_ip(&mut self.rng),
            dst_port: self.rng.random_range(1..=1024),
            connection_id: self.connection_id,
        })
    }
}

pub(crate) fn args() -> Vec<ArgSpec> {
    vec![ArgSpec::value(
        "asa_hostname",
        "asa-hostname",
        "Firewall hostname stamped on every record",
        "NAME",
    )
    .default("asa01")]
}

pub(crate) fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Model>, AvalonError> {
    Ok(Box::new(AsaModel {
        hostname: ctx.args.get_str("hostname")?,
        rng: instance_rng(ctx),
        connection_id: 0,
    }))
}
