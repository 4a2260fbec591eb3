//! # Avalon Models - Built-in Record Synthesizers
//!
//! This crate provides the model extensions shipped with Avalon. Each model
//! imitates the records of a real appliance family:
//!
//! - **snort**: IDS fast-alert records
//! - **asa**: Cisco-ASA-style firewall session records
//! - **netflow**: network flow summaries
//!
//! Every producer worker owns its own model instance with its own RNG stream,
//! derived from the run seed and the instance ordinal, so parallel instances
//! emit different records while a fixed `--seed` keeps a run reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use avalon_core::registry::{BuildContext, ExtensionMeta, ModelEntry};
use avalon_core::{AvalonError, Registry};

pub mod asa;
pub mod netflow;
pub mod snort;

/// Register every built-in model.
pub fn register(registry: &mut Registry) -> Result<(), AvalonError> {
    registry.register_model(ModelEntry {
        meta: ExtensionMeta::new("asa").with_args(asa::args),
        build: asa::build,
    })?;
    registry.register_model(ModelEntry {
        meta: ExtensionMeta::new("netflow").with_args(netflow::args),
        build: netflow::build,
    })?;
    registry.register_model(ModelEntry {
        meta: ExtensionMeta::new("snort").with_args(snort::args),
        build: snort::build,
    })?;
    Ok(())
}

/// Per-instance RNG stream: run seed spread by the instance ordinal.
pub(crate) fn instance_rng(ctx: &BuildContext<'_>) -> StdRng {
    let spread = (ctx.instance as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
    StdRng::seed_from_u64(ctx.seed ^ spread)
}

/// A host on the monitored network.
pub(crate) fn internal_ip(rng: &mut StdRng) -> String {
    format!(
        "10.{}.{}.{}",
        rng.random_range(0..=255u16),
        rng.random_range(0..=255u16),
        rng.random_range(1..=254u16)
    )
}

/// A routable address outside the monitored network.
pub(crate) fn external_ip(rng: &mut StdRng) -> String {
    loop {
        let a = rng.random_range(1..=223u16);
        if a == 10 || a == 127 {
            continue;
        }
        return format!(
            "{a}.{}.{}.{}",
            rng.random_range(0..=255u16),
            rng.random_range(0..=255u16),
            rng.random_range(1..=254u16)
        );
    }
}

pub(crate) fn ephemeral_port(rng: &mut StdRng) -> u16 {
    rng.random_range(1024..=65535)
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalon_core::args::{ArgValue, ExtensionArgs, ParsedArgs, ParsedValue};

    pub(crate) fn bound_args(
        meta: &ExtensionMeta,
        values: &[(&str, &str)],
    ) -> ExtensionArgs {
        let mut parsed = ParsedArgs::default();
        // declared defaults first, the way the CLI parse would surface them
        for spec in (meta.args)() {
            if let avalon_core::args::ArgKind::Value { default: Some(default), .. } = spec.kind {
                parsed.insert(
                    spec.dest,
                    ParsedValue {
                        value: ArgValue::Str(default.to_string()),
                        user_supplied: false,
                        index: None,
                    },
                );
            }
        }
        for (dest, value) in values {
            parsed.insert(
                *dest,
                ParsedValue {
                    value: ArgValue::Str((*value).to_string()),
                    user_supplied: true,
                    index: None,
                },
            );
        }
        ExtensionArgs::bind(meta, &parsed)
    }

    #[test]
    fn all_models_register_once() {
        let mut registry = Registry::default();
        register(&mut registry).unwrap();
        assert_eq!(registry.list_models(), vec!["asa", "netflow", "snort"]);
        // a second registry pass discovers the same set
        let mut again = Registry::default();
        register(&mut again).unwrap();
        assert_eq!(registry.list_models(), again.list_models());
    }

    #[test]
    fn instance_streams_differ() {
        let args = ExtensionArgs::default();
        let a = instance_rng(&BuildContext { args: &args, seed: 7, instance: 0 }).random::<u64>();
        let b = instance_rng(&BuildContext { args: &args, seed: 7, instance: 1 }).random::<u64>();
        assert_ne!(a, b);
    }
}
