//! Generic extensions shipped with the binary: cross-cutting features that
//! only hook into startup.

use anyhow::Result;

use avalon_core::args::{ArgSpec, ArgValue, HookContext, ParserSpec};
use avalon_core::registry::{ExtensionMeta, GenericEntry};
use avalon_core::{AvalonError, Generic, Registry};

pub fn register(registry: &mut Registry) -> Result<(), AvalonError> {
    registry.register_generic(GenericEntry {
        meta: ExtensionMeta::new("seed")
            .with_mapping(&[("seed", "value")])
            .with_args(seed_args),
        build: || Box::new(SeedGeneric),
    })?;
    registry.register_generic(GenericEntry {
        meta: ExtensionMeta::new("verbosity"),
        build: || Box::new(VerbosityGeneric),
    })?;
    Ok(())
}

/// `--seed N` makes a run reproducible: the value flows into every
/// extension's `BuildContext`.
pub struct SeedGeneric;

fn seed_args() -> Vec<ArgSpec> {
    vec![ArgSpec::value("seed", "seed", "Seed for reproducible record synthesis", "N")]
}

impl Generic for SeedGeneric {
    fn post_parse_args(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        if let Some(parsed) = ctx.args.get("seed") {
            let ArgValue::Str(raw) = &parsed.value else {
                anyhow::bail!("--seed expects an integer");
            };
            let seed: u64 = raw.parse().map_err(|_| anyhow::anyhow!("--seed expects an integer"))?;
            ctx.seed = Some(seed);
        }
        Ok(())
    }
}

/// `-q`/`-v` pick the default log filter applied before the pipeline starts.
///
/// Contributes its flags in `pre_add_args` rather than through the meta, so
/// the hook sequence is exercised on every startup.
pub struct VerbosityGeneric;

impl Generic for VerbosityGeneric {
    fn pre_add_args(&mut self, parser: &mut ParserSpec) -> Result<()> {
        parser.push(
            Some("verbosity"),
            ArgSpec::flag("quiet", "quiet", "Only warnings and errors on stderr").short('q'),
        );
        parser.push(
            Some("verbosity"),
            ArgSpec::flag("verbose", "verbose", "Debug diagnostics on stderr").short('v'),
        );
        Ok(())
    }

    fn post_parse_args(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let flag = |dest: &str| {
            matches!(ctx.args.get(dest), Some(parsed) if parsed.value == ArgValue::Bool(true))
        };
        let quiet = flag("quiet");
        let verbose = flag("verbose");
        if quiet && verbose {
            anyhow::bail!("--quiet conflicts with --verbose");
        }
        if quiet {
            ctx.log_filter = Some("warn".to_string());
        } else if verbose {
            ctx.log_filter = Some("debug".to_string());
        }
        Ok(())
    }
}
