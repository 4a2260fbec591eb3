//! Command-line assembly: the core surface, the rendering of
//! extension-contributed arguments, and the construction of pipeline inputs
//! from the parse results.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};

use avalon_core::args::{ArgKind, ArgValue, ExtensionArgs, ParsedArgs, ParsedValue, ParserSpec};
use avalon_core::registry::{BuildContext, FormatEntry, MediumEntry};
use avalon_core::scheduler::{NamedMapping, ProducerSetup};
use avalon_core::{AvalonError, Medium, ProducerSpec, Registry};

/// The core argument surface; extension arguments are appended dynamically.
#[derive(clap::Args, Debug)]
pub struct CoreArgs {
    /// Producer specs like `snort`, `10snort1000`, or `asa{file://tag.map}`
    #[arg(value_name = "MODELS")]
    pub models: Vec<String>,

    /// Total records to emit (default: unlimited)
    #[arg(short = 'n', long)]
    pub number: Option<u64>,

    /// Global cap in records per second
    #[arg(short = 'r', long)]
    pub rate: Option<f64>,

    /// Records per batch; the final batch is clipped to --number
    #[arg(short = 's', long, default_value_t = 1)]
    pub batch_size: u64,

    /// Writer-pool size
    #[arg(short = 'w', long, default_value_t = 1)]
    pub output_writers: usize,

    /// Batch format title
    #[arg(short = 'f', long, default_value = "json-lines")]
    pub output_format: String,

    /// Medium title (default: picked from the sink flags you pass)
    #[arg(short = 'm', long)]
    pub output_media: Option<String>,

    /// Append a global mapping URI, in order (file://...)
    #[arg(long = "map", value_name = "URI")]
    pub map: Vec<String>,

    /// Mimic a text-log appliance (shortcut for --output-format=text-log)
    #[arg(long)]
    pub textlog: bool,

    /// Seconds queued writes may drain after a shutdown signal
    #[arg(long, default_value_t = 30)]
    pub drain_timeout: u64,

    /// Print model titles and exit
    #[arg(long)]
    pub list_models: bool,

    /// Print format titles and exit
    #[arg(long)]
    pub list_formats: bool,

    /// Print medium titles and exit
    #[arg(long)]
    pub list_mediums: bool,

    /// Print mapping titles and exit
    #[arg(long)]
    pub list_mappings: bool,

    /// Emit a shell completion script and exit
    #[arg(long, value_name = "SHELL", value_enum)]
    pub completion_script: Option<clap_complete::Shell>,
}

/// Render the core surface plus every queued extension argument.
pub fn build_command(parser: &ParserSpec) -> Command {
    let mut cmd = Command::new("avalon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extendable high-throughput streaming test-data generator")
        .arg_required_else_help(true);
    cmd = <CoreArgs as clap::Args>::augment_args(cmd);
    for entry in parser.entries() {
        let spec = &entry.spec;
        let mut arg = Arg::new(spec.dest).long(spec.long).help(spec.help);
        if let Some(short) = spec.short {
            arg = arg.short(short);
        }
        if let Some(heading) = entry.heading {
            arg = arg.help_heading(heading);
        }
        arg = match &spec.kind {
            ArgKind::Flag => arg.action(ArgAction::SetTrue),
            ArgKind::Value { default, hint } => {
                let mut arg = arg.action(ArgAction::Set).value_name(*hint);
                if let Some(default) = default {
                    arg = arg.default_value(*default);
                }
                arg
            }
            ArgKind::List { hint } => arg.action(ArgAction::Append).value_name(*hint),
        };
        cmd = cmd.arg(arg);
    }
    cmd
}

/// Lift every extension destination off the clap matches, with provenance.
pub fn collect_parsed(parser: &ParserSpec, matches: &ArgMatches) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    for entry in parser.entries() {
        let dest = entry.spec.dest;
        let user_supplied = matches.value_source(dest) == Some(ValueSource::CommandLine);
        let index = if user_supplied { matches.index_of(dest) } else { None };
        let value = match &entry.spec.kind {
            ArgKind::Flag => ArgValue::Bool(matches.get_flag(dest)),
            ArgKind::Value { .. } => match matches.get_one::<String>(dest) {
                Some(value) => ArgValue::Str(value.clone()),
                None => continue,
            },
            ArgKind::List { .. } => {
                let items: Vec<String> = matches
                    .get_many::<String>(dest)
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default();
                if items.is_empty() {
                    continue;
                }
                ArgValue::List(items)
            }
        };
        parsed.insert(dest, ParsedValue { value, user_supplied, index });
    }
    parsed
}

/// Print any requested `--list-*` output; true when the run should end here.
pub fn handle_lists(registry: &Registry, core: &CoreArgs) -> bool {
    let mut listed = false;
    if core.list_models {
        for title in registry.list_models() {
            println!("{title}");
        }
        listed = true;
    }
    if core.list_formats {
        for title in registry.list_formats() {
            println!("{title}");
        }
        listed = true;
    }
    if core.list_mediums {
        for title in registry.list_mediums() {
            println!("{title}");
        }
        listed = true;
    }
    if core.list_mappings {
        for title in registry.list_mappings() {
            println!("{title}");
        }
        listed = true;
    }
    listed
}

/// Pick the medium: an explicit title wins; otherwise the medium whose
/// argument namespace the user populated, ties broken by first
/// command-line index; stdout when none qualifies.
pub fn choose_medium<'r>(
    registry: &'r Registry,
    parsed: &ParsedArgs,
    explicit: Option<&str>,
) -> Result<&'r MediumEntry, AvalonError> {
    if let Some(title) = explicit {
        return registry
            .medium(title)
            .ok_or_else(|| AvalonError::config(format!("unknown medium: {title}")));
    }
    let mut best: Option<(usize, &MediumEntry)> = None;
    for entry in registry.mediums() {
        let args = ExtensionArgs::bind(&entry.meta, parsed);
        if let Some(index) = args.first_index() {
            if best.as_ref().map(|(b, _)| index < *b).unwrap_or(true) {
                best = Some((index, entry));
            }
        }
    }
    match best {
        Some((_, entry)) => Ok(entry),
        None => registry
            .medium("stdout")
            .ok_or_else(|| AvalonError::config("no stdout medium registered")),
    }
}

/// Expand producer specs into per-instance setups: each instance owns its
/// own model, mapping chain (inline, then global `--map`, then flag-enabled
/// extensions), and format.
pub fn build_producers(
    registry: &Registry,
    specs: &[ProducerSpec],
    parsed: &ParsedArgs,
    seed: u64,
    format_entry: &FormatEntry,
    global_maps: &[String],
) -> Result<Vec<ProducerSetup>, AvalonError> {
    let format_args = ExtensionArgs::bind(&format_entry.meta, parsed);
    let mut producers = Vec::new();
    let mut ordinal = 0usize;
    for spec in specs {
        let entry = registry
            .model(&spec.title)
            .ok_or_else(|| AvalonError::config(format!("unknown model: {}", spec.title)))?;
        let model_args = ExtensionArgs::bind(&entry.meta, parsed);
        for _ in 0..spec.count {
            let model =
                (entry.build)(&BuildContext { args: &model_args, seed, instance: ordinal })?;

            let mut mappings = Vec::new();
            for url in spec.inline_mappings.iter().chain(global_maps) {
                mappings.push(NamedMapping {
                    name: url.clone(),
                    mapping: avalon_tx::inline::load(url)?,
                });
            }
            for mapping_entry in registry.mappings() {
                let mapping_args = ExtensionArgs::bind(&mapping_entry.meta, parsed);
                if (mapping_entry.enabled)(&mapping_args) {
                    mappings.push(NamedMapping {
                        name: mapping_entry.meta.title.to_string(),
                        mapping: (mapping_entry.build)(&BuildContext {
                            args: &mapping_args,
                            seed,
                            instance: ordinal,
                        })?,
                    });
                }
            }

            let format =
                (format_entry.build)(&BuildContext { args: &format_args, seed, instance: ordinal })?;
            producers.push(ProducerSetup {
                title: spec.title.clone(),
                weight: spec.weight,
                model,
                mappings,
                format,
            });
            ordinal += 1;
        }
    }
    Ok(producers)
}

/// One medium instance per writer slot.
pub fn build_mediums(
    entry: &MediumEntry,
    parsed: &ParsedArgs,
    seed: u64,
    writers: usize,
) -> Result<Vec<Box<dyn Medium>>, AvalonError> {
    let args = ExtensionArgs::bind(&entry.meta, parsed);
    (0..writers)
        .map(|slot| (entry.build)(&BuildContext { args: &args, seed, instance: slot }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::default();
        avalon_models::register(&mut registry).unwrap();
        avalon_tx::register(&mut registry).unwrap();
        avalon_io::register(&mut registry).unwrap();
        crate::generics::register(&mut registry).unwrap();
        registry
    }

    fn parse(argv: &[&str]) -> (ParserSpec, ParsedArgs, CoreArgs) {
        let registry = registry();
        let mut parser = ParserSpec::default();
        registry.contribute_args(&mut parser);
        let matches = build_command(&parser)
            .try_get_matches_from(std::iter::once("avalon").chain(argv.iter().copied()))
            .unwrap();
        let parsed = collect_parsed(&parser, &matches);
        let core = <CoreArgs as clap::FromArgMatches>::from_arg_matches(&matches).unwrap();
        (parser, parsed, core)
    }

    #[test]
    fn defaults_parse() {
        let (_, parsed, core) = parse(&["snort"]);
        assert_eq!(core.batch_size, 1);
        assert_eq!(core.output_format, "json-lines");
        // defaults surface without a user origin
        let sensor = parsed.get("snort_sensor").unwrap();
        assert_eq!(sensor.value, ArgValue::Str("sensor01".into()));
        assert!(!sensor.user_supplied);
    }

    #[test]
    fn auto_medium_defaults_to_stdout() {
        let registry = registry();
        let (_, parsed, _) = parse(&["snort"]);
        let entry = choose_medium(&registry, &parsed, None).unwrap();
        assert_eq!(entry.meta.title, "stdout");
    }

    #[test]
    fn auto_medium_follows_user_sink_flags() {
        let registry = registry();
        let (_, parsed, _) = parse(&["snort", "--file-name", "/tmp/a.jsonl"]);
        let entry = choose_medium(&registry, &parsed, None).unwrap();
        assert_eq!(entry.meta.title, "file");
    }

    #[test]
    fn auto_medium_first_on_command_line_wins() {
        let registry = registry();
        let (_, parsed, _) = parse(&[
            "snort",
            "--kafka-topic",
            "logs",
            "--file-name",
            "/tmp/a.jsonl",
        ]);
        let entry = choose_medium(&registry, &parsed, None).unwrap();
        assert_eq!(entry.meta.title, "kafka");

        let (_, parsed, _) = parse(&[
            "snort",
            "--file-name",
            "/tmp/a.jsonl",
            "--kafka-topic",
            "logs",
        ]);
        let entry = choose_medium(&registry, &parsed, None).unwrap();
        assert_eq!(entry.meta.title, "file");
    }

    #[test]
    fn explicit_medium_wins_and_unknown_fails() {
        let registry = registry();
        let (_, parsed, _) = parse(&["snort", "--file-name", "/tmp/a.jsonl"]);
        let entry = choose_medium(&registry, &parsed, Some("stdout")).unwrap();
        assert_eq!(entry.meta.title, "stdout");
        assert!(choose_medium(&registry, &parsed, Some("carrier-pigeon")).is_err());
    }

    #[test]
    fn producers_expand_counts_and_enable_flagged_mappings() {
        let registry = registry();
        let (_, parsed, core) = parse(&["2snort3 asa", "--identifier-field", "tag"]);
        let specs = avalon_core::parse_producer_specs(&core.models).unwrap();
        let format_entry = registry.format("json-lines").unwrap();
        let producers =
            build_producers(&registry, &specs, &parsed, 7, format_entry, &core.map).unwrap();
        assert_eq!(producers.len(), 3);
        assert_eq!(producers[0].title, "snort");
        assert_eq!(producers[0].weight, 3);
        assert_eq!(producers[2].title, "asa");
        assert_eq!(producers[2].weight, 1);
        // the identifier mapping joined every chain
        for producer in &producers {
            assert_eq!(producer.mappings.len(), 1);
            assert_eq!(producer.mappings[0].name, "identifier");
        }
    }

    #[test]
    fn unknown_model_title_is_a_config_error() {
        let registry = registry();
        let (_, parsed, core) = parse(&["nosuchmodel"]);
        let specs = avalon_core::parse_producer_specs(&core.models).unwrap();
        let format_entry = registry.format("json-lines").unwrap();
        let err = build_producers(&registry, &specs, &parsed, 7, format_entry, &core.map)
            .unwrap_err();
        assert!(err.to_string().contains("nosuchmodel"));
        assert_eq!(err.exit_code(), avalon_core::EXIT_CONFIG);
    }
}
