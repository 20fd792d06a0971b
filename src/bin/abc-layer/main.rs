//! abc-layer - inspect, layer and convert archives.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use alembic_core::abc::{copy_archive, IArchive, IObject, IProperty, OArchive};
use alembic_core::config::Settings;
use alembic_core::{Engine, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("ABC_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help() {
    println!("abc-layer - archive layering toolkit");
    println!();
    println!("USAGE:");
    println!("    abc-layer [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info    <file>...             Show archive summary (several files are layered)");
    println!("    t, tree    <file>...             Show object and property hierarchy");
    println!("    l, layer   <out> <in>...         Flatten layered inputs into one archive");
    println!("    c, convert <in> <out>            Rewrite an archive (see --engine)");
    println!("    h, help                          Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose        Show debug output");
    println!("    -vv, --trace         Show trace output");
    println!("    -q, --quiet          Errors only");
    println!("    --engine <name>      Output engine: ogawa | legacy");
    println!("    --strict             Fail when a layer changes a property's shape");
    println!("    --config <file>      JSON settings file");
    println!();
    println!("ENVIRONMENT:");
    println!("    ABC_LOG              tracing filter, e.g. alembic_core=debug");
    println!("    ABC_ENGINE, ABC_DEDUP, ABC_MMAP, ABC_CACHE_BYTES, ABC_STRICT_LAYERS");
}

struct Cli {
    level: &'static str,
    engine: Option<Engine>,
    strict: bool,
    config: Option<PathBuf>,
    args: Vec<String>,
}

fn parse_args(raw: &[String]) -> std::result::Result<Cli, String> {
    let mut cli = Cli {
        level: "info",
        engine: None,
        strict: false,
        config: None,
        args: Vec::new(),
    };
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => cli.level = "debug",
            "-vv" | "--trace" => cli.level = "trace",
            "-q" | "--quiet" => cli.level = "error",
            "--strict" => cli.strict = true,
            "--engine" => {
                let name = iter.next().ok_or("--engine needs a value")?;
                cli.engine =
                    Some(Engine::from_name(name).ok_or_else(|| format!("unknown engine '{name}'"))?);
            }
            "--config" => {
                cli.config = Some(PathBuf::from(iter.next().ok_or("--config needs a value")?));
            }
            _ => cli.args.push(arg.clone()),
        }
    }
    Ok(cli)
}

fn main() -> ExitCode {
    let raw: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&raw) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(cli.level);

    let Some(command) = cli.args.first() else {
        print_help();
        return ExitCode::SUCCESS;
    };
    match run(command, &cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: &str, cli: &Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(engine) = cli.engine {
        settings.engine = engine;
    }
    if cli.strict {
        settings.strict_layers = true;
    }
    let rest = &cli.args[1..];
    debug!(command, ?settings, "running");

    match command {
        "info" | "i" => cmd_info(&open_inputs(rest, &settings)?),
        "tree" | "t" => {
            let archive = open_inputs(rest, &settings)?;
            print_tree(&archive.top()?, 0)
        }
        "layer" | "l" => match rest {
            [out, inputs @ ..] if !inputs.is_empty() => {
                let archive = open_inputs(inputs, &settings)?;
                write_copy(&archive, Path::new(out), &settings)
            }
            _ => usage("layer <out> <in>..."),
        },
        "convert" | "c" => match rest {
            [input, out] => {
                let archive = IArchive::open_with(input, &settings.read_options())?;
                write_copy(&archive, Path::new(out), &settings)
            }
            _ => usage("convert <in> <out>"),
        },
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        // a bare file is the same as `info`
        other if other.ends_with(".abc") => cmd_info(&open_inputs(&cli.args, &settings)?),
        other => Err(alembic_core::Error::other(format!(
            "unknown command '{other}', see 'abc-layer help'"
        ))),
    }
}

fn usage<T>(text: &str) -> Result<T> {
    Err(alembic_core::Error::other(format!("usage: abc-layer {text}")))
}

fn open_inputs(paths: &[String], settings: &Settings) -> Result<IArchive> {
    match paths {
        [] => usage("<command> <file>..."),
        [single] => IArchive::open_with(single, &settings.read_options()),
        many => IArchive::open_layered(many, &settings.read_options(), settings.layer_options()),
    }
    .inspect(|archive| info!(archive = archive.name(), engine = archive.engine(), "opened"))
}

fn write_copy(archive: &IArchive, out: &Path, settings: &Settings) -> Result<()> {
    let mut output = OArchive::create_with(out, &settings.write_options())?;
    copy_archive(archive, &mut output)?;
    let dedup = output.dedup_count();
    output.close()?;
    println!(
        "Wrote {} ({} engine, {} deduplicated samples)",
        out.display(),
        settings.engine,
        dedup
    );
    Ok(())
}

#[derive(Default)]
struct Counts {
    objects: usize,
    instances: usize,
    properties: usize,
    samples: usize,
}

fn count(obj: &IObject, counts: &mut Counts) -> Result<()> {
    counts.objects += 1;
    if obj.is_instance_root() {
        counts.instances += 1;
        return Ok(());
    }
    count_properties(&obj.properties()?, counts)?;
    for child in obj.children() {
        count(&child?, counts)?;
    }
    Ok(())
}

fn count_properties(
    props: &alembic_core::abc::ICompoundProperty,
    counts: &mut Counts,
) -> Result<()> {
    for i in 0..props.num_properties() {
        counts.properties += 1;
        match props.property(i)? {
            IProperty::Compound(c) => count_properties(&c, counts)?,
            IProperty::Scalar(s) => counts.samples += s.num_samples(),
            IProperty::Array(a) => counts.samples += a.num_samples(),
        }
    }
    Ok(())
}

fn cmd_info(archive: &IArchive) -> Result<()> {
    println!("Archive: {}", archive.name());
    println!("Engine:  {}", archive.engine());
    if let Some(app) = archive.app_name() {
        println!("Application: {app}");
    }
    if let Some(version) = archive.library_version() {
        println!("Written by:  {version}");
    }
    println!("Time samplings: {}", archive.num_time_samplings());
    for i in 0..archive.num_time_samplings() {
        let ts = archive.time_sampling(i)?;
        let max = archive
            .max_num_samples_for_time_sampling(i)
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        println!("  [{i}] {:?} (max samples: {max})", ts.sampling_type());
    }

    let mut counts = Counts::default();
    count(&archive.top()?, &mut counts)?;
    println!();
    println!("Objects:    {}", counts.objects);
    println!("Instances:  {}", counts.instances);
    println!("Properties: {}", counts.properties);
    println!("Samples:    {}", counts.samples);
    Ok(())
}

fn print_tree(obj: &IObject, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    let schema = obj.meta_data().schema();
    match (obj.instance_source_path(), schema.is_empty()) {
        (Some(target), _) => println!("{indent}{} -> {target}", obj.name()),
        (None, true) => println!("{indent}{}", obj.name()),
        (None, false) => println!("{indent}{} [{schema}]", obj.name()),
    }
    if obj.is_instance_root() {
        return Ok(());
    }
    let props = obj.properties()?;
    for i in 0..props.num_properties() {
        if let Some(h) = props.property_header(i) {
            println!("{indent}  .{} ({}, {})", h.name, h.property_type, h.data_type);
        }
    }
    for child in obj.children() {
        print_tree(&child?, depth + 1)?;
    }
    Ok(())
}
