mod base_uri;
mod code_flow;
mod collection;
mod config;
mod error;
mod json_map;
mod location;
mod logging;
mod mapper;
mod message;
mod model;
mod paths;
mod picker;
mod region;
mod result_info;
mod run_info;
mod session;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use url::Url;

use crate::code_flow::parse_code_flow_id;
use crate::collection::DiagnosticCollection;
use crate::config::{Settings, parse_max_diagnostics};
use crate::location::{
    Location, map_to_sarif_file_location, map_to_sarif_file_result, map_to_sarif_file_step,
};
use crate::logging::{init_logging, with_span};
use crate::mapper::FilePicker;
use crate::paths::parse_absolute_uri;
use crate::picker::stdin_picker;
use crate::session::Session;

/// CLI arguments for sariflens execution.
#[derive(Parser, Debug)]
#[command(
    name = "sariflens",
    about = "Load SARIF logs, map their artifacts onto local files, and emit a flattened diagnostics model.",
    version,
    subcommand_negates_reqs = true,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    load: LoadArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

/// Options for loading SARIF logs.
#[derive(Args, Debug, Clone)]
struct LoadArgs {
    #[arg(value_name = "SARIF", required = true, num_args = 1.., help = "SARIF 2.1.0 log files to load.")]
    sarif: Vec<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Write the model to PATH instead of stdout.")]
    output: Option<PathBuf>,
    #[arg(long, help = "Never prompt for files that cannot be found.")]
    batch: bool,
    #[arg(
        long = "map-root",
        value_name = "FROM=TO",
        action = clap::ArgAction::Append,
        help = "Resolve artifacts under the FROM URI or path inside the local directory TO. Repeatable."
    )]
    map_roots: Vec<String>,
    #[arg(
        long,
        value_name = "N",
        value_parser = parse_max_diagnostics,
        help = "Maximum diagnostics shown per file (default 500)."
    )]
    max_diagnostics: Option<usize>,
    #[arg(
        long,
        value_name = "PATH",
        action = clap::ArgAction::Append,
        help = "Close a loaded SARIF file again before writing the model. Repeatable."
    )]
    close: Vec<PathBuf>,
    #[arg(long, short, help = "Enable debug logging.")]
    verbose: bool,
}

/// Subcommands supported by the CLI.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print where a result sits inside the raw SARIF text.
    Locate(LocateArgs),
}

/// Arguments for locating a result in a SARIF file.
#[derive(Args, Debug, Clone)]
struct LocateArgs {
    #[arg(value_name = "SARIF")]
    sarif: PathBuf,
    #[arg(long, value_name = "N", default_value_t = 0)]
    run: usize,
    #[arg(long, value_name = "N")]
    result: usize,
    #[arg(long, help = "Span the whole result object instead of its first location.")]
    result_object: bool,
    #[arg(
        long,
        value_name = "TRAVERSAL_ID",
        conflicts_with = "result_object",
        help = "Locate a code-flow step addressed as CODEFLOW_THREADFLOW_STEP."
    )]
    step: Option<String>,
    #[arg(long, help = "Report a zero-width point at the start of the value.")]
    insertion: bool,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            std::process::ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Locate(args)) => run_locate(args),
        None => run_load(cli.load),
    }
}

fn run_load(args: LoadArgs) -> Result<()> {
    init_logging(args.verbose);
    let settings = Settings::from_env()?.with_overrides(args.max_diagnostics, args.batch);
    let session = Session::new(settings);
    let picker: Option<Box<dyn FilePicker>> = if session.settings.interactive {
        Some(Box::new(stdin_picker()))
    } else {
        None
    };
    let mut collection =
        DiagnosticCollection::new(picker, session.settings.max_diagnostics_per_file);

    for map_root in &args.map_roots {
        let (original, local) = parse_map_root(map_root)?;
        collection.register_rewrite(&original, &local);
    }
    collection.mapping_changed(&session);

    let mut failed = Vec::new();
    for path in &args.sarif {
        let loaded = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))
            .and_then(|text| {
                collection
                    .add_document(&session, path, &text)
                    .with_context(|| format!("failed to load {}", path.display()))
            });
        if let Err(err) = loaded {
            error!("{err:#}");
            failed.push(path.display().to_string());
        }
    }

    for path in &args.close {
        let removal = collection.remove_runs(path);
        if removal.run_ids.is_empty() {
            info!("{} was not loaded", path.display());
        }
    }
    info!(
        "{} files with diagnostics, {} results unmapped",
        collection.diagnostics().len(),
        collection.unmapped_count()
    );

    with_span("write", "model", || -> Result<()> {
        let mut writer = output_writer(args.output.as_deref())?;
        serde_json::to_writer(&mut writer, &collection.snapshot())
            .context("failed to serialize model")?;
        writer.write_all(b"\n").context("failed to write model")?;
        Ok(())
    })?;

    if !failed.is_empty() {
        bail!("failed to load {}", failed.join(", "));
    }
    Ok(())
}

fn run_locate(args: LocateArgs) -> Result<()> {
    let text = fs::read_to_string(&args.sarif)
        .with_context(|| format!("failed to read {}", args.sarif.display()))?;
    let mapping = json_map::parse(&text)
        .with_context(|| format!("failed to parse {}", args.sarif.display()))?;
    let absolute = std::path::absolute(&args.sarif)
        .with_context(|| format!("failed to resolve {}", args.sarif.display()))?;
    let uri = Url::from_file_path(&absolute)
        .map_err(|()| anyhow!("{} is not a file path", absolute.display()))?;

    let location = match args.step.as_deref() {
        Some(step) => {
            let step = parse_code_flow_id(step)
                .ok_or_else(|| anyhow!("invalid traversal id {step}"))?;
            map_to_sarif_file_step(&mapping, &uri, args.run, args.result, step, args.insertion)
                .ok_or_else(|| {
                    anyhow!("result {} of run {} has no step {}", args.result, args.run, step.format())
                })?
        }
        None if args.result_object => {
            map_to_sarif_file_result(&mapping, &uri, args.run, args.result, args.insertion)
                .ok_or_else(|| anyhow!("run {} has no result {}", args.run, args.result))?
        }
        None => map_to_sarif_file_location(&mapping, &uri, args.run, args.result, args.insertion)
            .ok_or_else(|| anyhow!("run {} has no result {}", args.run, args.result))?,
    };

    println!("{}", format_location(&args.sarif, &location));
    Ok(())
}

/// Parse `FROM=TO` into an original URI prefix and a local directory URI.
fn parse_map_root(value: &str) -> Result<(Url, Url)> {
    let (from, to) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FROM=TO, got {value}"))?;
    if from.is_empty() || to.is_empty() {
        bail!("expected FROM=TO, got {value}");
    }
    let original = match parse_absolute_uri(from) {
        Some(uri) => uri,
        None => directory_url(Path::new(from))?,
    };
    let local = directory_url(Path::new(to))?;
    Ok((original, local))
}

fn directory_url(path: &Path) -> Result<Url> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    Url::from_directory_path(&absolute)
        .map_err(|()| anyhow!("{} is not a directory path", absolute.display()))
}

/// `path:line:col-line:col`, one-based for humans.
fn format_location(path: &Path, location: &Location) -> String {
    let start = location.range.start;
    let end = location.range.end;
    format!(
        "{}:{}:{}-{}:{}",
        path.display(),
        start.line + 1,
        start.character + 1,
        end.line + 1,
        end.character + 1
    )
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => {
            Ok(Box::new(File::create(path).with_context(|| {
                format!("failed to open {}", path.display())
            })?))
        }
        None => Ok(Box::new(io::stdout())),
    }
}
