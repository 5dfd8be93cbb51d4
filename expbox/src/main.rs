//! `expbox` command line.
//!
//! Runs against the current directory as project root. Project defaults come
//! from `.expbox/config.toml`; flags override them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use expbox::core::ids::{IdStyle, LinkStyle};
use expbox::core::index::Privacy;
use expbox::error::ExpboxError;
use expbox::exit_codes;
use expbox::export::{DEFAULT_CSV_NAME, ExportOptions, export_csv};
use expbox::io::config::ConfigSource;
use expbox::io::exp_logger::LoggerBackend;
use expbox::logging;
use expbox::maintenance::{ArchiveOptions, archive_exp, sweep_stale};
use expbox::session::Session;

#[derive(Parser)]
#[command(
    name = "expbox",
    version,
    about = "Lightweight experiment bookkeeping: one box and one meta.json per run"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new experiment box and print its id.
    Init(InitArgs),
    /// Print a JSON summary of an experiment (defaults to the active one).
    Load {
        exp_id: Option<String>,
        #[command(flatten)]
        location: Location,
        /// Make this the active experiment.
        #[arg(long)]
        activate: bool,
    },
    /// Checkpoint an experiment (defaults to the active one).
    Save(SaveArgs),
    /// Soft-archive an experiment: set status and note, delete nothing.
    Archive(ArchiveArgs),
    /// Mark runs that are still "running" but never checkpointed as stale.
    Sweep {
        #[command(flatten)]
        location: Location,
        /// Report affected ids without touching them.
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        privacy: Option<Privacy>,
    },
    /// Export one CSV row per experiment and print the output path.
    ExportCsv {
        #[command(flatten)]
        location: Location,
        /// Output file.
        #[arg(long, short, default_value = DEFAULT_CSV_NAME)]
        out: PathBuf,
        /// Comma-separated column list (default: union of all columns).
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
        #[arg(long)]
        privacy: Option<Privacy>,
    },
}

#[derive(Args)]
struct Location {
    /// Directory holding experiment boxes (default from settings, "results").
    #[arg(long)]
    results_root: Option<PathBuf>,
}

#[derive(Args)]
struct InitArgs {
    /// Project name (defaults to the current directory name).
    #[arg(long)]
    project: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    purpose: Option<String>,
    /// Config file (.json, .yaml, .yml, .toml) or an inline JSON object.
    #[arg(long)]
    config: Option<String>,
    #[command(flatten)]
    location: Location,
    /// Explicit experiment id (otherwise generated).
    #[arg(long)]
    exp_id: Option<String>,
    #[arg(long)]
    id_style: Option<IdStyle>,
    #[arg(long)]
    id_prefix: Option<String>,
    #[arg(long)]
    id_suffix: Option<String>,
    #[arg(long)]
    link_style: Option<LinkStyle>,
    /// Logger backend: none or file.
    #[arg(long)]
    logger: Option<LoggerBackend>,
    /// Config snapshot file name under artifacts/.
    #[arg(long)]
    snapshot_name: Option<String>,
    #[arg(long, default_value = "running")]
    status: String,
    #[arg(long)]
    env_note: Option<String>,
    /// Do not point .expbox/active at the new experiment.
    #[arg(long)]
    no_activate: bool,
    /// Skip the environment snapshot.
    #[arg(long)]
    no_env: bool,
}

#[derive(Args)]
struct SaveArgs {
    exp_id: Option<String>,
    #[command(flatten)]
    location: Location,
    /// Logger backend attached while saving.
    #[arg(long, default_value = "none")]
    logger: LoggerBackend,
    #[arg(long, default_value = "done")]
    status: String,
    #[arg(long)]
    final_note: Option<String>,
    /// Keep the stored git section as is.
    #[arg(long)]
    no_update_git: bool,
    #[arg(long)]
    privacy: Option<Privacy>,
    /// Print a one-line summary.
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Args)]
struct ArchiveArgs {
    exp_id: String,
    #[command(flatten)]
    location: Location,
    #[arg(long, default_value = "archived")]
    status: String,
    /// Appended to the final note.
    #[arg(long)]
    reason: Option<String>,
    /// Id of the experiment that replaces this one.
    #[arg(long)]
    superseded_by: Option<String>,
    #[arg(long)]
    privacy: Option<Privacy>,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        let code = match err.downcast_ref::<ExpboxError>() {
            Some(lib_err) => {
                if let Some(hint) = lib_err.hint() {
                    eprintln!("{hint}");
                }
                exit_codes::for_error(lib_err)
            }
            None => exit_codes::INVALID,
        };
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let project_root = std::env::current_dir().context("resolve current directory")?;
    let mut session = Session::open(&project_root)?;
    match cli.command {
        Command::Init(args) => cmd_init(&mut session, args),
        Command::Load {
            exp_id,
            location,
            activate,
        } => cmd_load(&mut session, exp_id.as_deref(), &location, activate),
        Command::Save(args) => cmd_save(&mut session, args),
        Command::Archive(args) => cmd_archive(&session, args),
        Command::Sweep {
            location,
            dry_run,
            privacy,
        } => cmd_sweep(&session, &location, dry_run, privacy),
        Command::ExportCsv {
            location,
            out,
            fields,
            privacy,
        } => cmd_export(&session, &location, &out, fields, privacy),
    }
}

fn results_root(session: &Session, location: &Location) -> PathBuf {
    location
        .results_root
        .clone()
        .unwrap_or_else(|| session.settings().results_root.clone())
}

fn cmd_init(session: &mut Session, args: InitArgs) -> Result<()> {
    let mut opts = session.init_options();
    opts.project = args.project;
    opts.title = args.title;
    opts.purpose = args.purpose;
    if let Some(config) = args.config.as_deref() {
        opts.config = ConfigSource::from_arg(config)?;
    }
    opts.results_root = results_root(session, &args.location);
    opts.exp_id = args.exp_id;
    if let Some(style) = args.id_style {
        opts.id.style = style;
    }
    if args.id_prefix.is_some() {
        opts.id.prefix = args.id_prefix;
    }
    if args.id_suffix.is_some() {
        opts.id.suffix = args.id_suffix;
    }
    if let Some(link) = args.link_style {
        opts.id.link_style = link;
    }
    if let Some(logger) = args.logger {
        opts.logger = logger;
    }
    if let Some(name) = args.snapshot_name {
        opts.config_snapshot_name = name;
    }
    opts.status = Some(args.status);
    opts.env_note = args.env_note;
    opts.probe_env = !args.no_env;

    let ctx = session.init(opts, !args.no_activate)?;
    println!("{}", ctx.exp_id);
    Ok(())
}

fn cmd_load(
    session: &mut Session,
    exp_id: Option<&str>,
    location: &Location,
    activate: bool,
) -> Result<()> {
    let mut opts = session.load_options();
    opts.results_root = results_root(session, location);
    let results_root = session.project_paths().resolve(&opts.results_root);
    let ctx = session.load(exp_id, &opts, activate)?;
    let meta = &ctx.meta;
    let summary = json!({
        "exp_id": meta.exp_id,
        "project": meta.project,
        "title": meta.title,
        "purpose": meta.purpose,
        "status": meta.status,
        "created_at": meta.created_at,
        "finished_at": meta.finished_at,
        "results_root": results_root.display().to_string(),
        "root": ctx.paths.root.display().to_string(),
        "logger_backend": meta.logger_backend,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("serialize summary")?
    );
    Ok(())
}

fn cmd_save(session: &mut Session, args: SaveArgs) -> Result<()> {
    let mut load = session.load_options();
    load.results_root = results_root(session, &args.location);
    load.logger = args.logger;
    session.load(args.exp_id.as_deref(), &load, false)?;

    let mut save = session.save_options();
    save.status = Some(args.status);
    save.final_note = args.final_note;
    save.update_git = !args.no_update_git;
    if let Some(privacy) = args.privacy {
        save.privacy = privacy;
    }
    let outcome = session.save(&save)?;
    if args.verbose {
        println!("{}", outcome.summary);
    }
    Ok(())
}

fn cmd_archive(session: &Session, args: ArchiveArgs) -> Result<()> {
    let opts = ArchiveOptions {
        status: args.status,
        reason: args.reason,
        superseded_by: args.superseded_by,
        privacy: args.privacy.unwrap_or(session.settings().index_privacy),
        ..ArchiveOptions::default()
    };
    let root = results_root(session, &args.location);
    let outcome = archive_exp(
        &session.project_paths().project_root,
        &root,
        &args.exp_id,
        &opts,
    )?;
    println!("{}", outcome.summary);
    Ok(())
}

fn cmd_sweep(
    session: &Session,
    location: &Location,
    dry_run: bool,
    privacy: Option<Privacy>,
) -> Result<()> {
    let report = sweep_stale(
        &session.project_paths().project_root,
        &results_root(session, location),
        dry_run,
        privacy.unwrap_or(session.settings().index_privacy),
    )?;
    let verb = if report.dry_run { "would mark stale" } else { "marked stale" };
    for exp_id in &report.stale {
        println!("{verb}: {exp_id}");
    }
    for failure in &report.failed {
        eprintln!("failed: {}: {}", failure.exp_id, failure.error);
    }
    if !report.failed.is_empty() {
        bail!("{} experiment(s) could not be swept", report.failed.len());
    }
    Ok(())
}

fn cmd_export(
    session: &Session,
    location: &Location,
    out: &Path,
    fields: Option<Vec<String>>,
    privacy: Option<Privacy>,
) -> Result<()> {
    let opts = ExportOptions {
        results_root: results_root(session, location),
        fields,
        privacy: privacy.unwrap_or(session.settings().index_privacy),
    };
    let path = export_csv(&session.project_paths().project_root, out, &opts)?;
    println!("{}", path.display());
    Ok(())
}
