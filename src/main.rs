use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use patchset::config::{self, Settings};
use patchset::reconcile;
use patchset::{
    CommandInstaller, DistInstaller, Installer, LogLogger, Manifest, PatchApplicator,
    PlannedAction, Reconciler, Reconciliation, Repository, SystemRunner,
};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "patchset")]
#[command(about = "Apply declared patch sets to installed packages", long_about = None)]
#[command(version)]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reinstall and patch packages whose patch set changed
    Apply {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Show what `apply` would do without touching any file
    Status {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// List declared patches and whether they apply
    List {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Project root (defaults to the current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Installed-packages manifest (overrides the settings file)
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Settings file (defaults to <project>/patchset.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Apply { project } => cmd_apply(&project),
        Commands::Status { project } => cmd_status(&project),
        Commands::List { project } => cmd_list(&project),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Warn,
        (false, 0) => log::LevelFilter::Info,
        (false, 1) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };

    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(level)
        .without_timestamps()
        .init()
    {
        eprintln!("{}", format!("Warning: logging unavailable: {e}").yellow());
    }
}

/// Everything a command needs about the project.
struct ProjectContext {
    root: PathBuf,
    settings: Settings,
    manifest: Manifest,
}

impl ProjectContext {
    fn load(args: &ProjectArgs) -> Result<Self> {
        let root = match &args.project {
            Some(path) => path.clone(),
            None => env::current_dir().context("cannot determine current directory")?,
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("project root {} does not exist", root.display()))?;

        let settings = config::discover(&root, args.config.as_deref())?;

        let manifest_path = args
            .manifest
            .clone()
            .unwrap_or_else(|| settings.project.manifest.clone());
        let manifest_path = if manifest_path.is_absolute() {
            manifest_path
        } else {
            root.join(manifest_path)
        };
        let manifest = Manifest::load(&manifest_path, &root)?;

        Ok(Self {
            root,
            settings,
            manifest,
        })
    }

    fn repository(&self) -> &Repository {
        self.manifest.repository()
    }

    fn print_header(&self) {
        println!("Project: {}", self.root.display());
        println!("Packages: {}", self.repository().len());
        println!();
    }
}

fn cmd_apply(args: &ProjectArgs) -> Result<()> {
    let ctx = ProjectContext::load(args)?;
    ctx.print_header();

    let logger = LogLogger;
    let runner = SystemRunner;
    let installer: Box<dyn Installer + '_> = match &ctx.settings.installer {
        Some(installer) => Box::new(CommandInstaller::new(
            &runner,
            installer.command.clone(),
            &ctx.root,
        )),
        None => Box::new(DistInstaller::new(ctx.manifest.dist_paths().clone(), &logger)),
    };
    let applicator = PatchApplicator::new(&runner, &logger, &ctx.root)
        .with_programs(&ctx.settings.tools.patch, &ctx.settings.tools.git);
    let reconciler = Reconciler::new(ctx.repository(), &logger, installer.as_ref(), &applicator);

    let reconciliation = reconciler.prepare()?;
    print_plan(&reconciliation);

    let report = match reconciler.execute(&reconciliation) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), "Reconciliation aborted".red().bold());
            return Err(e.into());
        }
    };

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} packages reinstalled",
        format!("{}", report.reinstalled.len()).yellow()
    );
    println!(
        "  {} packages patched",
        format!("{}", report.patched.len()).green()
    );
    println!("  {} patches applied", format!("{}", report.applied).green());

    Ok(())
}

fn cmd_status(args: &ProjectArgs) -> Result<()> {
    let ctx = ProjectContext::load(args)?;

    let reconciliation = reconcile::prepare(ctx.repository(), &LogLogger)?;

    println!("{}", "Patch Status Report".bold());
    ctx.print_header();

    if reconciliation.plan.actions().is_empty() {
        println!("{}", "No patches declared for installed packages".dimmed());
        return Ok(());
    }

    print_plan(&reconciliation);
    Ok(())
}

fn cmd_list(args: &ProjectArgs) -> Result<()> {
    let ctx = ProjectContext::load(args)?;

    let reconciliation = reconcile::prepare(ctx.repository(), &LogLogger)?;

    if reconciliation.patches.is_empty() {
        println!("{}", "No patches declared".dimmed());
        return Ok(());
    }

    for patch in &reconciliation.patches {
        let scheduled = reconciliation
            .target
            .get(patch.target_package())
            .map(|app| {
                app.applications().iter().any(|a| {
                    a.patch().source_package() == patch.source_package()
                        && a.patch().filename() == patch.filename()
                })
            })
            .unwrap_or(false);

        let marker = if scheduled { "✓".green() } else { "⊘".cyan() };
        println!(
            "{} {} -> {}: {} [{}] ({})",
            marker,
            patch.source_package(),
            patch.target_package(),
            patch.filename(),
            patch.version_constraint(),
            patch.method()
        );
        if let Some(description) = patch.description() {
            println!("    {}", description.dimmed());
        }
    }

    Ok(())
}

fn print_plan(reconciliation: &Reconciliation) {
    for (name, action) in reconciliation.plan.actions() {
        let count = reconciliation
            .target
            .get(name)
            .map(|app| app.applications().len())
            .unwrap_or(0);

        match action {
            PlannedAction::UpToDate => {
                println!("{} {}: up to date ({} patches)", "✓".green(), name, count)
            }
            PlannedAction::Patch => {
                println!("{} {}: {} patches pending", "⊙".yellow(), name, count)
            }
            PlannedAction::ReinstallAndPatch => println!(
                "{} {}: patch set changed, reinstall and apply {} patches",
                "↻".yellow(),
                name,
                count
            ),
            PlannedAction::Reinstall => println!(
                "{} {}: stale patches, reinstall to clear them",
                "✗".red(),
                name
            ),
        }
    }
}
