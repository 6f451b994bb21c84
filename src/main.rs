use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use screenpack_updater::picker::{ArgumentPath, PathProvider, PromptPath};
use screenpack_updater::rules::{ChangeKind, BUILTIN_RULES};
use screenpack_updater::{load_from_path, patch_file, PatchOptions, PatchOutcome, PatchReport, Ruleset};
use similar::{ChangeTag, TextDiff};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "screenpack-updater")]
#[command(about = "Update an IKEMEN GO screenpack system.def to the 1.0 format", long_about = None)]
#[command(version)]
struct Cli {
    /// File to patch (prompted for when omitted on a terminal)
    path: Option<PathBuf>,

    /// Print the patched text to stdout, do not touch any file
    #[arg(long)]
    stdout: bool,

    /// Dry run - show what would be changed without modifying files
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,

    /// Load migration rules from a TOML file instead of the built-in set
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Print the built-in rules and exit
    #[arg(long)]
    print_rules: bool,

    /// More diagnostics (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "✗".red(), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        1 => "screenpack_updater=debug,warn".into(),
        _ => "screenpack_updater=trace,debug".into(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    if cli.print_rules {
        print!("{}", BUILTIN_RULES);
        return Ok(ExitCode::SUCCESS);
    }

    let rules = match &cli.rules {
        Some(path) => load_from_path(path)
            .with_context(|| format!("Could not load rules from {}", path.display()))?,
        None => Ruleset::builtin().context("Built-in rules are invalid")?,
    };

    let provider: Box<dyn PathProvider> = match cli.path.clone() {
        Some(path) => Box::new(ArgumentPath(path)),
        None if std::io::stdin().is_terminal() => Box::new(PromptPath::default()),
        None => {
            eprintln!("{}", Cli::command().render_usage());
            return Ok(ExitCode::FAILURE);
        }
    };

    let Some(path) = provider.select_file()? else {
        println!("{}", "No file selected; nothing to do.".dimmed());
        return Ok(ExitCode::SUCCESS);
    };

    let options = PatchOptions {
        preview: cli.stdout || cli.dry_run,
    };
    let report = patch_file(&path, &rules, options)?;

    if cli.stdout {
        for warning in &report.warnings {
            eprintln!("{} {}", "⚠".yellow(), warning);
        }
        print!("{}", report.patched);
        return Ok(ExitCode::SUCCESS);
    }

    print_report(&report, &rules, cli.diff);
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &PatchReport, rules: &Ruleset, show_diff: bool) {
    let file = report.path.display();
    for warning in &report.warnings {
        eprintln!("{} {}", "⚠".yellow(), warning);
    }

    match &report.outcome {
        PatchOutcome::AlreadyPatched { found } => {
            println!(
                "{} {}: already at ikemenversion {} (target {}), no changes made",
                "⊙".yellow(),
                file,
                found,
                rules.target_version
            );
            return;
        }
        PatchOutcome::Previewed { reason } => {
            println!("{}", "[DRY RUN - nothing was written]".cyan());
            println!("{} {}: would be patched ({})", "✓".green(), file, reason);
        }
        PatchOutcome::Patched { reason, backup } => {
            println!("{} {}: patched ({})", "✓".green(), file, reason);
            println!("  Backup: {}", backup.display());
        }
    }

    let mut whitespace_only = 0;
    for change in &report.changes {
        if matches!(change.kind, ChangeKind::Normalized { .. }) {
            whitespace_only += 1;
            continue;
        }
        println!("  - {}", change.to_string().dimmed());
    }
    if whitespace_only > 0 {
        println!(
            "  - {}",
            format!("{} line(s) reformatted as `key = value`", whitespace_only).dimmed()
        );
    }

    if show_diff {
        display_diff(&report.path, &report.original, &report.patched);
    }
}

/// Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, patched: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, patched);
    for hunk in diff.unified_diff().context_radius(2).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}
