//! plfread - Read TIA Portal project containers without TIA Portal
//!
//! This tool opens a project's `PEData.plf` container, reconstructs the
//! hardware and program-organization model, and prints a summary report.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use plfread_core::{Reader, ReaderOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Read TIA Portal project containers and print project summaries
#[derive(Parser, Debug)]
#[command(name = "plfread")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "summary")]
    format: OutputFormat,

    /// Abort on the first signature verification failure instead of
    /// flagging the affected entity as untrusted
    #[arg(long)]
    strict: bool,

    /// Print non-fatal diagnostics (incomplete sessions, skipped blocks)
    #[arg(long)]
    diagnostics: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single project: its directory, .apNN wrapper, or PEData.plf
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Path to a directory tree to search for projects
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for project reports
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Full summary report
    Summary,
    /// Just the project name (for scripting)
    Name,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if let Some(ref project) = cli.input.project {
        process_single_project(&cli, project)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --project or --directory must be specified")
    }
}

/// Process one project; any read error is fatal here.
fn process_single_project(cli: &Cli, project: &Path) -> Result<()> {
    if !project.exists() {
        bail!("Input path does not exist: {}", project.display());
    }
    read_and_print(cli, project)
        .with_context(|| format!("Failed to read project: {}", project.display()))
}

/// Search a directory tree for projects and process each one.
///
/// A single unreadable project is logged and skipped; only finding no
/// projects at all is an error.
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Searching for projects under: {}", directory.display());

    let projects = find_projects(directory);
    if projects.is_empty() {
        bail!("No projects found under: {}", directory.display());
    }

    let mut failed = 0;
    for project in &projects {
        debug!("Processing project: {}", project.display());
        if let Err(e) = read_and_print(cli, project) {
            warn!("Error reading {}: {:#}", project.display(), e);
            failed += 1;
        }
    }

    info!(
        "Processed {} project(s), {} failed",
        projects.len(),
        failed
    );
    Ok(())
}

/// Finds project directories: any directory holding `System/PEData.plf`.
fn find_projects(directory: &Path) -> Vec<PathBuf> {
    let mut projects = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }
        if !is_container_path(path) {
            trace!("Skipping non-container: {}", path.display());
            continue;
        }
        if let Some(project) = path.parent().and_then(Path::parent) {
            projects.push(project.to_path_buf());
        }
    }
    projects.sort();
    projects.dedup();
    projects
}

/// True for paths shaped like `<project>/System/PEData.plf`.
fn is_container_path(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == "PEData.plf")
        && path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|n| n == "System")
}

/// Read a project and render it per the requested format.
fn read_and_print(cli: &Cli, project: &Path) -> Result<()> {
    let options = ReaderOptions::new().strict(cli.strict);
    let reader = Reader::open_with(project, options)?;
    trace!("Reading container: {}", reader.container_path().display());

    let model = reader.read()?;

    match cli.format {
        OutputFormat::Name => println!("{}", model.name),
        OutputFormat::Summary => print!("{}", model.summary()),
    }

    for session in &model.diagnostics.incomplete_sessions {
        warn!(
            "Incomplete session at block {} ({} block(s), {})",
            session.start_index,
            session.block_count,
            if session.closed { "closed" } else { "unterminated" }
        );
    }
    if cli.diagnostics {
        for note in &model.diagnostics.notes {
            println!("  note: {note}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_container_path() {
        assert!(is_container_path(Path::new(
            "/work/Press_Line/System/PEData.plf"
        )));
        assert!(!is_container_path(Path::new("/work/Press_Line/PEData.plf")));
        assert!(!is_container_path(Path::new(
            "/work/Press_Line/System/other.plf"
        )));
    }

    #[test]
    fn test_find_projects() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a").join("System");
        let b = temp_dir.path().join("nested").join("b").join("System");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("PEData.plf"), b"x").unwrap();
        std::fs::write(b.join("PEData.plf"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("stray.plf"), b"x").unwrap();

        let projects = find_projects(temp_dir.path());
        assert_eq!(projects.len(), 2);
        assert!(projects[0].ends_with("a"));
        assert!(projects[1].ends_with("b"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
