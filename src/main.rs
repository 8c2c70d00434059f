//! docbook-xtm - DocBook guide prep for XTM

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;

use docbook_xtm::logging::init_logging;
use docbook_xtm::repair::{NoRepair, default_repair};
use docbook_xtm::{
    Assembler, BookMetadata, Config, Error, GithubFetcher, ReqwestClient, Result, RunReport,
    SourceArchive,
};

#[derive(Parser)]
#[command(name = "docbook-xtm")]
#[command(
    version,
    about = "Prep DocBook guides for XTM and restore translated packages",
    long_about = None
)]
#[command(after_help = "EXAMPLES:
    docbook-xtm unsource RH124                 Flatten the latest RH124 release
    docbook-xtm unsource RH124 -r RHEL9.0      Flatten a tagged release
    docbook-xtm unsource RH124-local.zip       Flatten a local source archive
    docbook-xtm resource RH124-20230103.zip    Restore a translated package
    docbook-xtm info RH124-20230103.zip        Show guide metadata")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// GitHub organization owning the course repositories
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Directory the output archive is written to
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Directory for downloads, scratch files and events.log
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Keep downloaded source archives
    #[arg(long, global = true)]
    keep_archives: bool,

    /// Skip xmllint repair of translated files
    #[arg(long, global = true)]
    no_repair: bool,

    /// Print a JSON report instead of the output file name
    #[arg(long, global = true)]
    json: bool,

    /// Show more log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Flatten a source package so XTM parses it in reading order
    Unsource {
        /// Course identifier (e.g. RH124) or a local source archive
        #[arg(value_name = "COURSE")]
        course: String,

        /// Download the release whose tag or commitish contains this value
        #[arg(short, long, value_name = "TAG")]
        release_tag: Option<String>,
    },
    /// Restore a translated package to the source layout
    Resource {
        /// Package exported from XTM
        #[arg(value_name = "TARGET")]
        target: PathBuf,
    },
    /// Show the metadata of a package
    Info {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(&cli.work_dir, cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: could not open log file: {e}");
            None
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    for dir in [&cli.output_dir, &cli.work_dir] {
        if !dir.is_dir() {
            return Err(Error::Config(format!("{} is not a directory", dir.display())));
        }
    }

    match &cli.command {
        Command::Unsource { course, release_tag } => {
            let local = Path::new(course);
            let (source, fetched) = if local.is_file() {
                (local.to_path_buf(), false)
            } else {
                (fetch(cli, course, release_tag.as_deref())?, true)
            };

            let report = assembler(cli).unsource(&source)?;
            discard(cli, &source, fetched)?;
            print_report(cli, &report)
        }
        Command::Resource { target } => {
            let meta = BookMetadata::from_archive(&mut SourceArchive::open(target)?)?;
            let course = meta.course()?;
            let source = fetch(cli, course, Some(&meta.release_id()))?;

            let report = assembler(cli).resource(&source, target)?;
            discard(cli, &source, true)?;
            print_report(cli, &report)
        }
        Command::Info { archive } => show_info(cli, archive),
    }
}

fn fetch(cli: &Cli, course: &str, tag: Option<&str>) -> Result<PathBuf> {
    let mut config = Config::load();
    if let Some(owner) = &cli.owner {
        config = config.with_owner(owner);
    }
    if config.token.is_none() {
        debug!("no GitHub token configured, only public repositories are reachable");
    }
    GithubFetcher::new(ReqwestClient::new()?, config).fetch(course, tag, &cli.work_dir)
}

fn assembler(cli: &Cli) -> Assembler {
    let assembler = Assembler::new(&cli.work_dir, &cli.output_dir);
    if cli.no_repair {
        assembler.with_repair(Box::new(NoRepair))
    } else {
        assembler.with_repair(default_repair())
    }
}

/// Remove an archive this run downloaded.
fn discard(cli: &Cli, archive: &Path, fetched: bool) -> Result<()> {
    if fetched && !cli.keep_archives {
        debug!("rm {}", archive.display());
        fs::remove_file(archive)?;
    }
    Ok(())
}

fn print_report(cli: &Cli, report: &RunReport) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for original in &report.missing {
        eprintln!("missing: {original}");
    }
    for actual in &report.unmatched {
        eprintln!("unmatched: {actual}");
    }
    let name = report
        .archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| report.archive.display().to_string());
    println!("{name}");
    Ok(())
}

fn show_info(cli: &Cli, path: &Path) -> Result<()> {
    let meta = BookMetadata::from_archive(&mut SourceArchive::open(path)?)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    println!("File: {}", path.display());
    let fields = [
        ("Title", meta.title.as_deref()),
        ("Subtitle", meta.subtitle.as_deref()),
        ("Course", meta.part_number.as_deref()),
        ("Product", meta.product_name.as_deref()),
        ("Product number", meta.product_number.as_deref()),
        ("Publication date", meta.pub_date.as_deref()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{label}: {value}");
        }
    }
    if let Some(edition) = meta.edition {
        println!("Edition: {edition}");
    }
    println!("Serial: {}", meta.serial_number);
    println!("Locale: {}", meta.locale);
    println!("Release: {}", meta.release_id());

    Ok(())
}
