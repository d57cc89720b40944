use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lab_core::model::{ChapterId, CourseConfig, SectionId, UserId, export_file_name};
use serde_json::Value;
use services::{AppServices, Clock, ProgressService};

#[derive(Parser)]
#[command(name = "problab")]
#[command(about = "Inspect and edit Probability Lab course progress")]
struct Cli {
    /// `sqlite://` URL of the database holding the progress documents
    #[arg(long, env = "PROBLAB_DB_URL", default_value = "sqlite://problab.sqlite3")]
    db: String,

    /// Learner whose progress is addressed
    #[arg(long, env = "PROBLAB_USER", default_value = UserId::ANONYMOUS)]
    user: UserId,

    /// TOML course description (chapter count and section totals)
    #[arg(long, env = "PROBLAB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every chapter record, or one chapter's record
    Show {
        #[arg(long)]
        chapter: Option<ChapterId>,
    },
    /// Mark a chapter as visited
    Start { chapter: ChapterId },
    /// Mark one section of a chapter as done
    CompleteSection {
        chapter: ChapterId,
        section: SectionId,
    },
    /// Mark a chapter as finished
    Complete { chapter: ChapterId },
    /// Add study time to a chapter
    Time { chapter: ChapterId, seconds: u64 },
    /// Store a quiz score for a chapter
    Score {
        chapter: ChapterId,
        #[arg(allow_negative_numbers = true)]
        score: i64,
    },
    /// Forget one chapter, or everything when no chapter is given
    Reset {
        #[arg(long)]
        chapter: Option<ChapterId>,
    },
    /// Course-wide summary
    Overall,
    /// Write an export document (`-` for stdout)
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace all progress with an export document
    Import { file: PathBuf },
    /// Report whether local changes await a remote sync
    Pending,
}

#[derive(Debug)]
enum CliError {
    Config { path: PathBuf, reason: String },
    InvalidDbUrl { raw: String },
    ImportRejected { path: PathBuf },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config { path, reason } => {
                write!(f, "invalid course config {}: {reason}", path.display())
            }
            CliError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            CliError::ImportRejected { path } => {
                write!(f, "{} is not a progress export", path.display())
            }
        }
    }
}

impl std::error::Error for CliError {}

fn load_config(path: Option<&Path>) -> Result<CourseConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(CourseConfig::default());
    };
    let raw = std::fs::read_to_string(path).map_err(|err| CliError::Config {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let config = CourseConfig::from_toml_str(&raw).map_err(|err| CliError::Config {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(config)
}

/// File path behind a `sqlite://` URL, `None` for in-memory databases.
fn database_path(db_url: &str) -> Result<Option<&Path>, CliError> {
    if db_url.starts_with("sqlite::memory:") || db_url.contains("mode=memory") {
        return Ok(None);
    }
    let rest = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| CliError::InvalidDbUrl {
            raw: db_url.to_owned(),
        })?;
    let path = rest.split_once('?').map_or(rest, |(path, _)| path);
    if path.is_empty() {
        return Err(CliError::InvalidDbUrl {
            raw: db_url.to_owned(),
        });
    }
    Ok(Some(Path::new(path)))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(
    progress: &ProgressService,
    user: &UserId,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Show { chapter: Some(chapter) } => {
            print_json(&progress.get_chapter(user, &chapter).await)
        }
        Commands::Show { chapter: None } => print_json(&progress.get_all(user).await),
        Commands::Start { chapter } => {
            let store = progress.start_chapter(user, &chapter).await;
            print_json(&store.chapter_or_default(&chapter))
        }
        Commands::CompleteSection { chapter, section } => {
            let store = progress.complete_section(user, &chapter, &section).await;
            print_json(&store.chapter_or_default(&chapter))
        }
        Commands::Complete { chapter } => {
            let store = progress.complete_chapter(user, &chapter).await;
            print_json(&store.chapter_or_default(&chapter))
        }
        Commands::Time { chapter, seconds } => {
            let store = progress.record_time_spent(user, &chapter, seconds).await;
            print_json(&store.chapter_or_default(&chapter))
        }
        Commands::Score { chapter, score } => {
            let store = progress.record_score(user, &chapter, score).await;
            print_json(&store.chapter_or_default(&chapter))
        }
        Commands::Reset { chapter: Some(chapter) } => {
            print_json(&progress.reset_chapter(user, &chapter).await)
        }
        Commands::Reset { chapter: None } => {
            progress.reset_all(user).await;
            Ok(())
        }
        Commands::Overall => print_json(&progress.overall_progress(user).await),
        Commands::Export { out } => {
            let export = progress.export_all(user).await;
            let body = serde_json::to_string_pretty(&export)?;
            let out = out.unwrap_or_else(|| {
                PathBuf::from(export_file_name(export.meta.export_date.date_naive()))
            });
            if out.as_os_str() == "-" {
                println!("{body}");
            } else {
                std::fs::write(&out, body)?;
                eprintln!("wrote {}", out.display());
            }
            Ok(())
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let payload: Value = serde_json::from_str(&raw)?;
            if !progress.import_all(user, &payload).await {
                return Err(CliError::ImportRejected { path: file }.into());
            }
            Ok(())
        }
        Commands::Pending => print_json(&progress.has_pending_sync().await),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // SQLite creates the file itself but not missing directories.
    let dir = database_path(&cli.db)?
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
    }
    let services = AppServices::new_sqlite(&cli.db, Clock::system(), config).await?;
    log::debug!("using {} for {}", cli.db, cli.user);

    dispatch(services.progress().as_ref(), &cli.user, cli.command).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
