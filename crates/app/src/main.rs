mod commands;

use std::fmt;
use std::path::Path;

use services::{AppServices, Clock, ClientConfig};
use study_core::model::{SlotId, SubjectId};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

const IN_MEMORY_DB: &str = "sqlite::memory:";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { name: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidNumber { name, raw } => write!(f, "invalid <{name}> value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  study [--db <sqlite_url>] [--base-url <url>] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  plan                                   show the weekly plan");
    eprintln!("  today                                  today's slots, synced with today's sessions");
    eprintln!("  toggle <slot-id>                       flip a slot's completion for today");
    eprintln!("  subjects                               list the subject catalog");
    eprintln!("  history                                list logged sessions");
    eprintln!("  log <subject-id> <HH:MM:SS> <questions> <incorrect> [topic...]");
    eprintln!("  study <subject-id> [topic...]          run the timer interactively");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_API_BASE_URL, STUDY_FIREBASE_API_KEY, STUDY_DB_URL,");
    eprintln!("  STUDY_HTTP_TIMEOUT_SECS, STUDY_EMAIL, STUDY_PASSWORD, STUDY_LOG");
}

struct Args {
    db_url: Option<String>,
    base_url: Option<String>,
    command: Command,
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: Option<&String>) -> Result<T, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArgument { name })?;
    raw.trim().parse().map_err(|_| ArgsError::InvalidNumber {
        name,
        raw: raw.clone(),
    })
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut args = args.into_iter();
        let mut db_url = None;
        let mut base_url = None;
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                "--base-url" => base_url = Some(require_value(&mut args, "--base-url")?),
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let Some((name, rest)) = positional.split_first() else {
            return Ok(None);
        };
        let topic = |from: usize| rest.get(from..).map(|words| words.join(" ")).unwrap_or_default();
        let command = match name.as_str() {
            "plan" => Command::Plan,
            "today" => Command::Today,
            "subjects" => Command::Subjects,
            "history" => Command::History,
            "toggle" => Command::Toggle(SlotId::new(parse_number("slot-id", rest.first())?)),
            "log" => Command::Log {
                subject: SubjectId::new(parse_number("subject-id", rest.first())?),
                time: rest
                    .get(1)
                    .cloned()
                    .ok_or(ArgsError::MissingArgument { name: "HH:MM:SS" })?,
                questions: parse_number("questions", rest.get(2))?,
                incorrect: parse_number("incorrect", rest.get(3))?,
                topic: topic(4),
            },
            "study" => Command::Study {
                subject: SubjectId::new(parse_number("subject-id", rest.first())?),
                topic: topic(1),
            },
            other => return Err(ArgsError::UnknownCommand(other.to_string())),
        };

        Ok(Some(Self {
            db_url,
            base_url,
            command,
        }))
    }
}

/// Turn a bare path or `sqlite:` path into an absolute `sqlite://` URL.
fn normalize_sqlite_url(raw: String) -> String {
    if raw == IN_MEMORY_DB || raw.starts_with("sqlite://") {
        return raw;
    }
    let raw = raw.trim();
    let path = Path::new(raw.strip_prefix("sqlite:").unwrap_or(raw));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    format!("sqlite://{}", absolute.display())
}

/// The cache file is created on connect; its directory is not.
fn ensure_cache_dir(db_url: &str) -> Result<(), ArgsError> {
    if db_url == IN_MEMORY_DB {
        return Ok(());
    }
    let invalid = || ArgsError::InvalidDbUrl {
        raw: db_url.to_string(),
    };
    let file = db_url
        .strip_prefix("sqlite://")
        .and_then(|rest| rest.split('?').next())
        .filter(|file| !file.is_empty())
        .ok_or_else(invalid)?;
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|_| invalid())
        }
        _ => Ok(()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STUDY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init only happens in tests; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = Args::parse(std::env::args().skip(1)).inspect_err(|err| {
        eprintln!("{err}");
        print_usage();
    })?
    else {
        print_usage();
        return Ok(());
    };

    init_tracing();

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &args.base_url {
        config = config.with_base_url(base_url)?;
    }
    let db_url = normalize_sqlite_url(args.db_url.unwrap_or_else(|| config.db_url.clone()));
    config = config.with_db_url(db_url);

    ensure_cache_dir(&config.db_url)?;
    let services = AppServices::connect(&config, Clock::default_clock()).await?;
    commands::sign_in(&services).await?;
    commands::execute(&services, args.command).await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
