use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tapedeck::config::{AppConfig, CliConfig, FileConfig, DEFAULT_HTTP_TIMEOUT_SEC};
use tapedeck::resolver::{Resolved, DEFAULT_MAX_DEPTH};
use tapedeck::tape::TapeStatus;
use tapedeck::user::NewUser;
use tapedeck::{
    CaptureRequest, ContentResolver, Database, Recorder, ReqwestTransport, TapeStore, UserStore,
};

const EXIT_CONFIG: u8 = 4;
const EXIT_RUNTIME: u8 = 8;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(name = "tapedeck", about = "Manage the tapedeck database and record shows")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[clap(long, value_parser = parse_path)]
    pub db_file: Option<PathBuf>,

    /// Directory downloaded audio is written to. Defaults to the database directory.
    #[clap(long, value_parser = parse_path)]
    pub output_dir: Option<PathBuf>,

    /// How many playlists deep a playlist may nest other playlists.
    #[clap(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_playlist_depth: usize,

    /// Timeout in seconds for each HTTP request.
    #[clap(long, default_value_t = DEFAULT_HTTP_TIMEOUT_SEC)]
    pub http_timeout_sec: u64,

    /// User-Agent header sent with every request.
    #[clap(long)]
    pub user_agent: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database file if needed and apply pending migrations.
    Upgrade,
    UserAdd {
        #[clap(long)]
        email: String,
    },
    UserDelete {
        #[clap(long)]
        email: String,
    },
    /// Resolve a URL into the output directory without recording a tape.
    Fetch {
        #[clap(long)]
        url: String,
    },
    /// Record a show as a new tape of the given user.
    Capture {
        #[clap(long)]
        email: String,
        /// Station call letters, registered on first use.
        #[clap(long)]
        station: String,
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long)]
        air_date: Option<String>,
        #[clap(long)]
        url: String,
    },
    /// List the tapes of a user.
    Tapes {
        #[clap(long)]
        email: String,
    },
}

enum Failure {
    Config(anyhow::Error),
    Runtime(anyhow::Error),
}

impl Failure {
    fn exit_code(&self) -> ExitCode {
        match self {
            Failure::Config(_) => ExitCode::from(EXIT_CONFIG),
            Failure::Runtime(_) => ExitCode::from(EXIT_RUNTIME),
        }
    }
}

fn runtime<E: Into<anyhow::Error>>(err: E) -> Failure {
    Failure::Runtime(err.into())
}

fn main() -> ExitCode {
    let cli_args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
    {
        eprintln!("Could not install logger: {}", err);
    }

    match run(cli_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            match &failure {
                Failure::Config(err) => error!("Configuration error: {:#}", err),
                Failure::Runtime(err) => error!("{:#}", err),
            }
            failure.exit_code()
        }
    }
}

fn run(cli_args: CliArgs) -> Result<(), Failure> {
    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path).map_err(Failure::Config)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_file: cli_args.db_file.clone(),
        output_dir: cli_args.output_dir.clone(),
        max_playlist_depth: cli_args.max_playlist_depth,
        http_timeout_sec: cli_args.http_timeout_sec,
        user_agent: cli_args.user_agent.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config).map_err(Failure::Config)?;

    match cli_args.command {
        Command::Upgrade => {
            let mut db = Database::new(&config.db_file);
            db.open(true);
            db.migrate().map_err(runtime)?;
            db.close(false);
            info!("Database {:?} is up to date", config.db_file);
            Ok(())
        }
        Command::UserAdd { email } => with_database(&config, |db| {
            let id = db
                .insert_user(&NewUser::new(&email))
                .map_err(runtime)?;
            info!("Added user {} with id {}", email, id);
            Ok(())
        }),
        Command::UserDelete { email } => Err(Failure::Config(anyhow::anyhow!(
            "user-delete is not implemented (requested for {})",
            email
        ))),
        Command::Fetch { url } => {
            let resolver = build_resolver(&config).map_err(runtime)?;
            let resolved = resolver.resolve(&url).map_err(runtime)?;
            report(&resolved);
            match resolved.failures().first() {
                Some(first) => Err(Failure::Runtime(anyhow::anyhow!(
                    "{} of the entries under {} failed, first: {}",
                    resolved.failures().len(),
                    url,
                    first
                ))),
                None => Ok(()),
            }
        }
        Command::Capture {
            email,
            station,
            title,
            description,
            air_date,
            url,
        } => with_database(&config, |db| {
            let user_id = find_user(db, &email)?;
            let resolver = build_resolver(&config).map_err(runtime)?;
            let tape = Recorder::new(db, &resolver)
                .record(&CaptureRequest {
                    user_id,
                    station,
                    title,
                    description,
                    air_date,
                    url,
                })
                .map_err(runtime)?;
            println!("{}\t{}\t{}", tape.id, tape.status, tape.title);
            if tape.status != TapeStatus::Done {
                return Err(Failure::Runtime(anyhow::anyhow!(
                    "Capture of {} failed: {}",
                    tape,
                    tape.status_msg.as_deref().unwrap_or("unknown error")
                )));
            }
            Ok(())
        }),
        Command::Tapes { email } => with_database(&config, |db| {
            let user_id = find_user(db, &email)?;
            for tape in db.get_tapes_for_user(user_id).map_err(runtime)? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    tape.id,
                    tape.station,
                    tape.air_date.as_deref().unwrap_or("-"),
                    tape.status,
                    tape.title
                );
            }
            Ok(())
        }),
    }
}

/// Opens an existing database, brings it up to date, runs `f` and closes it.
fn with_database<F>(config: &AppConfig, f: F) -> Result<(), Failure>
where
    F: FnOnce(&Database) -> Result<(), Failure>,
{
    if !config.db_file.exists() {
        return Err(Failure::Config(anyhow::anyhow!(
            "Database file {:?} not found, run upgrade first",
            config.db_file
        )));
    }
    let mut db = Database::new(&config.db_file);
    db.open(false);
    let result = db.migrate().map_err(runtime).and_then(|()| f(&db));
    db.close(false);
    result
}

fn find_user(db: &Database, email: &str) -> Result<i64, Failure> {
    match db.get_user_by_email(email).map_err(runtime)? {
        Some(user) => Ok(user.id),
        None => Err(Failure::Config(anyhow::anyhow!("Unknown user {}", email))),
    }
}

fn build_resolver(config: &AppConfig) -> Result<ContentResolver<ReqwestTransport>> {
    let transport = ReqwestTransport::new(config.http_timeout_sec, &config.user_agent)
        .context("Could not set up HTTP transport")?;
    Ok(ContentResolver::new(transport, &config.output_dir).with_max_depth(config.max_playlist_depth))
}

fn report(resolved: &Resolved) {
    for artifact in resolved.artifacts() {
        println!(
            "{}\t{}\t{}",
            artifact.path.display(),
            artifact.bytes_written,
            artifact.url
        );
    }
}
