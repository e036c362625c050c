//! dash-api -- command-line access to the dashboard API.
//!
//! Signs in, keeps the session on disk between runs, and issues
//! authenticated requests through the same refresh/replay machinery the
//! library exposes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use dash_api::{ApiClient, CallbackNavigator, ClientConfig, LoginRedirect};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

enum Command {
    Login { username: String, password: String },
    Logout,
    Me,
    Status,
    Get { path: String },
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("dash-api {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other if other.starts_with('-') && other.len() > 1 => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
            _ => positional.push(arg),
        }
    }

    let command = match parse_command(positional) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!("Run with --help for usage information.");
            std::process::exit(1);
        }
    };

    CliArgs {
        config_path,
        command,
    }
}

fn parse_command(positional: Vec<String>) -> Result<Command, String> {
    let mut words = positional.into_iter();
    let name = words.next().ok_or("missing command")?;

    let command = match name.as_str() {
        "login" => {
            let username = words.next().ok_or("login requires a username")?;
            let password = match words.next() {
                Some(password) => password,
                None => std::env::var("DASH_PASSWORD")
                    .map_err(|_| "login requires a password (argument or DASH_PASSWORD)")?,
            };
            Command::Login { username, password }
        }
        "logout" => Command::Logout,
        "me" => Command::Me,
        "status" => Command::Status,
        "get" => Command::Get {
            path: words.next().ok_or("get requires a path")?,
        },
        other => return Err(format!("unknown command '{other}'")),
    };

    match words.next() {
        Some(extra) => Err(format!("unexpected argument '{extra}'")),
        None => Ok(command),
    }
}

fn print_usage() {
    println!(
        "\
dash-api {version} -- Dashboard API client

USAGE:
    dash-api [OPTIONS] <COMMAND>

COMMANDS:
    login <USERNAME> [PASSWORD]    Sign in and store the session
    logout                         Sign out and clear the stored session
    me                             Fetch the current user (/auth/me)
    status                         Show the stored session
    get <PATH>                     GET an API path and print the JSON body

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: dash-api.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    DASH_CONFIG            Alternative to --config flag
    DASH_PASSWORD          Password for `login` when not given as argument
    DASH_API_BASE_URL      API base URL
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    // --config wins over DASH_CONFIG
    let config_path = cli
        .config_path
        .or_else(|| std::env::var("DASH_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("dash-api.toml"));

    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(&config);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting dash-api"
    );

    let navigator = Arc::new(CallbackNavigator::new(|reason| {
        if reason == LoginRedirect::SessionExpired {
            eprintln!("Session expired. Run `dash-api login` to sign in again.");
        }
    }));
    let client = ApiClient::builder()
        .config(config)
        .navigator(navigator)
        .build()?;

    match cli.command {
        Command::Login { username, password } => {
            let user = client.login(&username, &password).await?;
            match user {
                Some(user) => println!("Signed in as {} ({})", user.username, user.role),
                None => println!("Signed in as {username}"),
            }
        }
        Command::Logout => {
            client.logout().await;
            println!("Signed out");
        }
        Command::Me => match client.rehydrate().await? {
            Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
            None => anyhow::bail!("not signed in"),
        },
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&client.status())?);
        }
        Command::Get { path } => {
            let body: serde_json::Value = client
                .get(&path)
                .await
                .with_context(|| format!("GET {path}"))?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber. Logs go to stderr so stdout stays parseable.
fn init_tracing(config: &ClientConfig) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("dash_api={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
