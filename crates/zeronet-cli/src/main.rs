//! # ZeroNet CLI Entry Point
//!
//! Main binary for hosting ZeroNet station processes and talking to the
//! center.
//!
//! ## Usage
//!
//! ```bash
//! # Join the center and host stations, reading console commands
//! zeronet run -c host.json
//!
//! # Call a station's API (outputs the raw result)
//! zeronet call UserCenter v1/user/get -a '{"id": 1}'
//!
//! # Send a management command to the center
//! zeronet command host Orders
//! ```

use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tokio::io::{AsyncBufReadExt, BufReader};
use zeronet_cli::console::ConsoleCommand;
use zeronet_cli::{config_path, CONFIG_ENV};
use zeronet_client::ManageClient;
use zeronet_common::auth::ServiceKey;
use zeronet_station::{WorkModel, ZeroAppConfig, ZeroApplication};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// ZeroNet - station host for the Zero Center
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Run**: Join the center and host stations until shut down
/// - **Call**: Make a single RPC call (unix-friendly output)
/// - **Command**: Send one management command to the center
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Run(RunArgs),
    Call(CallArgs),
    Command(CommandArgs),
}

/// Arguments for hosting a station process.
///
/// The process joins the center named in the host config, starts the event
/// monitor and reads console commands from stdin: `start` rejoins, `exit`
/// or `quit` shuts down, anything else is sent to the center.
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
/// join the center and host stations
struct RunArgs {
    /// path to the host config file
    ///
    /// Falls back to the ZERONET_HOST_CONFIG env var, then host.json.
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// work model override: service, client or bridge
    #[argh(option, short = 'm', long = "work-model")]
    work_model: Option<String>,

    /// do not read console commands; run until interrupted
    #[argh(switch, long = "no-console")]
    no_console: bool,
}

/// Arguments for making a single RPC call.
///
/// Joins the center in client mode, calls the station and prints the result
/// text to stdout. Failures are reported on stderr with a non-zero exit code.
///
/// # Examples
///
/// ```bash
/// zeronet call UserCenter v1/user/get -a '{"id": 1}' | jq '.name'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call an API on a station
struct CallArgs {
    /// station to call
    #[argh(positional)]
    station: String,

    /// API path on the station
    #[argh(positional)]
    api: String,

    /// JSON argument text; defaults to `{}`
    #[argh(option, short = 'a', long = "args", default = "\"{}\".into()")]
    args: String,

    /// path to the host config file
    #[argh(option, short = 'c')]
    config: Option<String>,
}

/// Arguments for a management command.
#[derive(FromArgs)]
#[argh(subcommand, name = "command")]
/// send a management command to the center
struct CommandArgs {
    /// command name, e.g. `host`, `pause`, `resume`
    #[argh(positional)]
    name: String,

    /// command arguments
    #[argh(positional)]
    args: Vec<String>,

    /// path to the host config file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// reply timeout in milliseconds
    #[argh(option, short = 't', default = "5000")]
    timeout_ms: u64,
}

fn load_config(flag: Option<String>) -> Result<ZeroAppConfig> {
    let path = config_path(flag, std::env::var(CONFIG_ENV).ok());
    tracing::debug!(path = %path.display(), "loading host config");
    Ok(ZeroAppConfig::load(&path)?)
}

fn parse_work_model(value: &str) -> Result<WorkModel> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .map_err(|_| anyhow::anyhow!("Invalid work model '{}': expected service, client or bridge", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call: keep stdout clean for piping
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Run(args) => {
            run_host(args).await?;
            // stdin is read on a blocking thread the runtime would wait for
            std::process::exit(0);
        }
        Commands::Call(args) => run_call(args).await,
        Commands::Command(args) => run_command(args).await,
    }
}

/// Executes the `run` subcommand.
async fn run_host(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config)?;
    if let Some(work_model) = &args.work_model {
        config.work_model = parse_work_model(work_model)?;
    }
    tracing::info!(
        station = %config.station_name,
        center = %config.manage_address(),
        work_model = ?config.work_model,
        "starting zeronet host"
    );

    let app = ZeroApplication::new(config);
    let signal_app = app.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            signal_app.shutdown().await;
        }
    });

    if !app.start().await {
        tracing::warn!("not joined to the zero center yet");
    }

    if args.no_console {
        app.wait_for_shutdown().await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = app.wait_for_shutdown() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            app.shutdown().await;
            break;
        };

        match ConsoleCommand::parse(&line) {
            None => {}
            Some(ConsoleCommand::Start) => {
                if !app.start().await {
                    println!("start skipped, state is {:?}", app.state().application());
                }
            }
            Some(ConsoleCommand::Exit) => {
                app.shutdown().await;
                break;
            }
            Some(ConsoleCommand::Center { command, args }) => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                match app.center().call_command(&command, &args).await {
                    Ok(result) => println!("{}: {}", result.state, result.text.unwrap_or_default()),
                    Err(e) => eprintln!("{} failed: {}", command, e),
                }
            }
        }
    }
    Ok(())
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command so the result can be piped.
///
/// # Errors
///
/// Returns an error if the args are not valid JSON, the center can't be
/// joined, or the call does not succeed.
async fn run_call(args: CallArgs) -> Result<()> {
    serde_json::from_str::<serde_json::Value>(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let mut config = load_config(args.config)?;
    config.work_model = WorkModel::Client;
    let app = ZeroApplication::new(config);
    if !app.start().await {
        app.shutdown().await;
        anyhow::bail!("zero center can't be reached");
    }

    let outcome = app.api_client().call(&args.station, &args.api, &args.args).await;
    app.shutdown().await;

    println!("{}", outcome.result);
    if !outcome.api_result.success {
        anyhow::bail!("call failed: {}", outcome.state);
    }
    Ok(())
}

/// Executes the `command` subcommand.
async fn run_command(args: CommandArgs) -> Result<()> {
    let config = load_config(args.config)?;
    let client = ManageClient::new(config.manage_address())
        .with_service_key(ServiceKey::new(config.service_key.clone()))
        .with_timeout(Duration::from_millis(args.timeout_ms));

    let words: Vec<&str> = args.args.iter().map(String::as_str).collect();
    let result = client.call_command(&args.name, &words).await?;
    println!("{}", result.text.clone().unwrap_or_default());
    if !result.is_ok() {
        anyhow::bail!("{} returned {}", args.name, result.state);
    }
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let args: Cli = Cli::from_args(&["zeronet"], &["run", "-c", "node.json"]).unwrap();
        match args.command {
            Commands::Run(RunArgs { config, work_model, no_console }) => {
                assert_eq!(config, Some("node.json".to_string()));
                assert!(work_model.is_none());
                assert!(!no_console);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_defaults() {
        let args: Cli = Cli::from_args(&["zeronet"], &["run", "--no-console"]).unwrap();
        match args.command {
            Commands::Run(RunArgs { config, no_console, .. }) => {
                assert!(config.is_none());
                assert!(no_console);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_call() {
        let args: Cli = Cli::from_args(&["zeronet"], &["call", "UserCenter", "v1/user/get"]).unwrap();
        match args.command {
            Commands::Call(CallArgs { station, api, args, config }) => {
                assert_eq!(station, "UserCenter");
                assert_eq!(api, "v1/user/get");
                assert_eq!(args, "{}"); // default
                assert!(config.is_none());
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_call_with_args() {
        let args: Cli = Cli::from_args(&["zeronet"], &[
            "call",
            "UserCenter",
            "v1/user/get",
            "-a", "{\"id\":1}",
        ]).unwrap();
        match args.command {
            Commands::Call(CallArgs { args, .. }) => {
                assert_eq!(args, "{\"id\":1}");
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_command() {
        let args: Cli = Cli::from_args(&["zeronet"], &["command", "pause", "Orders", "now"]).unwrap();
        match args.command {
            Commands::Command(CommandArgs { name, args, timeout_ms, .. }) => {
                assert_eq!(name, "pause");
                assert_eq!(args, vec!["Orders".to_string(), "now".to_string()]);
                assert_eq!(timeout_ms, 5000); // default
            }
            _ => panic!("Expected Command command"),
        }
    }

    #[test]
    fn test_cli_parse_missing_subcommand() {
        assert!(Cli::from_args(&["zeronet"], &[]).is_err());
    }

    #[test]
    fn test_parse_work_model() {
        assert_eq!(parse_work_model("Bridge").unwrap(), WorkModel::Bridge);
        assert_eq!(parse_work_model("client").unwrap(), WorkModel::Client);
        assert!(parse_work_model("server").is_err());
    }
}
