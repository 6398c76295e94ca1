//! msgport entry point.
//!
//! ## CLI Subcommands
//!
//! - `msgport` or `msgport serve` - Run the echo server (default)
//! - `msgport config show|defaults|validate` - Inspect configuration
//! - `msgport version` - Print the version

use std::process::ExitCode;

use msgport::cli::{self, config_cmd};
use msgport::config;
use msgport::ExitStatus;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => {
            let env = match config::load() {
                Ok(env) => env,
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    return ExitStatus::BadOptions.into();
                }
            };
            cli::run_serve(env).await.into()
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("msgport {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => config_cmd::run_show(cli::has_flag(&args, "--json")).into(),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => config_cmd::run_validate().into(),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitStatus::BadOptions.into()
                }
            }
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitStatus::BadOptions.into()
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "msgport - multi-connection TCP message server v{}

USAGE:
    msgport [COMMAND] [OPTIONS]

COMMANDS:
    serve        Run the echo server (default when no command given)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information

ENVIRONMENT:
    MSGPORT_CONFIG               Optional TOML config file
    MSGPORT_BIND_IP              Comma-separated bind addresses (default: 127.0.0.1)
    MSGPORT_PORT                 Listen port (default: 27017)
    MSGPORT_MAX_CONNECTIONS      Max concurrent connections (default: 819)
    MSGPORT_LOG                  Log filter (default: info)
    MSGPORT_LOG_FORMAT           json or pretty (default: json)

EXIT CODES:
    0    Clean shutdown
    1    Failure (bind or runtime error)
    2    Bad options / configuration error
    47   Clock skew detected
    100  Uncaught failure in a connection worker
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "serve" => {
            eprintln!(
                "msgport serve - Run the echo server

USAGE:
    msgport serve

DESCRIPTION:
    Listens on every MSGPORT_BIND_IP address and echoes each framed message
    back to its sender. Connections beyond MSGPORT_MAX_CONNECTIONS are closed
    on accept. Ctrl+C stops accepting, drains open connections for up to
    MSGPORT_SHUTDOWN_TIMEOUT_MS and exits 0.

FRAME FORMAT:
    [len: u32-le][id: u32-le][response_to: u32-le][payload]
"
            );
        }
        "config" => {
            eprintln!(
                "msgport config - Inspect configuration

USAGE:
    msgport config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show           Show effective configuration (file + environment)
    defaults       Show built-in defaults
    validate       Check configuration; exit 2 on errors

OPTIONS:
    --json         Output `show` as JSON

EXAMPLES:
    msgport config show --json
    MSGPORT_BIND_IP=0.0.0.0,::1 msgport config validate
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'msgport help' for general usage.",
                command
            );
        }
    }
}
