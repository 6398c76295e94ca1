// Copyright 2024-2026 msgport Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration from `MSGPORT_*` environment variables
//! and the optional config file without starting a server.

use tracing_subscriber::EnvFilter;

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::exit::ExitStatus;
use crate::net::ServerConfig;
use crate::telemetry::LogConfig;

/// Print effective config to stdout, as `KEY=value` lines or JSON.
pub fn run_show(json: bool) -> ExitStatus {
    match config::load() {
        Ok(env) => {
            let cfg = env.effective_config();
            if json {
                match serde_json::to_string_pretty(&cfg) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Failed to serialize config: {}", e);
                        return ExitStatus::Failure;
                    }
                }
            } else {
                print_config(&cfg);
            }
            ExitStatus::Clean
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitStatus::BadOptions
        }
    }
}

/// Print default config values (no file, no env overrides) to stdout.
pub fn run_defaults() {
    let defaults = EnvConfig {
        config_file: None,
        server: ServerConfig::default(),
        log: LogConfig::default(),
    };
    print_config(&defaults.effective_config());
}

/// Validate configuration for misconfigurations the server would refuse.
///
/// Returns `Clean` if valid, `BadOptions` otherwise.
pub fn run_validate() -> ExitStatus {
    let env = match config::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitStatus::BadOptions;
        }
    };

    let problems = validate(&env);
    for p in &problems {
        eprintln!("ERROR: {}", p);
    }

    if problems.is_empty() {
        println!("Configuration is valid.");
        ExitStatus::Clean
    } else {
        ExitStatus::BadOptions
    }
}

/// Every problem found in `env`, one message each.
pub fn validate(env: &EnvConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = env.server.socket_addrs() {
        problems.push(format!("MSGPORT_BIND_IP: {}", e));
    }
    if let Err(e) = EnvFilter::try_new(&env.log.level) {
        problems.push(format!("MSGPORT_LOG ({}): {}", env.log.level, e));
    }
    if env.server.shutdown_timeout.is_zero() {
        problems.push("MSGPORT_SHUTDOWN_TIMEOUT_MS is 0; connections are never drained".into());
    }

    problems
}

fn print_config(cfg: &EffectiveConfig) {
    println!("MSGPORT_BIND_IP={}", cfg.bind_ip);
    println!("MSGPORT_PORT={}", cfg.port);
    println!("MSGPORT_QUIET={}", cfg.quiet);
    println!("MSGPORT_MAX_CONNECTIONS={}", cfg.max_connections);
    println!("MSGPORT_FRAME_LIMIT={}", cfg.frame_limit);
    println!("MSGPORT_REJECT_BACKOFF_MS={}", cfg.reject_backoff_ms);
    println!("MSGPORT_TIME_TRACKER={}", cfg.time_tracker);
    println!("MSGPORT_SHUTDOWN_TIMEOUT_MS={}", cfg.shutdown_timeout_ms);
    println!("MSGPORT_LOG={}", cfg.log_level);
    println!(
        "MSGPORT_LOG_FORMAT={}",
        match cfg.log_format {
            crate::telemetry::LogFormat::Json => "json",
            crate::telemetry::LogFormat::Pretty => "pretty",
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};

    #[test]
    fn test_validate_passes_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        assert_eq!(run_validate(), ExitStatus::Clean);
    }

    #[test]
    fn test_validate_rejects_bad_bind_ip() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MSGPORT_BIND_IP", "127.0.0.1,localhost");
        let env = config::load().unwrap();
        let problems = validate(&env);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("localhost"));
        assert_eq!(run_validate(), ExitStatus::BadOptions);
        clear_env_vars();
    }

    #[test]
    fn test_validate_rejects_bad_log_filter() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MSGPORT_LOG", "msgport=loud");
        let problems = validate(&config::load().unwrap());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("MSGPORT_LOG"));
        clear_env_vars();
    }

    #[test]
    fn test_show_reports_missing_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MSGPORT_CONFIG", "/nonexistent/msgport.toml");
        assert_eq!(run_show(false), ExitStatus::BadOptions);
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_serializes() {
        let defaults = EnvConfig {
            config_file: None,
            server: ServerConfig::default(),
            log: LogConfig::default(),
        };
        let value = serde_json::to_value(defaults.effective_config()).unwrap();
        assert_eq!(value["port"], 27017);
        assert_eq!(value["log_format"], "json");
        print_config(&defaults.effective_config());
    }
}
