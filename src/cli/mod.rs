// Copyright 2024-2026 msgport Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for msgport commands.
//!
//! ## Usage
//!
//! ```bash
//! msgport                   # Run the echo server (same as `serve`)
//! msgport config show       # Print effective configuration
//! msgport config validate   # Check configuration, exit 2 on errors
//! ```

pub mod config_cmd;
pub mod serve;

pub use serve::run_serve;

/// Parse a `--flag` anywhere after the subcommand.
pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().skip(2).any(|a| a == flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_has_flag_after_subcommand() {
        assert!(has_flag(&args(&["msgport", "config", "show", "--json"]), "--json"));
        assert!(!has_flag(&args(&["msgport", "config", "show"]), "--json"));
    }

    #[test]
    fn test_has_flag_ignores_program_and_command() {
        assert!(!has_flag(&args(&["--json", "config"]), "--json"));
    }
}
