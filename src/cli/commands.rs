//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - discover: parse tool config files and report what was found
//! - load: build tools from configs, then release everything they opened
//! - sessions: list, inspect, and delete persisted sessions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// toolhost - load tools from config files and manage agent sessions
#[derive(Parser, Debug)]
#[command(name = "toolhost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse tool config files without creating tools
    Discover {
        /// Config files (JSON or YAML); defaults to tools.paths from the config
        paths: Vec<PathBuf>,
    },

    /// Create tools from config files and report the outcome
    Load {
        /// Config files (JSON or YAML); defaults to tools.paths from the config
        paths: Vec<PathBuf>,

        /// Per-config time limit in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Session management commands
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// List stored sessions
    List,

    /// Show a stored session, or the default session when no id is given
    Info {
        /// Session id
        id: Option<String>,
    },

    /// Delete a stored session
    Delete {
        /// Session id
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["toolhost"]).is_err());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["toolhost", "-v", "sessions", "list"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option_is_global() {
        let cli = Cli::try_parse_from(["toolhost", "discover", "-c", "/path/to/toolhost.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/toolhost.yml")));
    }

    #[test]
    fn test_discover_paths() {
        let cli = Cli::try_parse_from(["toolhost", "discover", "a.json", "b.yaml"]).unwrap();
        match cli.command {
            Commands::Discover { paths } => {
                assert_eq!(paths, vec![PathBuf::from("a.json"), PathBuf::from("b.yaml")]);
            }
            _ => panic!("Expected discover command"),
        }
    }

    #[test]
    fn test_discover_without_paths() {
        let cli = Cli::try_parse_from(["toolhost", "discover"]).unwrap();
        match cli.command {
            Commands::Discover { paths } => assert!(paths.is_empty()),
            _ => panic!("Expected discover command"),
        }
    }

    #[test]
    fn test_load_with_timeout() {
        let cli = Cli::try_parse_from(["toolhost", "load", "tools.json", "--timeout-ms", "500"]).unwrap();
        match cli.command {
            Commands::Load { paths, timeout_ms } => {
                assert_eq!(paths, vec![PathBuf::from("tools.json")]);
                assert_eq!(timeout_ms, Some(500));
            }
            _ => panic!("Expected load command"),
        }
    }

    #[test]
    fn test_load_default_timeout() {
        let cli = Cli::try_parse_from(["toolhost", "load", "tools.json"]).unwrap();
        match cli.command {
            Commands::Load { timeout_ms, .. } => assert!(timeout_ms.is_none()),
            _ => panic!("Expected load command"),
        }
    }

    #[test]
    fn test_sessions_info_optional_id() {
        let cli = Cli::try_parse_from(["toolhost", "sessions", "info"]).unwrap();
        match cli.command {
            Commands::Sessions {
                command: SessionCommands::Info { id },
            } => assert!(id.is_none()),
            _ => panic!("Expected sessions info command"),
        }

        let cli = Cli::try_parse_from(["toolhost", "sessions", "info", "demo"]).unwrap();
        match cli.command {
            Commands::Sessions {
                command: SessionCommands::Info { id },
            } => assert_eq!(id.as_deref(), Some("demo")),
            _ => panic!("Expected sessions info command"),
        }
    }

    #[test]
    fn test_sessions_delete_requires_id() {
        assert!(Cli::try_parse_from(["toolhost", "sessions", "delete"]).is_err());
        let cli = Cli::try_parse_from(["toolhost", "sessions", "delete", "old"]).unwrap();
        match cli.command {
            Commands::Sessions {
                command: SessionCommands::Delete { id },
            } => assert_eq!(id, "old"),
            _ => panic!("Expected sessions delete command"),
        }
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_flag() {
        let result = Cli::try_parse_from(["toolhost", "--version"]);
        // Version flag causes early exit with error (expected)
        assert!(result.is_err());
    }
}
