use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Reconciles load-balancer services and endpoints onto F5 BIG-IP devices.
#[derive(Debug, Parser)]
#[command(name = "archer-agent", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file; repeat to layer files, later ones win
    #[arg(long = "config-file", value_name = "PATH", action = ArgAction::Append)]
    pub config_files: Vec<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Validate the configuration and device credentials, then exit
    #[arg(long, conflicts_with = "print_config")]
    pub check_config: bool,

    /// Print the effective configuration as TOML, then exit
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_files_accumulate_in_order() {
        let cli = Cli::parse_from([
            "archer-agent",
            "--config-file",
            "a.toml",
            "--config-file",
            "b.toml",
            "-vv",
        ]);
        assert_eq!(
            cli.config_files,
            vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]
        );
        assert_eq!(cli.verbose, 2);
        assert!(!cli.log_json);
    }
}
