use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ribbin")]
#[command(
    version,
    about = "Intercept tool invocations and enforce project conventions",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install shims for every command named in the project config
    Wrap(WrapArgs),
    /// Remove shims and restore the original binaries
    Unwrap(UnwrapArgs),
    /// Turn interception on (nearest config by default)
    Activate(ActivateArgs),
    /// Turn interception off (nearest config by default)
    Deactivate(DeactivateArgs),
    /// Show activation state and installed shims
    Status,
    /// Inspect project configuration
    Config(ConfigCmd),
    /// Repair shims left inconsistent by interrupted operations or reinstalls
    Recover(RecoverArgs),
}

#[derive(Args, Debug)]
pub struct WrapArgs {
    /// Config file to read instead of the nearest one
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Allow wrapping binaries in system directories such as /usr/bin
    #[arg(long)]
    pub confirm_system_dir: bool,
}

#[derive(Args, Debug)]
pub struct UnwrapArgs {
    /// Unwrap everything in the registry, not just this project's commands
    #[arg(long, conflicts_with = "config")]
    pub all: bool,
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("tier").args(["global", "shell", "config"])))]
pub struct ActivateArgs {
    /// Activate everywhere
    #[arg(long)]
    pub global: bool,
    /// Activate for the calling shell and its descendants
    #[arg(long)]
    pub shell: bool,
    /// Activate a specific config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("tier").args(["global", "shell", "config", "everything"])))]
pub struct DeactivateArgs {
    #[arg(long)]
    pub global: bool,
    #[arg(long)]
    pub shell: bool,
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Clear every activation tier
    #[arg(long)]
    pub everything: bool,
}

#[derive(Args, Debug)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print effective policies for the current directory with their sources
    Show {
        /// Only show this command
        command: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// Extra directories to scan for orphaned sidecars
    #[arg(long = "search-path", value_name = "DIR")]
    pub search_paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_activation_tiers_are_exclusive() {
        assert!(Cli::try_parse_from(["ribbin", "activate", "--global", "--shell"]).is_err());
        assert!(
            Cli::try_parse_from(["ribbin", "deactivate", "--everything", "--global"]).is_err()
        );
        let cli = Cli::try_parse_from(["ribbin", "activate", "--config", "a/ribbin.jsonc"]).unwrap();
        match cli.command {
            Command::Activate(args) => {
                assert_eq!(args.config, Some(PathBuf::from("a/ribbin.jsonc")));
                assert!(!args.global && !args.shell);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_recover_collects_search_paths() {
        let cli = Cli::try_parse_from([
            "ribbin",
            "recover",
            "--search-path",
            "/usr/local/bin",
            "--search-path",
            "/opt/bin",
        ])
        .unwrap();
        match cli.command {
            Command::Recover(args) => assert_eq!(args.search_paths.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_config_show_optional_command() {
        let cli = Cli::try_parse_from(["ribbin", "config", "show", "npm"]).unwrap();
        match cli.command {
            Command::Config(ConfigCmd {
                action: ConfigAction::Show { command },
            }) => assert_eq!(command.as_deref(), Some("npm")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["ribbin", "unwrap", "--all", "--config", "x"]).is_err());
    }
}
