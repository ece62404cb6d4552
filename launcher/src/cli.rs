use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "jrelaunch",
    version,
    about = "Launches a Java application with its bundled JRE",
    after_help = "Trailing arguments are passed to Java main() method."
)]
pub struct Cli {
    /// Launch configuration [default: config.json in the application directory].
    /// Relative paths are taken from the directory jrelaunch was started in
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JRE directory, overriding `jrePath` from the configuration.
    /// Relative paths are taken from the directory jrelaunch was started in
    #[arg(long, value_name = "DIR")]
    pub jre: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Arguments for the application's main()
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0.., value_name = "ARGS")]
    pub args: Vec<String>,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["jrelaunch"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.jre.is_none());
        assert!(cli.args.is_empty());
        assert_eq!(cli.log_level(), LevelFilter::Info);
    }

    #[test]
    fn trailing_args_after_separator() {
        let cli = Cli::try_parse_from([
            "jrelaunch", "-vv", "--jre", "rt", "--", "--fullscreen", "-x", "level1",
        ])
        .unwrap();
        assert_eq!(cli.jre, Some(PathBuf::from("rt")));
        assert_eq!(cli.args, vec!["--fullscreen", "-x", "level1"]);
        assert_eq!(cli.log_level(), LevelFilter::Trace);
    }

    #[test]
    fn trailing_args_without_separator() {
        let cli = Cli::try_parse_from(["jrelaunch", "-c", "game.json", "save1", "--debug"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("game.json")));
        assert_eq!(cli.args, vec!["save1", "--debug"]);
    }

    #[test]
    fn help_mentions_main_arguments() {
        let err = Cli::try_parse_from(["jrelaunch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(err.to_string().contains("passed to Java main()"));
    }
}
