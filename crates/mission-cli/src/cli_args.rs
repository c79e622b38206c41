use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Debug, Parser)]
#[command(
    name = "missionctl",
    about = "Replays mission lifecycle scenarios against a simulated ability host",
    version
)]
pub struct Cli {
    #[arg(
        required_unless_present = "print_commands",
        help = "Scenario command file; one command per line, '#' starts a comment"
    )]
    pub scenario: Option<PathBuf>,

    #[arg(
        long,
        env = "MISSIONCTL_CONFIG",
        help = "TOML file with mission manager settings; MISSION_* env vars override it"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "MISSIONCTL_STORE",
        help = "JSON file persisting mission infos across runs (in-memory when omitted)"
    )]
    pub store: Option<PathBuf>,

    #[arg(
        long = "auto-ack",
        env = "MISSIONCTL_AUTO_ACK",
        default_value_t = true,
        action = ArgAction::Set,
        help = "Answer load/foreground/background/terminate requests as a healthy host would"
    )]
    pub auto_ack: bool,

    #[arg(long = "fail-fast", help = "Stop at the first failing command")]
    pub fail_fast: bool,

    #[arg(long, help = "Print the final mission infos as JSON instead of the dump")]
    pub json: bool,

    #[arg(long = "print-commands", help = "List scenario commands and exit")]
    pub print_commands: bool,

    #[arg(
        short,
        long,
        help = "Log manager decisions at info level; MISSIONCTL_LOG overrides"
    )]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn unit_cli_defaults_to_auto_ack_and_in_memory_store() {
        let cli = Cli::try_parse_from(["missionctl", "boot.scenario"]).expect("parse cli");
        assert!(cli.auto_ack);
        assert!(cli.store.is_none());
        assert!(!cli.fail_fast);
        assert_eq!(
            cli.scenario.as_deref().and_then(|path| path.to_str()),
            Some("boot.scenario")
        );
    }

    #[test]
    fn unit_print_commands_does_not_need_a_scenario() {
        let cli = Cli::try_parse_from(["missionctl", "--print-commands"]).expect("parse cli");
        assert!(cli.print_commands);
        assert!(cli.scenario.is_none());
        assert!(!cli.verbose);
        assert!(Cli::try_parse_from(["missionctl"]).is_err());
    }

    #[test]
    fn functional_cli_accepts_explicit_switches() {
        let cli = Cli::try_parse_from([
            "missionctl",
            "--auto-ack",
            "false",
            "--store",
            "/tmp/missions.json",
            "--fail-fast",
            "--json",
            "boot.scenario",
        ])
        .expect("parse cli");
        assert!(!cli.auto_ack);
        assert!(cli.fail_fast);
        assert!(cli.json);
        assert_eq!(
            cli.store.as_deref().and_then(|path| path.to_str()),
            Some("/tmp/missions.json")
        );
    }
}
