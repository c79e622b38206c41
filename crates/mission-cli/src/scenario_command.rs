use anyhow::{anyhow, bail, Context, Result};
use mission_core::LaunchMode;
use mission_manager::{AbilityState, TransactionState};

/// Mission addressed by a scenario: either an ability alias or a raw id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionRef {
    Alias(String),
    Id(i32),
}

impl MissionRef {
    fn parse(raw: &str) -> Self {
        match raw.parse::<i32>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Alias(raw.to_string()),
        }
    }
}

/// One parsed line of a scenario file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioCommand {
    Launcher,
    Start {
        alias: String,
        bundle_name: String,
        ability_name: String,
        mode: LaunchMode,
        caller: Option<String>,
        request_code: i32,
    },
    Call {
        alias: String,
        bundle_name: String,
        ability_name: String,
        connection: u64,
    },
    Release {
        alias: String,
        connection: u64,
    },
    Attach(String),
    Done(String, TransactionState),
    Minimize(String),
    Terminate {
        alias: String,
        result_code: Option<i32>,
    },
    TerminateByCaller {
        caller: String,
        request_code: i32,
    },
    Die(String),
    Front(MissionRef),
    Clear(MissionRef),
    ClearAll,
    Lock(MissionRef, bool),
    Label(String, String),
    Accept(String),
    Uninstall {
        bundle_name: String,
        uid: Option<i32>,
    },
    AutoAck(bool),
    RefuseLoads(bool),
    Advance(u64),
    Expect {
        alias: String,
        state: Option<AbilityState>,
    },
    Dump(Option<MissionRef>),
    Infos(i32),
}

pub const SCENARIO_USAGE: &str = "\
launcher
start <alias> <bundle> <ability> [standard|singleton|single_top|specified] [--caller <alias>] [--code <n>]
call <alias> <bundle> <ability> <connection>
release <alias> <connection>
attach <alias>
done <alias> <foreground|background|initial>
minimize <alias>
terminate <alias> [result-code]
terminate-by-caller <caller-alias> <request-code>
die <alias>
front|clear|lock|unlock <alias|mission-id>
clear-all
label <alias> <text>
accept <flag>
uninstall <bundle> [uid]
auto-ack on|off
refuse-loads on|off
advance <ms>
expect <alias> <STATE|gone>
dump [alias|mission-id]
infos [limit]";

fn required<'a>(tokens: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    tokens
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing {what}"))
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("invalid {what} '{raw}'"))
}

fn parse_switch(raw: &str) -> Result<bool> {
    match raw {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        other => bail!("expected on|off, got '{other}'"),
    }
}

fn parse_launch_mode(raw: &str) -> Result<LaunchMode> {
    match raw.to_ascii_lowercase().as_str() {
        "standard" => Ok(LaunchMode::Standard),
        "singleton" => Ok(LaunchMode::Singleton),
        "single_top" | "singletop" => Ok(LaunchMode::SingleTop),
        "specified" => Ok(LaunchMode::Specified),
        other => bail!("unknown launch mode '{other}'"),
    }
}

fn parse_transaction_state(raw: &str) -> Result<TransactionState> {
    match raw.to_ascii_lowercase().as_str() {
        "foreground" => Ok(TransactionState::Foreground),
        "background" => Ok(TransactionState::Background),
        "initial" | "terminated" => Ok(TransactionState::Initial),
        other => bail!("unknown transaction state '{other}'"),
    }
}

fn parse_expected_state(raw: &str) -> Result<Option<AbilityState>> {
    let state = match raw.to_ascii_uppercase().as_str() {
        "GONE" => return Ok(None),
        "INITIAL" => AbilityState::Initial,
        "FOREGROUNDING" => AbilityState::Foregrounding,
        "FOREGROUND" => AbilityState::Foreground,
        "BACKGROUNDING" => AbilityState::Backgrounding,
        "BACKGROUND" => AbilityState::Background,
        "TERMINATING" => AbilityState::Terminating,
        other => bail!("unknown ability state '{other}'"),
    };
    Ok(Some(state))
}

fn parse_start(tokens: &[String]) -> Result<ScenarioCommand> {
    let alias = required(tokens, 1, "alias")?.to_string();
    let bundle_name = required(tokens, 2, "bundle name")?.to_string();
    let ability_name = required(tokens, 3, "ability name")?.to_string();
    let mut mode = LaunchMode::Standard;
    let mut caller = None;
    let mut request_code = -1;
    let mut index = 4;
    while let Some(token) = tokens.get(index) {
        match token.as_str() {
            "--caller" => {
                caller = Some(required(tokens, index + 1, "caller alias")?.to_string());
                index += 2;
            }
            "--code" => {
                request_code = parse_number(required(tokens, index + 1, "request code")?, "request code")?;
                index += 2;
            }
            raw if index == 4 => {
                mode = parse_launch_mode(raw)?;
                index += 1;
            }
            other => bail!("unexpected start argument '{other}'"),
        }
    }
    Ok(ScenarioCommand::Start {
        alias,
        bundle_name,
        ability_name,
        mode,
        caller,
        request_code,
    })
}

/// Parses one scenario line. Arguments follow shell quoting rules.
pub fn parse_scenario_command(line: &str) -> Result<ScenarioCommand> {
    let tokens = shell_words::split(line).with_context(|| format!("invalid quoting in '{line}'"))?;
    let Some(verb) = tokens.first() else {
        bail!("empty command");
    };
    let alias = |index: usize| required(&tokens, index, "alias").map(str::to_string);
    let mission = |index: usize| required(&tokens, index, "mission").map(MissionRef::parse);

    let command = match verb.as_str() {
        "launcher" => ScenarioCommand::Launcher,
        "start" => parse_start(&tokens)?,
        "call" => ScenarioCommand::Call {
            alias: alias(1)?,
            bundle_name: required(&tokens, 2, "bundle name")?.to_string(),
            ability_name: required(&tokens, 3, "ability name")?.to_string(),
            connection: parse_number(required(&tokens, 4, "connection")?, "connection")?,
        },
        "release" => ScenarioCommand::Release {
            alias: alias(1)?,
            connection: parse_number(required(&tokens, 2, "connection")?, "connection")?,
        },
        "attach" => ScenarioCommand::Attach(alias(1)?),
        "done" => ScenarioCommand::Done(
            alias(1)?,
            parse_transaction_state(required(&tokens, 2, "transaction state")?)?,
        ),
        "minimize" => ScenarioCommand::Minimize(alias(1)?),
        "terminate" => ScenarioCommand::Terminate {
            alias: alias(1)?,
            result_code: tokens
                .get(2)
                .map(|raw| parse_number(raw, "result code"))
                .transpose()?,
        },
        "terminate-by-caller" => ScenarioCommand::TerminateByCaller {
            caller: alias(1)?,
            request_code: parse_number(required(&tokens, 2, "request code")?, "request code")?,
        },
        "die" => ScenarioCommand::Die(alias(1)?),
        "front" => ScenarioCommand::Front(mission(1)?),
        "clear" => ScenarioCommand::Clear(mission(1)?),
        "clear-all" => ScenarioCommand::ClearAll,
        "lock" => ScenarioCommand::Lock(mission(1)?, true),
        "unlock" => ScenarioCommand::Lock(mission(1)?, false),
        "label" => ScenarioCommand::Label(alias(1)?, required(&tokens, 2, "label")?.to_string()),
        "accept" => ScenarioCommand::Accept(required(&tokens, 1, "flag")?.to_string()),
        "uninstall" => ScenarioCommand::Uninstall {
            bundle_name: required(&tokens, 1, "bundle name")?.to_string(),
            uid: tokens
                .get(2)
                .map(|raw| parse_number(raw, "uid"))
                .transpose()?,
        },
        "auto-ack" => ScenarioCommand::AutoAck(parse_switch(required(&tokens, 1, "switch")?)?),
        "refuse-loads" => {
            ScenarioCommand::RefuseLoads(parse_switch(required(&tokens, 1, "switch")?)?)
        }
        "advance" => ScenarioCommand::Advance(parse_number(
            required(&tokens, 1, "milliseconds")?,
            "milliseconds",
        )?),
        "expect" => ScenarioCommand::Expect {
            alias: alias(1)?,
            state: parse_expected_state(required(&tokens, 2, "state")?)?,
        },
        "dump" => ScenarioCommand::Dump(tokens.get(1).map(|raw| MissionRef::parse(raw))),
        "infos" => ScenarioCommand::Infos(
            tokens
                .get(1)
                .map(|raw| parse_number(raw, "limit"))
                .transpose()?
                .unwrap_or(i32::MAX),
        ),
        other => bail!("unknown command '{other}'"),
    };
    Ok(command)
}
