//! Replays scenario commands against a manager on a virtual clock.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use mission_core::{AbilityInfo, AbilityRequest, ApplicationInfo, CallType, ElementName, LaunchMode};
use mission_manager::{
    AbilityToken, CallResolution, ConnectionId, ManualScheduler, MissionListManager,
    MissionManagerConfig, StartOutcome,
};
use mission_store::{MissionInfo, MissionInfoStore};

use crate::command_file::{CommandFileEntry, CommandFileReport};
use crate::scenario_command::{parse_scenario_command, MissionRef, ScenarioCommand};
use crate::sim_driver::{HostReply, SimulatedDriver};

pub const LAUNCHER_UID: i32 = 20_000_000;
const APP_UID_BASE: i32 = 20_010_000;
const MAX_SETTLE_STEPS: usize = 10_000;

pub struct ScenarioRunner {
    manager: MissionListManager,
    scheduler: ManualScheduler,
    driver: Arc<SimulatedDriver>,
    auto_ack: bool,
    aliases: BTreeMap<String, AbilityToken>,
    pending_aliases: Vec<(String, ElementName)>,
    app_uids: BTreeMap<String, i32>,
}

impl ScenarioRunner {
    pub fn new(config: MissionManagerConfig, store: Arc<dyn MissionInfoStore>, auto_ack: bool) -> Self {
        let scheduler = ManualScheduler::new();
        let driver = Arc::new(SimulatedDriver::new());
        let manager =
            MissionListManager::new(config, driver.clone(), store, Arc::new(scheduler.clone()));
        Self {
            manager,
            scheduler,
            driver,
            auto_ack,
            aliases: BTreeMap::new(),
            pending_aliases: Vec::new(),
            app_uids: BTreeMap::new(),
        }
    }

    pub fn manager(&self) -> &MissionListManager {
        &self.manager
    }

    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    pub fn token(&self, alias: &str) -> Option<AbilityToken> {
        self.aliases.get(alias).copied()
    }

    pub fn mission_infos(&self) -> Result<Vec<MissionInfo>> {
        Ok(self.manager.get_mission_infos(i32::MAX)?)
    }

    /// Runs every entry, collecting output lines. Failed commands are reported
    /// and skipped unless `fail_fast` is set.
    pub fn run_entries(
        &mut self,
        entries: &[CommandFileEntry],
        fail_fast: bool,
    ) -> (CommandFileReport, Vec<String>) {
        let mut report = CommandFileReport {
            total: entries.len(),
            ..CommandFileReport::default()
        };
        let mut output = Vec::new();
        for entry in entries {
            report.executed += 1;
            let outcome = parse_scenario_command(&entry.command).and_then(|command| self.execute(command));
            match outcome {
                Ok(lines) => {
                    report.succeeded += 1;
                    output.extend(lines);
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(line = entry.line_number, error = %error, "scenario command failed");
                    output.extend(self.host_lines());
                    output.push(format!("line {}: {} failed: {error:#}", entry.line_number, entry.command));
                    if fail_fast {
                        report.halted_early = report.executed < report.total;
                        break;
                    }
                }
            }
        }
        (report, output)
    }

    /// Applies one command, lets the simulated host settle, and returns what happened.
    pub fn execute(&mut self, command: ScenarioCommand) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        match command {
            ScenarioCommand::Launcher => {
                let request = self.launcher_request();
                let outcome = self.manager.start_ability(request.clone())?;
                self.bind_started("launcher", &request, outcome);
                lines.push(format!("launcher: {}", describe_outcome(outcome)));
            }
            ScenarioCommand::Start {
                alias,
                bundle_name,
                ability_name,
                mode,
                caller,
                request_code,
            } => {
                let mut request = self.page_request(&bundle_name, &ability_name, mode);
                if let Some(caller) = caller {
                    request = request.with_caller(self.require_alias(&caller)?, request_code);
                }
                let outcome = self.manager.start_ability(request.clone())?;
                self.bind_started(&alias, &request, outcome);
                lines.push(format!("start {alias}: {}", describe_outcome(outcome)));
            }
            ScenarioCommand::Call {
                alias,
                bundle_name,
                ability_name,
                connection,
            } => {
                let request = self
                    .page_request(&bundle_name, &ability_name, LaunchMode::Singleton)
                    .with_call_type(CallType::Call);
                let element = request.element();
                let resolution = self.manager.resolve_locked(request, ConnectionId(connection))?;
                if let Some(token) = self.manager.find_ability_by_element(&element) {
                    self.aliases.insert(alias.clone(), token);
                }
                let resolution = match resolution {
                    CallResolution::Connected => "connected",
                    CallResolution::Waiting => "waiting",
                };
                lines.push(format!("call {alias}: {resolution}"));
            }
            ScenarioCommand::Release { alias, connection } => {
                let token = self.require_alias(&alias)?;
                let element = self
                    .manager
                    .record(token)
                    .map(|record| record.want().element.clone())
                    .ok_or_else(|| anyhow!("ability '{alias}' is gone"))?;
                self.manager.release_locked(ConnectionId(connection), &element)?;
                lines.push(format!("release {alias}: ok"));
            }
            ScenarioCommand::Attach(alias) => {
                let token = self.require_alias(&alias)?;
                self.manager.attach_ability_thread(token)?;
                lines.push(format!("attach {alias}: ok"));
            }
            ScenarioCommand::Done(alias, state) => {
                let token = self.require_alias(&alias)?;
                self.manager
                    .ability_transaction_done(token, state, BTreeMap::new())?;
                lines.push(format!("done {alias}: ok"));
            }
            ScenarioCommand::Minimize(alias) => {
                let token = self.require_alias(&alias)?;
                self.manager.minimize_ability(token, true)?;
                lines.push(format!("minimize {alias}: ok"));
            }
            ScenarioCommand::Terminate { alias, result_code } => {
                let token = self.require_alias(&alias)?;
                let result_want = result_code.and_then(|_| {
                    self.manager
                        .record(token)
                        .map(|record| record.want().clone())
                });
                self.manager
                    .terminate_ability(token, result_code.unwrap_or(-1), result_want)?;
                lines.push(format!("terminate {alias}: ok"));
            }
            ScenarioCommand::TerminateByCaller {
                caller,
                request_code,
            } => {
                let token = self.require_alias(&caller)?;
                self.manager.terminate_ability_by_caller(token, request_code)?;
                lines.push(format!("terminate-by-caller {caller}: ok"));
            }
            ScenarioCommand::Die(alias) => {
                let token = self.require_alias(&alias)?;
                self.driver.forget(token);
                let user_id = self.manager.user_id();
                self.manager.on_ability_died(token, user_id);
                lines.push(format!("die {alias}: ok"));
            }
            ScenarioCommand::Front(mission) => {
                let mission_id = self.resolve_mission(&mission)?;
                self.manager.move_mission_to_front(mission_id, None)?;
                lines.push(format!("front #{mission_id}: ok"));
            }
            ScenarioCommand::Clear(mission) => {
                let mission_id = self.resolve_mission(&mission)?;
                self.manager.clear_mission(mission_id)?;
                lines.push(format!("clear #{mission_id}: ok"));
            }
            ScenarioCommand::ClearAll => {
                self.manager.clear_all_missions()?;
                lines.push("clear-all: ok".to_string());
            }
            ScenarioCommand::Lock(mission, locked) => {
                let mission_id = self.resolve_mission(&mission)?;
                self.manager.set_mission_locked_state(mission_id, locked)?;
                let verb = if locked { "lock" } else { "unlock" };
                lines.push(format!("{verb} #{mission_id}: ok"));
            }
            ScenarioCommand::Label(alias, label) => {
                let token = self.require_alias(&alias)?;
                self.manager.set_mission_label(token, &label)?;
                lines.push(format!("label {alias}: ok"));
            }
            ScenarioCommand::Accept(flag) => {
                self.manager.on_accept_want_response(&flag)?;
                lines.push(format!("accept {flag}: ok"));
            }
            ScenarioCommand::Uninstall { bundle_name, uid } => {
                let uid = uid.unwrap_or_else(|| self.app_uid(&bundle_name));
                self.manager.uninstall_app(&bundle_name, uid);
                lines.push(format!("uninstall {bundle_name}: ok"));
            }
            ScenarioCommand::AutoAck(enabled) => {
                self.auto_ack = enabled;
                lines.push(format!("auto-ack: {}", if enabled { "on" } else { "off" }));
            }
            ScenarioCommand::RefuseLoads(refuse) => {
                self.driver.set_refuse_loads(refuse);
                lines.push(format!("refuse-loads: {}", if refuse { "on" } else { "off" }));
            }
            ScenarioCommand::Advance(delta_ms) => {
                let ran = self.scheduler.advance(&mut self.manager, delta_ms);
                lines.push(format!("advance {delta_ms}ms: {ran} task(s), now {}ms", self.now_ms()));
            }
            ScenarioCommand::Expect { alias, state } => {
                let token = self.require_alias(&alias)?;
                let actual = self.manager.record(token).map(|record| record.state());
                if actual != state {
                    bail!(
                        "expected {alias} to be {}, found {}",
                        state.map_or("gone", |state| state.as_str()),
                        actual.map_or("gone", |state| state.as_str())
                    );
                }
                lines.push(format!("expect {alias}: ok"));
            }
            ScenarioCommand::Dump(None) => lines.extend(self.manager.dump()),
            ScenarioCommand::Dump(Some(mission)) => {
                let mission_id = self.resolve_mission(&mission)?;
                lines.extend(self.manager.dump_mission(mission_id));
            }
            ScenarioCommand::Infos(limit) => {
                for info in self.manager.get_mission_infos(limit)? {
                    lines.push(format!(
                        "mission #{} {} label '{}' running {} locked {}",
                        info.id, info.mission_name, info.label, info.running_state, info.locked
                    ));
                }
            }
        }
        self.settle()?;
        let mut output = self.host_lines();
        output.extend(lines);
        Ok(output)
    }

    fn host_lines(&self) -> Vec<String> {
        self.driver
            .take_log()
            .into_iter()
            .map(|line| format!("  host: {line}"))
            .collect()
    }

    /// Pumps host replies and due tasks until nothing is left to do now.
    fn settle(&mut self) -> Result<()> {
        for _ in 0..MAX_SETTLE_STEPS {
            let ran = self.scheduler.run_due(&mut self.manager);
            let reply = if self.auto_ack {
                self.driver.pop_reply()
            } else {
                while self.driver.pop_reply().is_some() {}
                None
            };
            match reply {
                Some(reply) => self.apply_reply(reply),
                None if ran == 0 => {
                    self.bind_pending_aliases();
                    return Ok(());
                }
                None => {}
            }
        }
        bail!("scenario did not settle after {MAX_SETTLE_STEPS} steps")
    }

    fn apply_reply(&mut self, reply: HostReply) {
        let (token, result) = match reply {
            HostReply::Attach(token) => (token, self.manager.attach_ability_thread(token)),
            HostReply::Done(token, state) => (
                token,
                self.manager
                    .ability_transaction_done(token, state, BTreeMap::new()),
            ),
        };
        if let Err(error) = result {
            tracing::debug!(%token, error = %error, "host reply no longer applies");
        }
    }

    fn bind_started(&mut self, alias: &str, request: &AbilityRequest, outcome: StartOutcome) {
        let element = request.element();
        if outcome != StartOutcome::Started {
            self.pending_aliases.push((alias.to_string(), element));
            return;
        }
        let top = self.manager.current_top_ability().filter(|token| {
            self.manager
                .record(*token)
                .is_some_and(|record| record.want().element == element)
        });
        let token = top.or_else(|| self.manager.find_ability_by_element(&element));
        match token {
            Some(token) => {
                self.aliases.insert(alias.to_string(), token);
            }
            None => self.pending_aliases.push((alias.to_string(), element)),
        }
    }

    fn bind_pending_aliases(&mut self) {
        let pending = std::mem::take(&mut self.pending_aliases);
        for (alias, element) in pending {
            match self.manager.find_ability_by_element(&element) {
                Some(token) => {
                    self.aliases.insert(alias, token);
                }
                None => self.pending_aliases.push((alias, element)),
            }
        }
    }

    fn require_alias(&self, alias: &str) -> Result<AbilityToken> {
        self.token(alias)
            .ok_or_else(|| anyhow!("unknown ability alias '{alias}'"))
    }

    fn resolve_mission(&self, mission: &MissionRef) -> Result<i32> {
        match mission {
            MissionRef::Id(id) => Ok(*id),
            MissionRef::Alias(alias) => {
                let token = self.require_alias(alias)?;
                self.manager
                    .get_mission_id_by_ability_token(token)
                    .ok_or_else(|| anyhow!("ability '{alias}' has no mission"))
            }
        }
    }

    fn app_uid(&mut self, bundle_name: &str) -> i32 {
        if bundle_name == self.manager.config().launcher_bundle_name {
            return LAUNCHER_UID;
        }
        let next = APP_UID_BASE + 1 + self.app_uids.len() as i32;
        *self.app_uids.entry(bundle_name.to_string()).or_insert(next)
    }

    fn launcher_request(&mut self) -> AbilityRequest {
        let config = self.manager.config();
        let (bundle_name, ability_name) = (
            config.launcher_bundle_name.clone(),
            config.launcher_ability_name.clone(),
        );
        self.page_request(&bundle_name, &ability_name, LaunchMode::Singleton)
    }

    fn page_request(&mut self, bundle_name: &str, ability_name: &str, mode: LaunchMode) -> AbilityRequest {
        let uid = self.app_uid(bundle_name);
        AbilityRequest::new(
            AbilityInfo {
                bundle_name: bundle_name.to_string(),
                name: ability_name.to_string(),
                launch_mode: mode,
                visible: true,
                ..AbilityInfo::default()
            },
            ApplicationInfo {
                name: bundle_name.to_string(),
                bundle_name: bundle_name.to_string(),
                uid,
                is_launcher_app: uid == LAUNCHER_UID,
                label: bundle_name.to_string(),
                ..ApplicationInfo::default()
            },
        )
    }
}

fn describe_outcome(outcome: StartOutcome) -> &'static str {
    match outcome {
        StartOutcome::Started => "started",
        StartOutcome::Queued => "queued",
        StartOutcome::PendingSpecified => "pending specified",
    }
}
