mod calls;
mod service;
mod start_flow;
mod terminate;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mission_core::{
    AbilityInfo, AbilityRequest, AbilityToken, ApplicationInfo, ElementName, LaunchMode, Want,
};
use mission_store::{InMemoryMissionInfoStore, MissionInfoStore};

use crate::ability_record::{AbilityRecord, AbilityResult, AbilityState, ConnectionId, TransactionState};
use crate::collaborators::{MissionListener, ProcessDriver};
use crate::config::MissionManagerConfig;
use crate::manager::{MissionListManager, StartOutcome};
use crate::mission_list::ListKey;
use crate::scheduler::ManualScheduler;

pub(crate) const LAUNCHER_BUNDLE: &str = "com.ohos.launcher";
pub(crate) const LAUNCHER_ABILITY: &str = "com.ohos.launcher.MainAbility";
pub(crate) const LAUNCHER_UID: i32 = 20_000_000;
pub(crate) const APP_UID: i32 = 20_010_001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DriverCall {
    Load(AbilityToken),
    Foreground(AbilityToken),
    Background(AbilityToken),
    ScheduleTerminate(AbilityToken),
    Terminate(AbilityToken),
    ForceKill(AbilityToken),
    LifecycleReached(String),
    StartSpecified(ElementName),
    CallRequest(AbilityToken, ConnectionId),
    SendResult(AbilityToken, AbilityResult),
}

#[derive(Default)]
pub(crate) struct RecordingDriver {
    calls: Mutex<Vec<DriverCall>>,
    refuse_load: AtomicBool,
}

impl RecordingDriver {
    pub(crate) fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().expect("driver calls lock").clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub(crate) fn set_refuse_load(&self, refuse: bool) {
        self.refuse_load.store(refuse, Ordering::SeqCst);
    }

    fn push(&self, call: DriverCall) {
        self.calls.lock().expect("driver calls lock").push(call);
    }
}

impl ProcessDriver for RecordingDriver {
    fn request_load(&self, ability: &AbilityRecord, _caller: Option<AbilityToken>) -> bool {
        self.push(DriverCall::Load(ability.token()));
        !self.refuse_load.load(Ordering::SeqCst)
    }

    fn request_foreground(&self, ability: &AbilityRecord) {
        self.push(DriverCall::Foreground(ability.token()));
    }

    fn request_background(&self, ability: &AbilityRecord) {
        self.push(DriverCall::Background(ability.token()));
    }

    fn schedule_terminate(&self, ability: &AbilityRecord) {
        self.push(DriverCall::ScheduleTerminate(ability.token()));
    }

    fn request_terminate(&self, ability: &AbilityRecord) -> bool {
        self.push(DriverCall::Terminate(ability.token()));
        true
    }

    fn force_kill(&self, ability: &AbilityRecord) {
        self.push(DriverCall::ForceKill(ability.token()));
    }

    fn notify_lifecycle_reached(
        &self,
        _bundle_name: &str,
        ability_name: &str,
        _timestamp_unix_s: u64,
        _uid: i32,
    ) {
        self.push(DriverCall::LifecycleReached(ability_name.to_string()));
    }

    fn start_specified_ability(&self, want: &Want, _ability_info: &AbilityInfo) {
        self.push(DriverCall::StartSpecified(want.element.clone()));
    }

    fn call_request(&self, ability: &AbilityRecord, connection: ConnectionId) -> bool {
        self.push(DriverCall::CallRequest(ability.token(), connection));
        true
    }

    fn send_result(&self, caller: &AbilityRecord, result: &AbilityResult) {
        self.push(DriverCall::SendResult(caller.token(), result.clone()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerEvent {
    Created(i32),
    Destroyed(i32),
    SnapshotChanged(i32),
    MovedToFront(i32),
}

#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().expect("listener events lock").clone()
    }

    fn push(&self, event: ListenerEvent) {
        self.events.lock().expect("listener events lock").push(event);
    }
}

impl MissionListener for RecordingListener {
    fn on_mission_created(&self, mission_id: i32) {
        self.push(ListenerEvent::Created(mission_id));
    }

    fn on_mission_destroyed(&self, mission_id: i32) {
        self.push(ListenerEvent::Destroyed(mission_id));
    }

    fn on_mission_snapshot_changed(&self, mission_id: i32) {
        self.push(ListenerEvent::SnapshotChanged(mission_id));
    }

    fn on_mission_moved_to_front(&self, mission_id: i32) {
        self.push(ListenerEvent::MovedToFront(mission_id));
    }
}

pub(crate) fn launcher_request() -> AbilityRequest {
    AbilityRequest::new(
        AbilityInfo {
            bundle_name: LAUNCHER_BUNDLE.to_string(),
            name: LAUNCHER_ABILITY.to_string(),
            launch_mode: LaunchMode::Singleton,
            visible: true,
            ..AbilityInfo::default()
        },
        ApplicationInfo {
            name: "launcher".to_string(),
            bundle_name: LAUNCHER_BUNDLE.to_string(),
            uid: LAUNCHER_UID,
            is_launcher_app: true,
            ..ApplicationInfo::default()
        },
    )
}

pub(crate) fn page_request(bundle_name: &str, ability_name: &str, mode: LaunchMode) -> AbilityRequest {
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
            uid: APP_UID,
            label: format!("{bundle_name} label"),
            ..ApplicationInfo::default()
        },
    )
}

pub(crate) struct Harness {
    pub(crate) manager: MissionListManager,
    pub(crate) scheduler: ManualScheduler,
    pub(crate) driver: Arc<RecordingDriver>,
    pub(crate) listener: Arc<RecordingListener>,
    pub(crate) store: Arc<dyn MissionInfoStore>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_store(Arc::new(InMemoryMissionInfoStore::new()))
    }

    pub(crate) fn with_store(store: Arc<dyn MissionInfoStore>) -> Self {
        let scheduler = ManualScheduler::new();
        let driver = Arc::new(RecordingDriver::default());
        let listener = Arc::new(RecordingListener::default());
        let mut manager = MissionListManager::new(
            MissionManagerConfig::default(),
            driver.clone(),
            store.clone(),
            Arc::new(scheduler.clone()),
        );
        manager.register_mission_listener(listener.clone());
        Self {
            manager,
            scheduler,
            driver,
            listener,
            store,
        }
    }

    pub(crate) fn run(&mut self) -> usize {
        self.scheduler.run_due(&mut self.manager)
    }

    pub(crate) fn advance(&mut self, delta_ms: u64) -> usize {
        self.scheduler.advance(&mut self.manager, delta_ms)
    }

    pub(crate) fn token_of(&self, request: &AbilityRequest) -> AbilityToken {
        self.manager
            .find_ability_by_element(&request.element())
            .expect("ability is listed")
    }

    pub(crate) fn start(&mut self, request: AbilityRequest) -> AbilityToken {
        let outcome = self.manager.start_ability(request.clone()).expect("start ability");
        assert_eq!(outcome, StartOutcome::Started);
        self.run();
        self.token_of(&request)
    }

    pub(crate) fn attach_and_foreground(&mut self, token: AbilityToken) {
        self.manager.attach_ability_thread(token).expect("attach");
        self.confirm(token, TransactionState::Foreground);
    }

    pub(crate) fn confirm(&mut self, token: AbilityToken, state: TransactionState) {
        self.manager
            .ability_transaction_done(token, state, BTreeMap::new())
            .expect("transaction done");
        self.run();
    }

    pub(crate) fn bring_up(&mut self, request: AbilityRequest) -> AbilityToken {
        let token = self.start(request);
        self.attach_and_foreground(token);
        assert_eq!(self.state(token), AbilityState::Foreground);
        token
    }

    pub(crate) fn boot_launcher(&mut self) -> AbilityToken {
        let root = self.bring_up(launcher_request());
        assert!(self.record(root).is_launcher_root());
        root
    }

    pub(crate) fn minimize(&mut self, token: AbilityToken) {
        self.manager.minimize_ability(token, true).expect("minimize");
        self.confirm(token, TransactionState::Background);
        assert_eq!(self.state(token), AbilityState::Background);
    }

    pub(crate) fn record(&self, token: AbilityToken) -> &AbilityRecord {
        self.manager.record(token).expect("record exists")
    }

    pub(crate) fn state(&self, token: AbilityToken) -> AbilityState {
        self.record(token).state()
    }

    pub(crate) fn mission_id(&self, token: AbilityToken) -> i32 {
        self.manager
            .get_mission_id_by_ability_token(token)
            .expect("record has a mission")
    }

    pub(crate) fn list_of(&self, token: AbilityToken) -> Option<ListKey> {
        self.record(token)
            .mission()
            .and_then(|mission| self.manager.mission(mission))
            .and_then(|mission| mission.list())
    }

    /// Abilities of `list`, top first.
    pub(crate) fn list_abilities(&self, list: ListKey) -> Vec<AbilityToken> {
        self.manager
            .mission_list(list)
            .map(|entry| {
                entry
                    .missions()
                    .filter_map(|mission| self.manager.mission(mission))
                    .map(|mission| mission.ability())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn front_list(&self) -> ListKey {
        self.manager.current_mission_lists()[0]
    }
}
