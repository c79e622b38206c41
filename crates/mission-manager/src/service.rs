//! Tokio actor hosting one [`MissionListManager`].
//!
//! API calls and deferred tasks share a single mailbox, so the manager is
//! only ever touched by the actor task.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};

use mission_core::{AbilityRequest, AbilityToken, ElementName, Want};
use mission_store::{MissionInfo, MissionInfoStore};

use crate::ability_record::{ConnectionId, StartOptions, TransactionState};
use crate::collaborators::{ManagerTask, MissionListener, ProcessDriver, TaskScheduler, TimeoutKind};
use crate::config::MissionManagerConfig;
use crate::error::{MissionError, MissionResult};
use crate::manager::{CallResolution, MissionListManager, StartOutcome};
use crate::scheduler::lock_unpoisoned;

type Reply<T> = oneshot::Sender<MissionResult<T>>;

enum ServiceRequest {
    StartAbility {
        request: AbilityRequest,
        reply: Reply<StartOutcome>,
    },
    AttachAbilityThread {
        token: AbilityToken,
        reply: Reply<()>,
    },
    TransactionDone {
        token: AbilityToken,
        state: TransactionState,
        save_data: BTreeMap<String, String>,
        reply: Reply<()>,
    },
    MinimizeAbility {
        token: AbilityToken,
        from_user: bool,
        reply: Reply<()>,
    },
    TerminateAbility {
        token: AbilityToken,
        result_code: i32,
        result_want: Option<Want>,
        reply: Reply<()>,
    },
    TerminateByCaller {
        caller: AbilityToken,
        request_code: i32,
        reply: Reply<()>,
    },
    ResolveCall {
        request: AbilityRequest,
        connection: ConnectionId,
        reply: Reply<CallResolution>,
    },
    ReleaseCall {
        connection: ConnectionId,
        element: ElementName,
        reply: Reply<()>,
    },
    AbilityDied {
        token: AbilityToken,
        current_user_id: i32,
    },
    AcceptWantResponse {
        flag: String,
        reply: Reply<()>,
    },
    MoveMissionToFront {
        mission_id: i32,
        options: Option<StartOptions>,
        reply: Reply<()>,
    },
    ClearMission {
        mission_id: i32,
        reply: Reply<()>,
    },
    ClearAllMissions {
        reply: Reply<()>,
    },
    SetMissionLocked {
        mission_id: i32,
        locked: bool,
        reply: Reply<()>,
    },
    GetMissionInfos {
        num_max: i32,
        reply: Reply<Vec<MissionInfo>>,
    },
    GetMissionInfo {
        mission_id: i32,
        reply: Reply<MissionInfo>,
    },
    SetMissionLabel {
        token: AbilityToken,
        label: String,
        reply: Reply<()>,
    },
    MissionIdOfToken {
        token: AbilityToken,
        reply: Reply<Option<i32>>,
    },
    TokenOfMissionId {
        mission_id: i32,
        reply: Reply<Option<AbilityToken>>,
    },
    RegisterListener {
        listener: Arc<dyn MissionListener>,
        reply: Reply<bool>,
    },
    UnregisterListener {
        listener: Arc<dyn MissionListener>,
        reply: Reply<bool>,
    },
    UninstallApp {
        bundle_name: String,
        uid: i32,
    },
    Dump {
        reply: Reply<Vec<String>>,
    },
}

enum Envelope {
    Request(ServiceRequest),
    Task(ManagerTask),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TimerSlot {
    Named(String),
    Event(TimeoutKind, u64),
}

struct PendingTimer {
    seq: u64,
    handle: AbortHandle,
}

/// [`TaskScheduler`] that posts tasks back into the service mailbox.
struct TokioScheduler {
    runtime: Handle,
    mailbox: mpsc::UnboundedSender<Envelope>,
    timers: Arc<Mutex<HashMap<TimerSlot, PendingTimer>>>,
    next_seq: AtomicU64,
}

impl TokioScheduler {
    fn arm(&self, slot: TimerSlot, task: ManagerTask, delay: Duration) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mailbox = self.mailbox.clone();
        let timers = Arc::clone(&self.timers);
        let fired_slot = slot.clone();
        // Held across spawn so the timer cannot fire before it is registered.
        let mut pending = lock_unpoisoned(&self.timers);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut timers = lock_unpoisoned(&timers);
                let current = timers
                    .get(&fired_slot)
                    .is_some_and(|timer| timer.seq == seq);
                if current {
                    timers.remove(&fired_slot);
                }
                current
            };
            if current {
                let _ = mailbox.send(Envelope::Task(task));
            }
        });
        let timer = PendingTimer {
            seq,
            handle: join.abort_handle(),
        };
        if let Some(previous) = pending.insert(slot, timer) {
            previous.handle.abort();
        }
    }

    fn cancel(&self, slot: &TimerSlot) {
        if let Some(timer) = lock_unpoisoned(&self.timers).remove(slot) {
            timer.handle.abort();
        }
    }

    fn cancel_all(&self) {
        for (_, timer) in lock_unpoisoned(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}

impl TaskScheduler for TokioScheduler {
    fn post_task(&self, task: ManagerTask) {
        let _ = self.mailbox.send(Envelope::Task(task));
    }

    fn post_named_task(&self, name: &str, task: ManagerTask, delay: Duration) {
        self.arm(TimerSlot::Named(name.to_string()), task, delay);
    }

    fn remove_task(&self, name: &str) {
        self.cancel(&TimerSlot::Named(name.to_string()));
    }

    fn send_event(&self, kind: TimeoutKind, event_id: u64, delay: Duration) {
        self.arm(
            TimerSlot::Event(kind, event_id),
            ManagerTask::Timeout { kind, event_id },
            delay,
        );
    }

    fn remove_event(&self, kind: TimeoutKind, event_id: u64) {
        self.cancel(&TimerSlot::Event(kind, event_id));
    }
}

/// Handle to a running mission service.
pub struct MissionServiceHandle {
    mailbox: mpsc::UnboundedSender<Envelope>,
    task: Option<JoinHandle<()>>,
}

/// Spawns the mission service on the current tokio runtime.
pub fn spawn_mission_service(
    config: MissionManagerConfig,
    driver: Arc<dyn ProcessDriver>,
    store: Arc<dyn MissionInfoStore>,
) -> MissionResult<MissionServiceHandle> {
    let runtime = Handle::try_current().map_err(|_| MissionError::RuntimeUnavailable)?;
    let (mailbox, receiver) = mpsc::unbounded_channel();
    let scheduler = Arc::new(TokioScheduler {
        runtime: runtime.clone(),
        mailbox: mailbox.clone(),
        timers: Arc::new(Mutex::new(HashMap::new())),
        next_seq: AtomicU64::new(1),
    });
    let manager = MissionListManager::new(config, driver, store, scheduler.clone());
    let task = runtime.spawn(run_mission_service(manager, receiver, scheduler));
    Ok(MissionServiceHandle {
        mailbox,
        task: Some(task),
    })
}

async fn run_mission_service(
    mut manager: MissionListManager,
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    scheduler: Arc<TokioScheduler>,
) {
    tracing::debug!("mission service started");
    while let Some(envelope) = receiver.recv().await {
        match envelope {
            Envelope::Task(task) => manager.handle_task(task),
            Envelope::Request(request) => dispatch(&mut manager, request),
            Envelope::Shutdown => break,
        }
    }
    scheduler.cancel_all();
    tracing::debug!("mission service stopped");
}

fn dispatch(manager: &mut MissionListManager, request: ServiceRequest) {
    match request {
        ServiceRequest::StartAbility { request, reply } => {
            let _ = reply.send(manager.start_ability(request));
        }
        ServiceRequest::AttachAbilityThread { token, reply } => {
            let _ = reply.send(manager.attach_ability_thread(token));
        }
        ServiceRequest::TransactionDone {
            token,
            state,
            save_data,
            reply,
        } => {
            let _ = reply.send(manager.ability_transaction_done(token, state, save_data));
        }
        ServiceRequest::MinimizeAbility {
            token,
            from_user,
            reply,
        } => {
            let _ = reply.send(manager.minimize_ability(token, from_user));
        }
        ServiceRequest::TerminateAbility {
            token,
            result_code,
            result_want,
            reply,
        } => {
            let _ = reply.send(manager.terminate_ability(token, result_code, result_want));
        }
        ServiceRequest::TerminateByCaller {
            caller,
            request_code,
            reply,
        } => {
            let _ = reply.send(manager.terminate_ability_by_caller(caller, request_code));
        }
        ServiceRequest::ResolveCall {
            request,
            connection,
            reply,
        } => {
            let _ = reply.send(manager.resolve_locked(request, connection));
        }
        ServiceRequest::ReleaseCall {
            connection,
            element,
            reply,
        } => {
            let _ = reply.send(manager.release_locked(connection, &element));
        }
        ServiceRequest::AbilityDied {
            token,
            current_user_id,
        } => manager.on_ability_died(token, current_user_id),
        ServiceRequest::AcceptWantResponse { flag, reply } => {
            let _ = reply.send(manager.on_accept_want_response(&flag));
        }
        ServiceRequest::MoveMissionToFront {
            mission_id,
            options,
            reply,
        } => {
            let _ = reply.send(manager.move_mission_to_front(mission_id, options));
        }
        ServiceRequest::ClearMission { mission_id, reply } => {
            let _ = reply.send(manager.clear_mission(mission_id));
        }
        ServiceRequest::ClearAllMissions { reply } => {
            let _ = reply.send(manager.clear_all_missions());
        }
        ServiceRequest::SetMissionLocked {
            mission_id,
            locked,
            reply,
        } => {
            let _ = reply.send(manager.set_mission_locked_state(mission_id, locked));
        }
        ServiceRequest::GetMissionInfos { num_max, reply } => {
            let _ = reply.send(manager.get_mission_infos(num_max));
        }
        ServiceRequest::GetMissionInfo { mission_id, reply } => {
            let _ = reply.send(manager.get_mission_info(mission_id));
        }
        ServiceRequest::SetMissionLabel {
            token,
            label,
            reply,
        } => {
            let _ = reply.send(manager.set_mission_label(token, &label));
        }
        ServiceRequest::MissionIdOfToken { token, reply } => {
            let _ = reply.send(Ok(manager.get_mission_id_by_ability_token(token)));
        }
        ServiceRequest::TokenOfMissionId { mission_id, reply } => {
            let _ = reply.send(Ok(manager.get_ability_token_by_mission_id(mission_id)));
        }
        ServiceRequest::RegisterListener { listener, reply } => {
            let _ = reply.send(Ok(manager.register_mission_listener(listener)));
        }
        ServiceRequest::UnregisterListener { listener, reply } => {
            let _ = reply.send(Ok(manager.unregister_mission_listener(&listener)));
        }
        ServiceRequest::UninstallApp { bundle_name, uid } => {
            manager.uninstall_app(&bundle_name, uid);
        }
        ServiceRequest::Dump { reply } => {
            let _ = reply.send(Ok(manager.dump()));
        }
    }
}

impl MissionServiceHandle {
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ServiceRequest,
    ) -> MissionResult<T> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(Envelope::Request(build(reply)))
            .map_err(|_| MissionError::ServiceStopped)?;
        response.await.map_err(|_| MissionError::ServiceStopped)?
    }

    fn notify(&self, request: ServiceRequest) -> MissionResult<()> {
        self.mailbox
            .send(Envelope::Request(request))
            .map_err(|_| MissionError::ServiceStopped)
    }

    pub async fn start_ability(&self, request: AbilityRequest) -> MissionResult<StartOutcome> {
        self.call(|reply| ServiceRequest::StartAbility { request, reply })
            .await
    }

    pub async fn attach_ability_thread(&self, token: AbilityToken) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::AttachAbilityThread { token, reply })
            .await
    }

    pub async fn ability_transaction_done(
        &self,
        token: AbilityToken,
        state: TransactionState,
        save_data: BTreeMap<String, String>,
    ) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::TransactionDone {
            token,
            state,
            save_data,
            reply,
        })
        .await
    }

    pub async fn minimize_ability(&self, token: AbilityToken, from_user: bool) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::MinimizeAbility {
            token,
            from_user,
            reply,
        })
        .await
    }

    pub async fn terminate_ability(
        &self,
        token: AbilityToken,
        result_code: i32,
        result_want: Option<Want>,
    ) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::TerminateAbility {
            token,
            result_code,
            result_want,
            reply,
        })
        .await
    }

    pub async fn terminate_ability_by_caller(
        &self,
        caller: AbilityToken,
        request_code: i32,
    ) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::TerminateByCaller {
            caller,
            request_code,
            reply,
        })
        .await
    }

    pub async fn resolve_locked(
        &self,
        request: AbilityRequest,
        connection: ConnectionId,
    ) -> MissionResult<CallResolution> {
        self.call(|reply| ServiceRequest::ResolveCall {
            request,
            connection,
            reply,
        })
        .await
    }

    pub async fn release_locked(
        &self,
        connection: ConnectionId,
        element: ElementName,
    ) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::ReleaseCall {
            connection,
            element,
            reply,
        })
        .await
    }

    pub fn on_ability_died(&self, token: AbilityToken, current_user_id: i32) -> MissionResult<()> {
        self.notify(ServiceRequest::AbilityDied {
            token,
            current_user_id,
        })
    }

    pub async fn on_accept_want_response(&self, flag: impl Into<String>) -> MissionResult<()> {
        let flag = flag.into();
        self.call(|reply| ServiceRequest::AcceptWantResponse { flag, reply })
            .await
    }

    pub async fn move_mission_to_front(
        &self,
        mission_id: i32,
        options: Option<StartOptions>,
    ) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::MoveMissionToFront {
            mission_id,
            options,
            reply,
        })
        .await
    }

    pub async fn clear_mission(&self, mission_id: i32) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::ClearMission { mission_id, reply })
            .await
    }

    pub async fn clear_all_missions(&self) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::ClearAllMissions { reply })
            .await
    }

    pub async fn set_mission_locked_state(&self, mission_id: i32, locked: bool) -> MissionResult<()> {
        self.call(|reply| ServiceRequest::SetMissionLocked {
            mission_id,
            locked,
            reply,
        })
        .await
    }

    pub async fn get_mission_infos(&self, num_max: i32) -> MissionResult<Vec<MissionInfo>> {
        self.call(|reply| ServiceRequest::GetMissionInfos { num_max, reply })
            .await
    }

    pub async fn get_mission_info(&self, mission_id: i32) -> MissionResult<MissionInfo> {
        self.call(|reply| ServiceRequest::GetMissionInfo { mission_id, reply })
            .await
    }

    pub async fn set_mission_label(
        &self,
        token: AbilityToken,
        label: impl Into<String>,
    ) -> MissionResult<()> {
        let label = label.into();
        self.call(|reply| ServiceRequest::SetMissionLabel {
            token,
            label,
            reply,
        })
        .await
    }

    pub async fn get_mission_id_by_ability_token(
        &self,
        token: AbilityToken,
    ) -> MissionResult<Option<i32>> {
        self.call(|reply| ServiceRequest::MissionIdOfToken { token, reply })
            .await
    }

    pub async fn get_ability_token_by_mission_id(
        &self,
        mission_id: i32,
    ) -> MissionResult<Option<AbilityToken>> {
        self.call(|reply| ServiceRequest::TokenOfMissionId { mission_id, reply })
            .await
    }

    pub async fn register_mission_listener(
        &self,
        listener: Arc<dyn MissionListener>,
    ) -> MissionResult<bool> {
        self.call(|reply| ServiceRequest::RegisterListener { listener, reply })
            .await
    }

    pub async fn unregister_mission_listener(
        &self,
        listener: Arc<dyn MissionListener>,
    ) -> MissionResult<bool> {
        self.call(|reply| ServiceRequest::UnregisterListener { listener, reply })
            .await
    }

    pub fn uninstall_app(&self, bundle_name: impl Into<String>, uid: i32) -> MissionResult<()> {
        self.notify(ServiceRequest::UninstallApp {
            bundle_name: bundle_name.into(),
            uid,
        })
    }

    pub async fn dump(&self) -> MissionResult<Vec<String>> {
        self.call(|reply| ServiceRequest::Dump { reply }).await
    }

    /// Stops the actor after it drained everything queued before this call.
    pub async fn shutdown(&mut self) {
        let _ = self.mailbox.send(Envelope::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
