use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mission_core::{AbilityToken, CallType, LaunchMode};
use mission_store::InMemoryMissionInfoStore;

use super::{launcher_request, page_request, DriverCall, RecordingDriver};
use crate::ability_record::{ConnectionId, TransactionState};
use crate::config::MissionManagerConfig;
use crate::error::MissionError;
use crate::manager::{CallResolution, StartOutcome};
use crate::service::spawn_mission_service;

fn loaded_tokens(driver: &RecordingDriver) -> Vec<AbilityToken> {
    driver
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DriverCall::Load(token) => Some(token),
            _ => None,
        })
        .collect()
}

#[test]
fn unit_spawn_outside_runtime_reports_runtime_unavailable() {
    let result = spawn_mission_service(
        MissionManagerConfig::default(),
        Arc::new(RecordingDriver::default()),
        Arc::new(InMemoryMissionInfoStore::new()),
    );
    assert!(matches!(result, Err(MissionError::RuntimeUnavailable)));
}

#[tokio::test]
async fn integration_service_drives_launcher_to_foreground_and_stops() {
    let driver = Arc::new(RecordingDriver::default());
    let mut service = spawn_mission_service(
        MissionManagerConfig::default(),
        driver.clone(),
        Arc::new(InMemoryMissionInfoStore::new()),
    )
    .expect("spawn service");
    assert!(service.is_running());

    let outcome = service
        .start_ability(launcher_request())
        .await
        .expect("start launcher");
    assert_eq!(outcome, StartOutcome::Started);
    let root = *loaded_tokens(&driver).first().expect("launcher load requested");

    service.attach_ability_thread(root).await.expect("attach");
    service
        .ability_transaction_done(root, TransactionState::Foreground, BTreeMap::new())
        .await
        .expect("foreground done");

    let dump = service.dump().await.expect("dump");
    assert!(dump.iter().any(|line| line.contains("state #FOREGROUND")));
    assert!(service.get_mission_infos(10).await.expect("infos").is_empty());

    service.shutdown().await;
    assert!(!service.is_running());
    assert!(matches!(
        service.dump().await,
        Err(MissionError::ServiceStopped)
    ));
}

#[tokio::test]
async fn integration_service_load_timeout_restarts_launcher() {
    let driver = Arc::new(RecordingDriver::default());
    let config = MissionManagerConfig {
        system_ui_load_timeout_ms: 20,
        ..MissionManagerConfig::default()
    };
    let mut service = spawn_mission_service(
        config,
        driver.clone(),
        Arc::new(InMemoryMissionInfoStore::new()),
    )
    .expect("spawn service");

    service
        .start_ability(launcher_request())
        .await
        .expect("start launcher");
    tokio::time::sleep(Duration::from_millis(250)).await;
    // Round-trip through the mailbox so every fired timer has been handled.
    service.dump().await.expect("dump");

    let loads = loaded_tokens(&driver);
    assert!(loads.len() >= 2, "expected a reload, got {loads:?}");
    assert!(driver
        .calls()
        .iter()
        .any(|call| matches!(call, DriverCall::ForceKill(token) if *token == loads[0])));

    service.shutdown().await;
}

#[tokio::test]
async fn integration_service_call_round_trip_connects_and_releases() {
    let driver = Arc::new(RecordingDriver::default());
    let mut service = spawn_mission_service(
        MissionManagerConfig::default(),
        driver.clone(),
        Arc::new(InMemoryMissionInfoStore::new()),
    )
    .expect("spawn service");
    service
        .start_ability(launcher_request())
        .await
        .expect("start launcher");
    let root = *loaded_tokens(&driver).first().expect("launcher load requested");
    service.attach_ability_thread(root).await.expect("attach launcher");
    service
        .ability_transaction_done(root, TransactionState::Foreground, BTreeMap::new())
        .await
        .expect("launcher foreground");

    let request = page_request("com.example.player", "PlaybackAbility", LaunchMode::Singleton)
        .with_call_type(CallType::Call);
    let resolution = service
        .resolve_locked(request.clone(), ConnectionId(21))
        .await
        .expect("resolve call");
    assert_eq!(resolution, CallResolution::Waiting);
    let player = *loaded_tokens(&driver).last().expect("player load requested");
    assert_ne!(player, root);

    service.attach_ability_thread(player).await.expect("attach player");
    service
        .ability_transaction_done(player, TransactionState::Background, BTreeMap::new())
        .await
        .expect("player background");
    assert!(driver
        .calls()
        .contains(&DriverCall::CallRequest(player, ConnectionId(21))));

    let mission_id = service
        .get_mission_id_by_ability_token(player)
        .await
        .expect("mission id lookup")
        .expect("player has a mission");
    assert_eq!(
        service
            .get_ability_token_by_mission_id(mission_id)
            .await
            .expect("token lookup"),
        Some(player)
    );
    service
        .set_mission_label(player, "Now playing")
        .await
        .expect("set label");
    assert_eq!(
        service
            .get_mission_info(mission_id)
            .await
            .expect("mission info")
            .label,
        "Now playing"
    );

    service
        .release_locked(ConnectionId(21), request.element())
        .await
        .expect("release call");
    assert!(driver
        .calls()
        .contains(&DriverCall::ScheduleTerminate(player)));

    service.shutdown().await;
}

#[tokio::test]
async fn functional_service_terminate_by_caller_reports_unknown_request() {
    let driver = Arc::new(RecordingDriver::default());
    let mut service = spawn_mission_service(
        MissionManagerConfig::default(),
        driver.clone(),
        Arc::new(InMemoryMissionInfoStore::new()),
    )
    .expect("spawn service");
    service
        .start_ability(launcher_request())
        .await
        .expect("start launcher");
    let root = *loaded_tokens(&driver).first().expect("launcher load requested");

    let result = service.terminate_ability_by_caller(root, 99).await;

    assert!(matches!(
        result,
        Err(MissionError::NotFoundByCaller {
            request_code: 99,
            ..
        })
    ));
    service.shutdown().await;
}
