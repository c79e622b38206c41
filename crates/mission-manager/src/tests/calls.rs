use mission_core::{CallType, LaunchMode};
use mission_store::MISSION_NOT_RUNNING;

use super::{page_request, DriverCall, Harness};
use crate::ability_record::{AbilityState, CallState, ConnectionId, TransactionState};
use crate::error::MissionError;
use crate::manager::CallResolution;

fn call_request() -> mission_core::AbilityRequest {
    page_request("com.example.player", "PlaybackAbility", LaunchMode::Singleton)
        .with_call_type(CallType::Call)
}

#[test]
fn unit_resolve_rejects_plain_start_requests() {
    let mut harness = Harness::new();
    harness.boot_launcher();

    let error = harness
        .manager
        .resolve_locked(
            page_request("com.example.player", "PlaybackAbility", LaunchMode::Singleton),
            ConnectionId(1),
        )
        .expect_err("not a call");

    assert!(matches!(error, MissionError::NotCallRequest));
}

#[test]
fn functional_call_loads_in_background_and_connects_once_ready() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let request = call_request();

    let resolution = harness
        .manager
        .resolve_locked(request.clone(), ConnectionId(11))
        .expect("resolve");
    assert_eq!(resolution, CallResolution::Waiting);

    let player = harness.token_of(&request);
    assert_eq!(
        harness.list_of(player),
        Some(harness.manager.default_single_list())
    );
    assert!(harness.record(player).is_start_to_background());
    assert!(harness.record(player).is_loading());
    assert_eq!(harness.record(player).calls()[0].state, CallState::Requesting);

    harness.manager.attach_ability_thread(player).expect("attach");
    assert_eq!(harness.state(player), AbilityState::Backgrounding);
    harness.confirm(player, TransactionState::Background);

    assert_eq!(harness.state(player), AbilityState::Background);
    assert!(harness
        .driver
        .calls()
        .contains(&DriverCall::CallRequest(player, ConnectionId(11))));
    assert_eq!(harness.record(player).calls()[0].state, CallState::Connected);
    // Background calls never take over the screen.
    assert_eq!(harness.front_list(), harness.manager.launcher_list());
}

#[test]
fn functional_call_to_ready_ability_connects_immediately() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let player = harness.bring_up(page_request(
        "com.example.player",
        "PlaybackAbility",
        LaunchMode::Singleton,
    ));

    let resolution = harness
        .manager
        .resolve_locked(call_request(), ConnectionId(3))
        .expect("resolve");

    assert_eq!(resolution, CallResolution::Connected);
    assert_eq!(harness.record(player).calls().len(), 1);
    assert_eq!(harness.record(player).calls()[0].state, CallState::Connected);
}

#[test]
fn functional_releasing_last_call_terminates_background_ability() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let request = call_request();
    harness
        .manager
        .resolve_locked(request.clone(), ConnectionId(5))
        .expect("resolve");
    let player = harness.token_of(&request);
    let mission_id = harness.mission_id(player);
    harness.manager.attach_ability_thread(player).expect("attach");
    harness.confirm(player, TransactionState::Background);

    let missing = harness
        .manager
        .release_locked(ConnectionId(6), &request.element())
        .expect_err("unknown connection");
    assert!(matches!(missing, MissionError::CallNotFound(6)));

    harness
        .manager
        .release_locked(ConnectionId(5), &request.element())
        .expect("release");
    assert_eq!(harness.state(player), AbilityState::Terminating);
    assert!(harness
        .driver
        .calls()
        .contains(&DriverCall::ScheduleTerminate(player)));

    harness.confirm(player, TransactionState::Initial);
    assert!(harness.manager.record(player).is_none());
    assert!(harness
        .manager
        .mission_list(harness.manager.default_single_list())
        .is_some_and(|list| list.is_empty()));
    assert_eq!(
        harness
            .manager
            .get_mission_info(mission_id)
            .expect("info")
            .running_state,
        MISSION_NOT_RUNNING
    );
}

#[test]
fn unit_release_for_unknown_element_is_rejected() {
    let mut harness = Harness::new();
    harness.boot_launcher();

    let error = harness
        .manager
        .release_locked(ConnectionId(1), &call_request().element())
        .expect_err("nothing to release");

    assert!(matches!(error, MissionError::AbilityNotFound(_)));
}
