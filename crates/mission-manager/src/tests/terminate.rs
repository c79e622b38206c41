use mission_core::{ElementName, LaunchMode, Want};
use mission_store::MISSION_NOT_RUNNING;

use super::{launcher_request, page_request, DriverCall, Harness, LAUNCHER_BUNDLE};
use crate::ability_record::{AbilityState, TransactionState};
use crate::collaborators::TimeoutKind;
use crate::error::{MissionError, PolicyDenial};

#[test]
fn functional_launcher_root_cannot_be_terminated() {
    let mut harness = Harness::new();
    let root = harness.boot_launcher();

    let error = harness
        .manager
        .terminate_ability(root, 0, None)
        .expect_err("launcher root is immortal");

    assert!(matches!(error, MissionError::Denied(PolicyDenial::LauncherRoot)));
    assert!(error.is_denied());
    assert_eq!(harness.state(root), AbilityState::Foreground);
    assert_eq!(
        harness.list_abilities(harness.manager.launcher_list()),
        vec![root]
    );
}

#[test]
fn functional_locked_mission_cannot_be_terminated() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.bring_up(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    harness
        .manager
        .set_mission_locked_state(harness.mission_id(a), true)
        .expect("lock");

    let error = harness
        .manager
        .terminate_ability(a, 0, None)
        .expect_err("locked mission");

    assert!(matches!(error, MissionError::Denied(PolicyDenial::MissionLocked)));
    assert!(!harness.record(a).is_terminating());
}

#[test]
fn functional_terminate_hands_foreground_to_caller_and_delivers_result() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.bring_up(page_request("com.example.mail", "InboxAbility", LaunchMode::Singleton));
    let b = harness.bring_up(
        page_request("com.example.mail", "ComposeAbility", LaunchMode::Standard).with_caller(a, 7),
    );
    let list = harness.list_of(a).expect("listed");
    let b_mission_id = harness.mission_id(b);
    harness.minimize(a);

    let reply = Want::new(ElementName::new("com.example.mail", "InboxAbility"))
        .with_param("sent", "true");
    harness
        .manager
        .terminate_ability(b, 5, Some(reply.clone()))
        .expect("terminate b");

    assert!(harness.record(b).is_terminating());
    assert_eq!(harness.manager.terminate_list(), &[b]);
    assert_eq!(harness.record(b).next_ability(), Some(a));
    assert_eq!(harness.record(a).pre_ability(), Some(b));
    assert_eq!(harness.state(a), AbilityState::Foregrounding);
    assert_eq!(harness.state(b), AbilityState::Foreground);
    let delivered = harness
        .driver
        .calls()
        .into_iter()
        .find_map(|call| match call {
            DriverCall::SendResult(caller, result) if caller == a => Some(result),
            _ => None,
        })
        .expect("result delivered to caller");
    assert_eq!(delivered.request_code, 7);
    assert_eq!(delivered.result_code, 5);
    assert_eq!(delivered.want, reply);
    assert!(harness.record(a).pending_result().is_none());

    harness.confirm(a, TransactionState::Foreground);
    assert_eq!(harness.state(b), AbilityState::Backgrounding);
    harness.confirm(b, TransactionState::Background);
    assert_eq!(harness.state(b), AbilityState::Terminating);
    assert!(harness
        .driver
        .calls()
        .contains(&DriverCall::ScheduleTerminate(b)));
    harness.confirm(b, TransactionState::Initial);

    assert!(harness.manager.record(b).is_none());
    assert!(harness.manager.terminate_list().is_empty());
    assert!(harness.driver.calls().contains(&DriverCall::Terminate(b)));
    assert_eq!(harness.list_abilities(list), vec![a]);
    assert_eq!(
        harness
            .manager
            .get_mission_info(b_mission_id)
            .expect("info kept")
            .running_state,
        MISSION_NOT_RUNNING
    );
}

#[test]
fn functional_terminating_last_mission_drops_its_list() {
    let mut harness = Harness::new();
    let root = harness.boot_launcher();
    let a = harness.bring_up(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    let list = harness.list_of(a).expect("listed");

    harness.manager.terminate_ability(a, 0, None).expect("terminate");

    assert!(harness.manager.mission_list(list).is_none());
    assert_eq!(
        harness.manager.current_mission_lists(),
        vec![harness.manager.launcher_list()]
    );
    assert_eq!(harness.record(a).next_ability(), Some(root));
    assert_eq!(harness.state(a), AbilityState::Backgrounding);

    harness.confirm(a, TransactionState::Background);
    harness.confirm(a, TransactionState::Initial);
    assert!(harness.manager.record(a).is_none());
}

#[test]
fn unit_terminate_of_never_loaded_ability_releases_immediately() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.start(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    let load_event = harness.record(a).event_id();

    harness.manager.terminate_ability(a, 0, None).expect("terminate");

    assert!(harness.manager.record(a).is_none());
    assert!(harness.driver.calls().contains(&DriverCall::Terminate(a)));
    assert!(!harness.scheduler.has_event(TimeoutKind::Load, load_event));
    assert!(harness.manager.terminate_list().is_empty());
}

#[test]
fn regression_repeat_terminate_while_foreground_forces_close() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.bring_up(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    let b = harness.bring_up(
        page_request("com.example.b", "MainAbility", LaunchMode::Standard).with_caller(a, 1),
    );
    harness.minimize(a);
    harness.manager.terminate_ability(b, 0, None).expect("first terminate");
    assert_eq!(harness.state(b), AbilityState::Foreground);

    harness.manager.terminate_ability(b, 0, None).expect("second terminate");

    assert!(harness.driver.calls().contains(&DriverCall::ForceKill(b)));
    harness.run();
    assert!(harness.manager.record(b).is_none());
}

#[test]
fn functional_terminate_by_caller_finds_started_ability() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.bring_up(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    let b = harness.bring_up(
        page_request("com.example.b", "MainAbility", LaunchMode::Standard).with_caller(a, 9),
    );

    let missing = harness
        .manager
        .terminate_ability_by_caller(a, 10)
        .expect_err("wrong request code");
    assert!(matches!(
        missing,
        MissionError::NotFoundByCaller {
            request_code: 10,
            ..
        }
    ));

    harness
        .manager
        .terminate_ability_by_caller(a, 9)
        .expect("terminate by caller");
    assert!(harness.record(b).is_terminating());
}

#[test]
fn functional_terminate_by_caller_refuses_invisible_ability() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.bring_up(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    let mut hidden = page_request("com.example.b", "HiddenAbility", LaunchMode::Standard).with_caller(a, 2);
    hidden.ability_info.visible = false;
    let b = harness.bring_up(hidden);

    let error = harness
        .manager
        .terminate_ability_by_caller(a, 2)
        .expect_err("invisible");

    assert!(matches!(error, MissionError::Denied(PolicyDenial::InvisibleAbility)));
    assert!(!harness.record(b).is_terminating());
}

#[test]
fn regression_recents_successor_redirects_to_launcher_root() {
    let mut harness = Harness::new();
    let root = harness.boot_launcher();
    let mut recents = launcher_request();
    recents.ability_info.name = harness.manager.config().launcher_recents_ability_name.clone();
    recents.want.element = ElementName::new(LAUNCHER_BUNDLE, recents.ability_info.name.clone());
    let recents_token = harness.bring_up(recents.with_caller(root, 0));
    let launcher_list = harness.manager.launcher_list();
    assert_eq!(harness.list_abilities(launcher_list), vec![recents_token, root]);

    let a = harness.bring_up(
        page_request("com.example.a", "MainAbility", LaunchMode::Singleton)
            .with_caller(recents_token, 0),
    );
    harness.manager.terminate_ability(a, 0, None).expect("terminate");

    assert_eq!(harness.record(a).next_ability(), Some(root));
    assert_eq!(harness.list_abilities(launcher_list), vec![root, recents_token]);
    assert_eq!(harness.front_list(), launcher_list);
}

#[test]
fn regression_successor_load_failure_backgrounds_departing_ability() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.bring_up(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    harness
        .manager
        .set_mission_locked_state(harness.mission_id(a), true)
        .expect("lock");
    let b = harness.bring_up(
        page_request("com.example.b", "MainAbility", LaunchMode::Standard).with_caller(a, 2),
    );
    harness.manager.on_ability_died(a, harness.manager.user_id());
    harness.run();
    assert_eq!(harness.state(a), AbilityState::Initial);

    harness.driver.set_refuse_load(true);
    harness
        .manager
        .terminate_ability(b, 0, None)
        .expect("terminate stays consistent when the successor cannot load");

    assert!(!harness.record(a).is_loading());
    assert_eq!(harness.manager.terminate_list(), &[b]);
    assert_eq!(harness.state(b), AbilityState::Backgrounding);
    assert!(harness.driver.calls().contains(&DriverCall::Background(b)));

    harness.confirm(b, TransactionState::Background);
    assert_eq!(harness.state(b), AbilityState::Terminating);
    harness.confirm(b, TransactionState::Initial);
    assert!(harness.manager.record(b).is_none());
    assert!(harness.manager.terminate_list().is_empty());
}
