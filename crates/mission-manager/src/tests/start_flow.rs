use mission_core::{AbilityToken, LaunchMode};
use mission_store::{MissionInfo, MISSION_RUNNING};

use super::{page_request, DriverCall, Harness, LAUNCHER_BUNDLE};
use crate::ability_record::{AbilityState, TransactionState};
use crate::collaborators::{TimeoutKind, SPECIFIED_TIMEOUT_TASK, START_WAITING_TASK};
use crate::error::ErrorKind;
use crate::manager::StartOutcome;
use crate::mission_list::MissionListType;

#[test]
fn functional_start_with_caller_lands_on_top_of_callers_list() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let x = harness.bring_up(page_request("com.example.mail", "InboxAbility", LaunchMode::Singleton));
    let list = harness.list_of(x).expect("x is listed");
    assert_eq!(
        harness.manager.mission_list(list).map(|entry| entry.list_type()),
        Some(MissionListType::Current)
    );

    let y = harness.start(
        page_request("com.example.mail", "ComposeAbility", LaunchMode::Standard).with_caller(x, 7),
    );

    assert_eq!(harness.list_of(y), Some(list));
    assert_eq!(harness.list_abilities(list), vec![y, x]);
    assert_eq!(harness.front_list(), list);
    assert_eq!(harness.record(y).caller(), Some(x));
    assert_eq!(harness.state(y), AbilityState::Initial);
    assert!(harness.record(y).is_loading());
    assert!(harness.driver.calls().contains(&DriverCall::Load(y)));
}

#[test]
fn functional_launcher_boot_marks_root_in_launcher_list() {
    let mut harness = Harness::new();
    let root = harness.boot_launcher();

    let launcher_list = harness.manager.launcher_list();
    assert_eq!(harness.manager.launcher_root(), Some(root));
    assert_eq!(harness.list_abilities(launcher_list), vec![root]);
    assert_eq!(harness.manager.current_mission_lists(), vec![launcher_list]);
    assert_eq!(harness.manager.current_top_ability(), Some(root));
    // The launcher mission has no persisted info.
    assert!(harness
        .store
        .all_mission_infos()
        .expect("list infos")
        .is_empty());
}

#[test]
fn unit_restarting_singleton_keeps_one_mission_and_drops_empty_list() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let request = page_request("com.example.notes", "MainAbility", LaunchMode::Singleton);
    let first = harness.bring_up(request.clone());
    let first_list = harness.list_of(first).expect("listed");
    let mission_id = harness.mission_id(first);

    let outcome = harness
        .manager
        .start_ability(request.clone())
        .expect("restart singleton");
    assert_eq!(outcome, StartOutcome::Started);

    let again = harness.token_of(&request);
    assert_eq!(again, first);
    assert_eq!(harness.mission_id(again), mission_id);
    assert!(harness.record(again).is_new_want());

    let new_list = harness.list_of(again).expect("still listed");
    assert_ne!(new_list, first_list);
    assert!(harness.manager.mission_list(first_list).is_none());
    assert_eq!(harness.front_list(), new_list);

    let lists = harness.manager.current_mission_lists();
    let holding = lists
        .iter()
        .filter(|list| harness.list_abilities(**list).contains(&first))
        .count();
    assert_eq!(holding, 1);
    assert!(lists
        .iter()
        .all(|list| !harness.list_abilities(*list).is_empty()));
}

#[test]
fn functional_standard_starts_create_distinct_missions() {
    let mut harness = Harness::new();
    let root = harness.boot_launcher();
    let request = page_request("com.example.gallery", "ViewerAbility", LaunchMode::Standard);

    let first = harness.bring_up(request.clone().with_caller(root, 0));
    let second = harness.bring_up(request.with_caller(root, 0));

    assert_ne!(first, second);
    assert_ne!(harness.mission_id(first), harness.mission_id(second));
    assert_eq!(harness.front_list(), harness.list_of(second).expect("listed"));
}

#[test]
fn functional_start_queues_while_top_is_loading_and_drains_in_order() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.start(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    assert!(harness.record(a).is_loading());

    let b = page_request("com.example.b", "MainAbility", LaunchMode::Singleton);
    let c = page_request("com.example.c", "MainAbility", LaunchMode::Singleton);
    assert_eq!(
        harness.manager.start_ability(b.clone()).expect("queue b"),
        StartOutcome::Queued
    );
    assert_eq!(
        harness.manager.start_ability(c.clone()).expect("queue c"),
        StartOutcome::Queued
    );
    let queued = harness
        .manager
        .waiting_requests()
        .map(|request| request.ability_info.bundle_name.clone())
        .collect::<Vec<_>>();
    assert_eq!(queued, vec!["com.example.b", "com.example.c"]);

    harness.attach_and_foreground(a);
    assert!(harness.scheduler.has_named_task(START_WAITING_TASK));
    harness.advance(harness.manager.config().next_ability_delay_ms);

    assert!(harness.manager.find_ability_by_element(&b.element()).is_some());
    assert!(harness.manager.find_ability_by_element(&c.element()).is_none());
    assert_eq!(harness.manager.waiting_requests().count(), 1);
    let b_token = harness.token_of(&b);
    assert_eq!(harness.manager.current_top_ability(), Some(b_token));
}

#[test]
fn functional_specified_request_is_served_before_earlier_waiting_requests() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let a = harness.start(page_request("com.example.a", "MainAbility", LaunchMode::Singleton));
    let queued = page_request("com.example.b", "MainAbility", LaunchMode::Singleton);
    harness.manager.start_ability(queued.clone()).expect("queue b");
    harness.attach_and_foreground(a);
    // The drain is deferred; the specified request arrives first.
    let specified = page_request("com.example.docs", "EditorAbility", LaunchMode::Specified);
    let outcome = harness
        .manager
        .start_ability(specified.clone())
        .expect("specified start");
    assert_eq!(outcome, StartOutcome::PendingSpecified);
    assert!(harness.manager.is_specified_pending());
    assert!(harness.scheduler.has_named_task(SPECIFIED_TIMEOUT_TASK));
    assert!(harness
        .driver
        .calls()
        .contains(&DriverCall::StartSpecified(specified.element())));
    let order = harness
        .manager
        .waiting_requests()
        .map(|request| request.ability_info.bundle_name.clone())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["com.example.docs", "com.example.b"]);

    // The drain must not overtake the pending resolution.
    harness.advance(harness.manager.config().next_ability_delay_ms);
    assert!(harness.manager.find_ability_by_element(&queued.element()).is_none());

    harness
        .manager
        .on_accept_want_response("doc-1")
        .expect("accept want");
    harness.run();
    let docs = harness.token_of(&specified);
    assert_eq!(harness.record(docs).specified_flag(), Some("doc-1"));
    assert!(!harness.manager.is_specified_pending());
    assert!(!harness.scheduler.has_named_task(SPECIFIED_TIMEOUT_TASK));
    assert_eq!(harness.manager.waiting_requests().count(), 1);
}

#[test]
fn functional_specified_response_reuses_mission_with_matching_flag() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let specified = page_request("com.example.docs", "EditorAbility", LaunchMode::Specified);
    harness
        .manager
        .start_ability(specified.clone())
        .expect("first specified");
    harness
        .manager
        .on_accept_want_response("doc-1")
        .expect("first accept");
    let docs = harness.token_of(&specified);
    harness.attach_and_foreground(docs);
    let mission_id = harness.mission_id(docs);

    harness
        .manager
        .start_ability(specified.clone())
        .expect("second specified");
    harness
        .manager
        .on_accept_want_response("doc-1")
        .expect("second accept");

    assert_eq!(harness.token_of(&specified), docs);
    assert_eq!(harness.mission_id(docs), mission_id);
    assert!(harness.record(docs).is_new_want());
    assert_eq!(harness.state(docs), AbilityState::Foregrounding);
}

#[test]
fn regression_specified_timeout_drops_pending_request_and_resumes_queue() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let specified = page_request("com.example.docs", "EditorAbility", LaunchMode::Specified);
    harness
        .manager
        .start_ability(specified.clone())
        .expect("specified start");
    assert_eq!(harness.manager.waiting_requests().count(), 1);

    harness.advance(harness.manager.config().specified_timeout_ms);

    assert!(!harness.manager.is_specified_pending());
    assert_eq!(harness.manager.waiting_requests().count(), 0);
    assert!(harness.manager.find_ability_by_element(&specified.element()).is_none());
}

#[test]
fn functional_promoting_mission_from_launcher_demotes_missions_above_by_launch_mode() {
    let mut harness = Harness::new();
    let root = harness.boot_launcher();
    let a = harness.bring_up(
        page_request("com.example.a", "MainAbility", LaunchMode::Standard).with_caller(root, 0),
    );
    let b = harness.bring_up(
        page_request("com.example.b", "MainAbility", LaunchMode::Standard).with_caller(a, 0),
    );
    let c = harness.bring_up(
        page_request("com.example.c", "MainAbility", LaunchMode::Singleton).with_caller(b, 0),
    );
    let list = harness.list_of(a).expect("listed");
    assert_eq!(harness.list_abilities(list), vec![c, b, a]);

    harness
        .manager
        .move_mission_to_front(harness.mission_id(a), None)
        .expect("move a to front");

    assert_eq!(harness.list_abilities(list), vec![a]);
    assert_eq!(
        harness.list_of(c),
        Some(harness.manager.default_single_list())
    );
    assert_eq!(
        harness.list_of(b),
        Some(harness.manager.default_standard_list())
    );
    assert_eq!(harness.front_list(), list);
}

#[test]
fn functional_caller_in_default_list_is_promoted_into_fresh_list() {
    let mut harness = Harness::new();
    let root = harness.boot_launcher();
    let a = harness.bring_up(
        page_request("com.example.a", "MainAbility", LaunchMode::Standard).with_caller(root, 0),
    );
    let b = harness.bring_up(
        page_request("com.example.b", "MainAbility", LaunchMode::Standard).with_caller(a, 0),
    );
    harness
        .manager
        .move_mission_to_front(harness.mission_id(a), None)
        .expect("move a to front");
    harness.confirm(a, TransactionState::Foreground);
    let default_standard = harness.manager.default_standard_list();
    assert_eq!(harness.list_of(b), Some(default_standard));

    let d = harness.start(
        page_request("com.example.d", "MainAbility", LaunchMode::Standard).with_caller(b, 3),
    );

    let fresh = harness.list_of(d).expect("d listed");
    assert_eq!(harness.list_abilities(fresh), vec![d, b]);
    assert_eq!(
        harness.manager.mission_list(fresh).map(|list| list.list_type()),
        Some(MissionListType::Current)
    );
    assert!(harness.list_abilities(default_standard).is_empty());
    assert_eq!(harness.front_list(), fresh);
}

#[test]
fn integration_singleton_start_reuses_persisted_mission_id() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let request = page_request("com.example.notes", "MainAbility", LaunchMode::Singleton);
    harness
        .store
        .add_mission_info(MissionInfo {
            id: 42,
            mission_name: request.mission_name(),
            is_singleton: true,
            label: "Notes".to_string(),
            icon_path: String::new(),
            running_state: -1,
            locked: true,
            continuable: false,
            updated_unix_ms: 1,
            want: request.want.clone(),
            ability_info: request.ability_info.clone(),
            app_info: request.app_info.clone(),
            specified_flag: None,
        })
        .expect("seed info");

    let token = harness.start(request);

    assert_eq!(harness.mission_id(token), 42);
    let info = harness
        .manager
        .get_mission_info(42)
        .expect("persisted info");
    assert_eq!(info.running_state, MISSION_RUNNING);
    assert_eq!(info.label, "Notes");
    assert!(info.locked);
    let mission = harness.record(token).mission().expect("mission");
    assert!(harness
        .manager
        .mission(mission)
        .is_some_and(|mission| mission.is_locked()));
}

#[test]
fn regression_stale_caller_token_starts_without_caller() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let token = harness.start(
        page_request("com.example.a", "MainAbility", LaunchMode::Standard)
            .with_caller(AbilityToken::new(999, 4), 1),
    );

    assert!(harness.record(token).callers().is_empty());
    assert_eq!(harness.front_list(), harness.list_of(token).expect("listed"));
}

#[test]
fn regression_driver_refusing_load_surfaces_remote_failure() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    harness.driver.set_refuse_load(true);
    let request = page_request("com.example.a", "MainAbility", LaunchMode::Singleton);

    let error = harness
        .manager
        .start_ability(request.clone())
        .expect_err("load refused");

    assert_eq!(error.kind(), ErrorKind::RemoteFailure);
    let token = harness.token_of(&request);
    assert!(!harness.record(token).is_loading());
    let event_id = harness.record(token).event_id();
    assert!(!harness.scheduler.has_event(TimeoutKind::Load, event_id));
}

#[test]
fn regression_launcher_singleton_search_continues_past_launcher_list() {
    let mut harness = Harness::new();
    harness.boot_launcher();
    let settings = harness.bring_up(page_request(
        LAUNCHER_BUNDLE,
        "SettingsAbility",
        LaunchMode::Singleton,
    ));
    let mission_id = harness.mission_id(settings);
    assert_ne!(
        harness.list_of(settings),
        Some(harness.manager.launcher_list())
    );

    let mut request = page_request(LAUNCHER_BUNDLE, "SettingsAbility", LaunchMode::Singleton);
    request.app_info.is_launcher_app = true;
    let outcome = harness.manager.start_ability(request).expect("start");

    assert_eq!(outcome, StartOutcome::Started);
    assert!(harness.record(settings).is_new_want());
    assert_eq!(harness.mission_id(settings), mission_id);
    assert_eq!(
        harness.list_of(settings),
        Some(harness.manager.launcher_list())
    );
}
