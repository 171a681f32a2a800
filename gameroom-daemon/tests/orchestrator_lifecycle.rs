mod common;

use std::collections::BTreeSet;
use std::sync::Mutex;

use gameroom_core::{OrchestratorError, RoomId, StopOutcome};
use rstest::rstest;

use common::{orchestrator, FakeProbe, FakeRuntime};

fn active_ports(orch: &gameroom_daemon::Orchestrator) -> Vec<u16> {
    let mut ports: Vec<u16> = orch.list_rooms().iter().map(|room| room.port).collect();
    ports.sort_unstable();
    ports
}

#[test]
fn reservations_track_active_rooms() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);

    let a = orch.create_room().unwrap();
    let b = orch.create_room().unwrap();
    let c = orch.create_room().unwrap();
    assert_eq!(orch.status().reserved_ports, active_ports(&orch));

    orch.delete_room(&b.room_id).unwrap();
    assert_eq!(orch.status().reserved_ports, active_ports(&orch));
    assert_eq!(orch.status().reserved_ports, vec![a.port, c.port]);

    orch.delete_room(&a.room_id).unwrap();
    orch.delete_room(&c.room_id).unwrap();
    assert!(orch.status().reserved_ports.is_empty());
    assert!(runtime.live_names().is_empty());
}

#[test]
fn room_endpoint_uses_public_host_and_port() {
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &FakeRuntime::default());
    let room = orch.create_room().unwrap();
    assert_eq!(room.port, 8000);
    assert_eq!(room.endpoint, "ws://localhost:8000");
    assert_eq!(room.room_id.as_str().len(), RoomId::LEN);
}

#[test]
fn released_port_is_handed_out_again() {
    let orch = orchestrator(8000, 8001, &FakeProbe::default(), &FakeRuntime::default());

    let a = orch.create_room().unwrap();
    let b = orch.create_room().unwrap();
    assert_eq!((a.port, b.port), (8000, 8001));

    orch.delete_room(&a.room_id).unwrap();
    let c = orch.create_room().unwrap();
    assert_eq!(c.port, 8000);
}

#[test]
fn exhausted_range_leaves_state_untouched() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8001, &FakeProbe::default(), &runtime);
    orch.create_room().unwrap();
    orch.create_room().unwrap();
    let before = orch.status();

    let err = orch.create_room().unwrap_err();
    assert!(
        matches!(err, OrchestratorError::NoPortsAvailable { base: 8000, max: 8001 }),
        "got: {err}"
    );
    assert_eq!(err.kind(), "no_ports_available");
    assert_eq!(orch.status(), before);
    assert_eq!(runtime.live_names().len(), 2);
}

#[test]
fn ports_held_elsewhere_are_skipped() {
    let probe = FakeProbe::with_busy(&[8000]);
    let orch = orchestrator(8000, 8002, &probe, &FakeRuntime::default());

    let room = orch.create_room().unwrap();
    assert_eq!(room.port, 8001);
    assert!(orch.status().reserved_ports.contains(&8000));
}

#[test]
fn get_returns_summary_for_known_id() {
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &FakeRuntime::default())
        .with_id_source(Box::new(|| RoomId::from("ab12cd34")));

    let created = orch.create_room().unwrap();
    let fetched = orch.get_room(&RoomId::from("ab12cd34")).unwrap();
    assert_eq!(fetched.room_id, created.room_id);
    assert_eq!(fetched.port, created.port);
    assert_eq!(fetched.endpoint, "ws://localhost:8000");

    let err = orch.get_room(&RoomId::from("zzzz0000")).unwrap_err();
    assert!(matches!(err, OrchestratorError::RoomNotFound(ref id) if id.as_str() == "zzzz0000"));
}

#[test]
fn second_delete_reports_not_found() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);
    let room = orch.create_room().unwrap();

    assert_eq!(orch.delete_room(&room.room_id).unwrap(), StopOutcome::Graceful);
    let err = orch.delete_room(&room.room_id).unwrap_err();
    assert_eq!(err.kind(), "room_not_found");
    assert_eq!(runtime.stops().len(), 1, "second delete must not touch the runtime");
}

#[test]
fn unstoppable_worker_still_frees_room() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime)
        .with_id_source(Box::new(|| RoomId::from("feedf00d")));
    let room = orch.create_room().unwrap();
    let id = runtime.id_of("game-room-feedf00d").unwrap();
    runtime.state.lock().unwrap().stubborn.insert(id);

    let outcome = orch.delete_room(&room.room_id).unwrap();
    assert!(matches!(outcome, StopOutcome::Failed { .. }));
    assert!(orch.list_rooms().is_empty());
    assert!(orch.status().reserved_ports.is_empty());
}

#[test]
fn failed_liveness_check_returns_port() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime)
        .with_id_source(Box::new(|| RoomId::from("deadbeef")));
    runtime
        .state
        .lock()
        .unwrap()
        .invisible
        .insert("game-room-deadbeef".to_string());

    let err = orch.create_room().unwrap_err();
    assert_eq!(err.kind(), "launch_failed");
    assert!(orch.list_rooms().is_empty());
    assert!(orch.status().reserved_ports.is_empty());
    assert!(
        runtime.stops().iter().any(|call| call.starts_with("stop ")),
        "worker that failed verification is stopped"
    );

    runtime.state.lock().unwrap().invisible.clear();
    let room = orch.create_room().unwrap();
    assert_eq!(room.port, 8000);
}

#[test]
fn failed_start_command_returns_port() {
    let runtime = FakeRuntime::default();
    runtime.state.lock().unwrap().fail_runs = true;
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);

    let err = orch.create_room().unwrap_err();
    assert!(matches!(err, OrchestratorError::LaunchFailed { .. }));
    assert!(err.to_string().contains("Cannot connect"));
    assert!(orch.status().reserved_ports.is_empty());
}

#[test]
fn concurrent_creates_get_distinct_ports() {
    let orch = orchestrator(8000, 8100, &FakeProbe::default(), &FakeRuntime::default());
    let ports = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..12 {
            scope.spawn(|| {
                let room = orch.create_room().unwrap();
                ports.lock().unwrap().push(room.port);
            });
        }
    });

    let ports = ports.into_inner().unwrap();
    let distinct: BTreeSet<_> = ports.iter().copied().collect();
    assert_eq!(distinct.len(), 12);
    assert_eq!(orch.list_rooms().len(), 12);
    assert_eq!(orch.status().reserved_ports, distinct.into_iter().collect::<Vec<_>>());
}

#[test]
fn overlapping_deletes_of_one_room_stop_it_once() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);
    let room = orch.create_room().unwrap();
    let gate = runtime.gate_next("stop");

    std::thread::scope(|scope| {
        let first = scope.spawn(|| orch.delete_room(&room.room_id));
        gate.wait_entered();

        for _ in 0..3 {
            let err = orch.delete_room(&room.room_id).unwrap_err();
            assert_eq!(err.kind(), "room_not_found");
        }
        assert!(
            orch.get_room(&room.room_id).is_ok(),
            "room stays visible while its stop runs"
        );
        assert_eq!(orch.status().reserved_ports, vec![room.port]);

        gate.open();
        assert_eq!(first.join().unwrap().unwrap(), StopOutcome::Graceful);
    });

    assert_eq!(runtime.stops().len(), 1);
    assert!(orch.list_rooms().is_empty());
    assert!(orch.status().reserved_ports.is_empty());
}

#[test]
fn create_in_flight_during_shutdown_is_cleaned_up() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);
    let gate = runtime.gate_next("run");

    let (created, report) = std::thread::scope(|scope| {
        let creator = scope.spawn(|| orch.create_room());
        gate.wait_entered();

        let sweeper = scope.spawn(|| orch.shutdown_all());
        while !orch.status().closing {
            std::thread::yield_now();
        }
        assert_eq!(
            orch.create_room().unwrap_err().kind(),
            "shutting_down",
            "no new creates once the sweep has started"
        );

        gate.open();
        (creator.join().unwrap(), sweeper.join().unwrap())
    });

    let err = created.unwrap_err();
    assert!(matches!(err, OrchestratorError::ShuttingDown), "got: {err}");
    assert_eq!(report.rooms_cleared, 0);
    assert_eq!(report.ports_released, 0);

    let status = orch.status();
    assert_eq!(status.rooms, 0);
    assert!(status.reserved_ports.is_empty());
    assert!(runtime.live_names().is_empty(), "late worker must be stopped");
    assert_eq!(orch.create_room().unwrap_err().kind(), "shutting_down");
}

#[test]
fn delete_overlapping_shutdown_reports_its_stop() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);
    let room = orch.create_room().unwrap();
    let gate = runtime.gate_next("stop");

    let deleted = std::thread::scope(|scope| {
        let deleter = scope.spawn(|| orch.delete_room(&room.room_id));
        gate.wait_entered();

        let report = orch.shutdown_all();
        assert_eq!(report.rooms_cleared, 1);
        assert_eq!(report.stopped.len(), 1);

        gate.open();
        deleter.join().unwrap()
    });

    assert!(deleted.is_ok(), "got: {deleted:?}");
    assert!(orch.list_rooms().is_empty());
    assert!(orch.status().reserved_ports.is_empty());
}

#[rstest]
#[case::all_stop(&[], 3, 0)]
#[case::one_refuses(&["game-room-room0002"], 2, 1)]
fn shutdown_clears_everything(
    #[case] stubborn: &[&str],
    #[case] stopped: usize,
    #[case] failed: usize,
) {
    let runtime = FakeRuntime::default();
    let counter = Mutex::new(0);
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime).with_id_source(Box::new(
        move || {
            let mut n = counter.lock().unwrap();
            *n += 1;
            RoomId::from(format!("room{:04}", *n))
        },
    ));
    for _ in 0..3 {
        orch.create_room().unwrap();
    }
    for name in stubborn {
        let id = runtime.id_of(name).unwrap();
        runtime.state.lock().unwrap().stubborn.insert(id);
    }

    let report = orch.shutdown_all();
    assert_eq!(report.stopped.len(), stopped);
    assert_eq!(report.failed.len(), failed);
    assert_eq!(report.rooms_cleared, 3);
    assert_eq!(report.ports_released, 3);
    assert!(report.listing_error.is_none());

    assert!(orch.list_rooms().is_empty());
    assert!(orch.status().reserved_ports.is_empty());
}

#[test]
fn shutdown_stops_orphans_from_listing() {
    let runtime = FakeRuntime::default();
    runtime.add_orphan("game-room-0ld0ld00");
    runtime.add_orphan("unrelated-db");
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);
    orch.create_room().unwrap();

    let report = orch.shutdown_all();
    assert_eq!(report.stopped.len(), 2);
    assert_eq!(report.rooms_cleared, 1);
    assert_eq!(runtime.live_names(), vec!["unrelated-db".to_string()]);
}

#[test]
fn shutdown_survives_listing_failure() {
    let runtime = FakeRuntime::default();
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &runtime);
    orch.create_room().unwrap();
    orch.create_room().unwrap();
    runtime.state.lock().unwrap().fail_listing = true;

    let report = orch.shutdown_all();
    assert!(report.listing_error.is_some());
    assert_eq!(report.stopped.len(), 2, "registered rooms are still stopped");
    assert!(runtime.live_names().is_empty());
    assert!(orch.list_rooms().is_empty());
}

#[test]
fn shutdown_with_nothing_running_is_a_no_op() {
    let orch = orchestrator(8000, 8010, &FakeProbe::default(), &FakeRuntime::default());
    let report = orch.shutdown_all();
    assert!(report.stopped.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.rooms_cleared, 0);
}
