#![allow(clippy::unwrap_used)]
// Integration tests for `Coordinator` against the simulated device.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use htlink_core::{
    Catalog, Choice, Coordinator, CoordinatorConfig, CoreError, DataKind, ParamValue,
    ParameterDescriptor, QueryClass, Validity, WriteRejection,
};
use htlink_proto::Register;
use htlink_proto::sim::{SimDevice, SimServer};
use pretty_assertions::assert_eq;

// ── Helpers ─────────────────────────────────────────────────────────

const TIMEOUT: Duration = Duration::from_millis(500);
const TENTHS: DataKind = DataKind::Float { scale: 1 };

fn catalog() -> Arc<Catalog> {
    let descriptors = [
        ParameterDescriptor::new("OutdoorTemp", "Outdoor temperature", QueryClass::Bulk, 0, TENTHS)
            .with_unit("°C"),
        ParameterDescriptor::new("FlowTemp", "Flow temperature", QueryClass::Bulk, 3, TENTHS)
            .with_unit("°C"),
        ParameterDescriptor::new("Compressor", "Compressor", QueryClass::Bulk, 16, DataKind::Bool),
        ParameterDescriptor::new("RoomSetpoint", "Room setpoint", QueryClass::Individual, 69, TENTHS)
            .read_write()
            .with_range(10.0, 25.0, Some(0.5))
            .with_unit("°C"),
        ParameterDescriptor::new("OperatingMode", "Operating mode", QueryClass::Individual, 13, DataKind::Enum)
            .read_write()
            .with_choices([(0, "off"), (1, "heating"), (2, "cooling")]),
    ];
    Arc::new(Catalog::from_descriptors(descriptors).unwrap())
}

fn device() -> SimDevice {
    SimDevice::new()
        .with_register(Register::mp(0), 75)
        .with_register(Register::mp(3), 352)
        .with_register(Register::mp(16), 1)
        .with_register(Register::sp(69), 210)
        .with_register(Register::sp(13), 1)
}

fn config_for(server: &SimServer, selected: &[&str]) -> CoordinatorConfig {
    let addr = server.addr();
    CoordinatorConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        timeout: TIMEOUT,
        write_enabled: true,
        ..CoordinatorConfig::default()
    }
    .with_selected(selected.iter().copied())
}

async fn setup(device: &SimDevice, selected: &[&str]) -> (SimServer, Coordinator) {
    let server = device.serve().await.unwrap();
    let coordinator = Coordinator::with_catalog(config_for(&server, selected), catalog());
    (server, coordinator)
}

const ALL: &[&str] = &[
    "OutdoorTemp",
    "FlowTemp",
    "Compressor",
    "RoomSetpoint",
    "OperatingMode",
];

fn dead_port_config(selected: &[&str]) -> CoordinatorConfig {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    CoordinatorConfig {
        host: "127.0.0.1".into(),
        port,
        timeout: TIMEOUT,
        ..CoordinatorConfig::default()
    }
    .with_selected(selected.iter().copied())
}

// ── Polling cycles ──────────────────────────────────────────────────

#[tokio::test]
async fn test_cycle_publishes_values_and_out_of_range_write_never_reaches_device() {
    let device = device();
    let (_server, coordinator) = setup(&device, &["OutdoorTemp", "RoomSetpoint"]).await;

    let snapshot = coordinator.refresh().await.unwrap();
    assert_eq!(snapshot.cycle, 1);
    assert_eq!(snapshot.fresh_value("OutdoorTemp"), Some(&ParamValue::Float(7.5)));
    assert_eq!(snapshot.fresh_value("RoomSetpoint"), Some(&ParamValue::Float(21.0)));
    assert_eq!(snapshot.fresh_count(), 2);

    coordinator.set_writes_enabled(true).unwrap();
    let requests = device.requests();
    let connections = device.connections();

    let err = coordinator
        .request_write("RoomSetpoint", ParamValue::Float(30.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Rejected(WriteRejection::OutOfRange { ref id, .. }) if id == "RoomSetpoint"
    ));
    assert_eq!(device.requests(), requests);
    assert_eq!(device.connections(), connections);

    // The dry run rejects it too, with or without the flag.
    coordinator.set_writes_enabled(false).unwrap();
    assert!(matches!(
        coordinator.validate_write("RoomSetpoint", &ParamValue::Float(30.0)),
        Err(WriteRejection::OutOfRange { .. })
    ));
}

#[tokio::test]
async fn test_snapshot_covers_exactly_the_known_selection() {
    let device = device();
    let (_server, coordinator) =
        setup(&device, &["RoomSetpoint", "NoSuchParam", "OutdoorTemp", "RoomSetpoint"]).await;

    assert_eq!(coordinator.selected(), vec!["RoomSetpoint", "OutdoorTemp"]);

    let snapshot = coordinator.refresh().await.unwrap();
    let keys: Vec<&str> = snapshot.entries.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["OutdoorTemp", "RoomSetpoint"]);
}

#[tokio::test]
async fn test_values_are_decoded_per_descriptor() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;

    let snapshot = coordinator.refresh().await.unwrap();
    assert_eq!(snapshot.fresh_value("FlowTemp"), Some(&ParamValue::Float(35.2)));
    assert_eq!(snapshot.fresh_value("Compressor"), Some(&ParamValue::Bool(true)));
    assert_eq!(
        snapshot.fresh_value("OperatingMode"),
        Some(&ParamValue::Choice(Choice {
            value: 1,
            label: "heating".into()
        }))
    );
}

#[tokio::test]
async fn test_every_cycle_logs_in_and_out_on_its_own_connection() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;

    coordinator.refresh().await.unwrap();
    coordinator.refresh().await.unwrap();

    assert_eq!(device.connections(), 2);
    assert_eq!(device.logins(), 2);
    assert_eq!(device.logouts(), 2);
    assert_eq!(coordinator.snapshot().cycle, 2);
}

#[tokio::test]
async fn test_bulk_omission_marks_entry_not_reported_and_keeps_last_value() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;

    let first = coordinator.refresh().await.unwrap();
    let first_ts = first.get("FlowTemp").unwrap().timestamp;

    device.omit_from_bulk(3);
    let second = coordinator.refresh().await.unwrap();

    let entry = second.get("FlowTemp").unwrap();
    assert_eq!(entry.validity, Validity::NotReported);
    assert_eq!(entry.value, Some(ParamValue::Float(35.2)));
    assert_eq!(entry.timestamp, first_ts);
    assert!(second.is_valid("OutdoorTemp"));
    assert!(second.is_valid("RoomSetpoint"));
}

#[tokio::test]
async fn test_rejected_bulk_read_falls_back_to_single_reads() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;

    device.fail_bulk(Some("7"));
    let snapshot = coordinator.refresh().await.unwrap();

    assert_eq!(snapshot.fresh_count(), ALL.len());
    assert_eq!(snapshot.fresh_value("OutdoorTemp"), Some(&ParamValue::Float(7.5)));
    let log = device.request_log();
    assert!(log.iter().any(|r| r == "MP,NR=0;"));
    assert!(log.iter().any(|r| r.starts_with("MR,")));
}

#[tokio::test]
async fn test_failed_individual_read_only_invalidates_that_entry() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;
    coordinator.refresh().await.unwrap();

    device.fail_register(Register::sp(69), "9");
    let snapshot = coordinator.refresh().await.unwrap();

    let entry = snapshot.get("RoomSetpoint").unwrap();
    assert_eq!(entry.validity, Validity::ReadFailed);
    assert_eq!(entry.value, Some(ParamValue::Float(21.0)));
    assert!(snapshot.is_valid("OutdoorTemp"));
    assert!(snapshot.is_valid("OperatingMode"));
    assert_eq!(coordinator.failing_parameters(), vec!["RoomSetpoint"]);
    assert!(coordinator.health().available);

    device.clear_fault(Register::sp(69));
    coordinator.refresh().await.unwrap();
    assert!(coordinator.failing_parameters().is_empty());
}

#[tokio::test]
async fn test_failed_bulk_group_keeps_individual_reads_fresh() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;
    let first = coordinator.refresh().await.unwrap();

    device.fail_bulk(Some("7"));
    for number in [0, 3, 16] {
        device.fail_register(Register::mp(number), "5");
    }
    let second = coordinator.refresh().await.unwrap();

    for id in ["OutdoorTemp", "FlowTemp", "Compressor"] {
        let before = first.get(id).unwrap();
        let after = second.get(id).unwrap();
        assert_eq!(after.validity, Validity::ReadFailed, "{id}");
        assert_eq!(after.value, before.value, "{id}");
        assert_eq!(after.timestamp, before.timestamp, "{id}");
    }
    for id in ["RoomSetpoint", "OperatingMode"] {
        let after = second.get(id).unwrap();
        assert_eq!(after.validity, Validity::Fresh, "{id}");
        assert!(after.timestamp > first.get(id).unwrap().timestamp, "{id}");
    }
    assert_eq!(second.cycle, 2);
    assert!(coordinator.health().available);
}

#[tokio::test]
async fn test_corrupted_response_aborts_cycle_without_publishing() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;
    coordinator.refresh().await.unwrap();

    device.garble_register(Register::sp(69));
    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, CoreError::Protocol { .. }), "got {err:?}");

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.cycle, 1);
    assert!(snapshot.is_valid("RoomSetpoint"));
    assert_eq!(coordinator.health().consecutive_failures, 1);
}

#[tokio::test]
async fn test_timeout_mid_cycle_keeps_previous_snapshot() {
    let device = device();
    let server = device.serve().await.unwrap();
    let config = CoordinatorConfig {
        timeout: Duration::from_millis(100),
        ..config_for(&server, ALL)
    };
    let coordinator = Coordinator::with_catalog(config, catalog());
    let published = coordinator.refresh().await.unwrap();

    // Login answers within the timeout; every later request does not.
    device.set_latency(Duration::from_millis(60));
    let (result, ()) = tokio::join!(coordinator.refresh(), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        device.set_latency(Duration::from_millis(300));
    });

    let err = result.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { .. }), "got {err:?}");
    assert_eq!(device.logins(), 2);
    assert!(Arc::ptr_eq(&coordinator.snapshot(), &published));
    let health = coordinator.health();
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.available);
}

#[tokio::test]
async fn test_unreachable_device_keeps_snapshot_and_flips_availability_at_threshold() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;
    let published = coordinator.refresh().await.unwrap();

    coordinator.reconfigure(dead_port_config(ALL)).await;

    let err = coordinator.refresh().await.unwrap_err();
    assert!(err.is_connection_error(), "got {err:?}");
    assert!(coordinator.health().available);

    coordinator.refresh().await.unwrap_err();
    let health = coordinator.health();
    assert!(!health.available);
    assert_eq!(health.consecutive_failures, 2);
    assert!(health.last_error.is_some());

    assert!(Arc::ptr_eq(&coordinator.snapshot(), &published));
}

#[tokio::test]
async fn test_rejected_login_is_reported_as_auth_failure() {
    let device = device();
    device.reject_login(true);
    let (_server, coordinator) = setup(&device, ALL).await;

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, CoreError::AuthFailed { .. }), "got {err:?}");
    assert_eq!(coordinator.snapshot().cycle, 0);
    assert!(coordinator.snapshot().is_empty());
}

#[tokio::test]
async fn test_overlapping_refresh_is_skipped() {
    let device = device();
    device.set_latency(Duration::from_millis(40));
    let (_server, coordinator) = setup(&device, ALL).await;

    let (first, second) = tokio::join!(coordinator.refresh(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.refresh().await
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(CoreError::CycleInProgress)));
    assert_eq!(device.logins(), 1);
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_writes_are_blocked_until_confirmed() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;
    assert!(!coordinator.writes_enabled());

    let err = coordinator
        .request_write("RoomSetpoint", ParamValue::Float(21.5))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Rejected(WriteRejection::WriteBlocked)));
    assert_eq!(device.connections(), 0);

    coordinator.set_writes_enabled(true).unwrap();
    let applied = coordinator
        .request_write("RoomSetpoint", ParamValue::Float(21.5))
        .await
        .unwrap();
    assert_eq!(applied, ParamValue::Float(21.5));
    assert_eq!(device.register(Register::sp(69)), Some(215));
    assert_eq!(device.writes(), 1);
    assert_eq!(device.logouts(), 1);

    // The write does not touch the published snapshot.
    assert_eq!(coordinator.snapshot().cycle, 0);
}

#[tokio::test]
async fn test_out_of_range_value_is_reported_as_blocked_until_writes_are_enabled() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;
    let too_cold = ParamValue::Float(5.0);

    let err = coordinator
        .request_write("RoomSetpoint", too_cold.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Rejected(WriteRejection::WriteBlocked)));
    assert!(matches!(
        coordinator.validate_write("RoomSetpoint", &too_cold),
        Err(WriteRejection::OutOfRange { .. })
    ));
    assert_eq!(device.connections(), 0);
}

#[tokio::test]
async fn test_rejections_are_checked_in_order_before_any_io() {
    let device = device();
    let (_server, coordinator) = setup(&device, ALL).await;
    coordinator.set_writes_enabled(true).unwrap();

    let unknown = coordinator
        .request_write("NoSuchParam", ParamValue::Int(1))
        .await
        .unwrap_err();
    assert!(matches!(
        unknown,
        CoreError::Rejected(WriteRejection::UnknownParameter { .. })
    ));

    let read_only = coordinator
        .request_write("OutdoorTemp", ParamValue::Float(5.0))
        .await
        .unwrap_err();
    assert!(matches!(
        read_only,
        CoreError::Rejected(WriteRejection::NotWritable { .. })
    ));

    let bad_choice = coordinator
        .request_write("OperatingMode", ParamValue::Int(9))
        .await
        .unwrap_err();
    assert!(matches!(
        bad_choice,
        CoreError::Rejected(WriteRejection::OutOfRange { .. })
    ));

    assert_eq!(device.connections(), 0);
}

#[tokio::test]
async fn test_write_returns_value_confirmed_by_device() {
    let device = device();
    device.clamp_writes(Register::sp(69), 100, 240);
    let (_server, coordinator) = setup(&device, ALL).await;
    coordinator.set_writes_enabled(true).unwrap();

    let applied = coordinator
        .request_write("RoomSetpoint", ParamValue::Float(25.0))
        .await
        .unwrap();
    assert_eq!(applied, ParamValue::Float(24.0));

    let mode = coordinator
        .request_write("OperatingMode", ParamValue::Int(2))
        .await
        .unwrap();
    assert_eq!(
        mode,
        ParamValue::Choice(Choice {
            value: 2,
            label: "cooling".into()
        })
    );
}

#[tokio::test]
async fn test_writes_and_cycles_never_overlap_on_the_wire() {
    let device = device();
    device.set_latency(Duration::from_millis(15));
    let (_server, coordinator) = setup(&device, ALL).await;
    coordinator.set_writes_enabled(true).unwrap();

    let (cycle, first, second) = tokio::join!(
        coordinator.refresh(),
        coordinator.request_write("RoomSetpoint", ParamValue::Float(20.0)),
        coordinator.request_write("OperatingMode", ParamValue::Int(0)),
    );

    cycle.unwrap();
    first.unwrap();
    second.unwrap();
    assert_eq!(device.max_in_flight(), 1);
    assert_eq!(device.logins(), 3);
    assert_eq!(device.logouts(), 3);
}

#[tokio::test]
async fn test_disabling_writes_cancels_queued_write_and_clock_set() {
    let device = device();
    device.set_latency(Duration::from_millis(80));
    let (_server, coordinator) = setup(&device, ALL).await;
    coordinator.set_writes_enabled(true).unwrap();
    let target = NaiveDate::from_ymd_opt(2024, 3, 17)
        .unwrap()
        .and_hms_opt(22, 15, 5)
        .unwrap();

    // Both requests pass the gate and then wait for the running cycle.
    let (cycle, write, clock, ()) = tokio::join!(
        coordinator.refresh(),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coordinator
                .request_write("RoomSetpoint", ParamValue::Float(12.0))
                .await
        },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coordinator.set_device_time(Some(target)).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            coordinator.set_writes_enabled(false).unwrap();
        },
    );

    cycle.unwrap();
    assert!(matches!(
        write,
        Err(CoreError::Rejected(WriteRejection::WriteBlocked))
    ));
    assert!(matches!(
        clock,
        Err(CoreError::Rejected(WriteRejection::WriteBlocked))
    ));
    assert_eq!(device.writes(), 0);
    assert_eq!(device.register(Register::sp(69)), Some(210));
    assert_eq!(device.logins(), 1);
}

#[tokio::test]
async fn test_enabling_writes_requires_permission() {
    let device = device();
    let server = device.serve().await.unwrap();
    let config = CoordinatorConfig {
        write_enabled: false,
        ..config_for(&server, ALL)
    };
    let coordinator = Coordinator::with_catalog(config, catalog());

    let err = coordinator.set_writes_enabled(true).unwrap_err();
    assert!(matches!(err, CoreError::WritesNotPermitted));
    assert!(!coordinator.writes_enabled());
    // Disabling is always allowed.
    coordinator.set_writes_enabled(false).unwrap();
}

#[tokio::test]
async fn test_reconfigure_resets_write_confirmation() {
    let device = device();
    let (server, coordinator) = setup(&device, ALL).await;
    coordinator.set_writes_enabled(true).unwrap();

    coordinator
        .reconfigure(config_for(&server, &["OutdoorTemp"]))
        .await;

    assert!(!coordinator.writes_enabled());
    assert!(coordinator.writes_permitted());
    assert_eq!(coordinator.selected(), vec!["OutdoorTemp"]);

    let snapshot = coordinator.refresh().await.unwrap();
    assert_eq!(snapshot.len(), 1);
}

// ── Device clock ────────────────────────────────────────────────────

#[tokio::test]
async fn test_device_clock_read_and_gated_set() {
    let device = device();
    let initial = NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();
    device.set_clock(initial);
    let (_server, coordinator) = setup(&device, ALL).await;

    let clock = coordinator.device_time().await.unwrap();
    assert_eq!(clock.datetime, initial);
    assert_eq!(clock.weekday, 5);

    let target = NaiveDate::from_ymd_opt(2024, 3, 17)
        .unwrap()
        .and_hms_opt(22, 15, 5)
        .unwrap();
    let err = coordinator.set_device_time(Some(target)).await.unwrap_err();
    assert!(matches!(err, CoreError::Rejected(WriteRejection::WriteBlocked)));
    assert_eq!(device.writes(), 0);

    coordinator.set_writes_enabled(true).unwrap();
    let clock = coordinator.set_device_time(Some(target)).await.unwrap();
    assert_eq!(clock.datetime, target);
    assert_eq!(clock.weekday, 7);
    assert_eq!(coordinator.device_time().await.unwrap().datetime, target);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_spawned_polling_publishes_to_subscribers() {
    let device = device();
    let server = device.serve().await.unwrap();
    let config = CoordinatorConfig {
        scan_interval: Duration::from_millis(50),
        ..config_for(&server, ALL)
    };
    let coordinator = Coordinator::with_catalog(config, catalog());
    let mut stream = coordinator.subscribe();
    let mut health = coordinator.subscribe_health();

    assert!(coordinator.spawn_polling());
    assert!(!coordinator.spawn_polling());
    assert!(coordinator.is_polling());

    let snapshot = tokio::time::timeout(Duration::from_secs(2), stream.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(snapshot.cycle >= 1);
    assert_eq!(snapshot.fresh_count(), ALL.len());

    tokio::time::timeout(Duration::from_secs(2), health.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(health.borrow().last_success.is_some());

    coordinator.shutdown().await;
    assert!(!coordinator.is_polling());
}

#[tokio::test]
async fn test_shutdown_aborts_inflight_cycle_without_publishing() {
    let device = device();
    device.set_latency(Duration::from_millis(200));
    let (_server, coordinator) = setup(&device, ALL).await;

    let (result, ()) = tokio::join!(coordinator.refresh(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.shutdown().await;
    });

    assert!(matches!(result, Err(CoreError::ShuttingDown)));
    assert_eq!(coordinator.snapshot().cycle, 0);
    assert!(matches!(
        coordinator.refresh().await,
        Err(CoreError::ShuttingDown)
    ));
    assert!(!coordinator.spawn_polling());
}
