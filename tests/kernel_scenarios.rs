//! Integration tests for the application kernel
//!
//! Drives an [`ApplicationKernel`] through a [`RecordingRti`] the way a
//! runtime infrastructure would: interactions in, grants in, advance
//! requests and outbound interactions out.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use cosim_kernel::event::nice;
use cosim_kernel::interaction::{ApplicationInteraction, TmcMapping, VehicleRegistration};
use cosim_kernel::objects::{
    CartesianPoint, InductionLoopInfo, VehicleClass, VehicleData, VehicleDeparture, VehicleType,
};
use cosim_kernel::types::SECOND;
use cosim_kernel::v2x::{AdHocChannel, Destination, ReceiverInformation, ReceivedV2xMessage, V2xMessage};
use cosim_kernel::{
    AppResult, Application, ApplicationKernel, ApplicationRegistry, ErrorCode, Event, EventPayload,
    EventQueue, Interaction, KernelConfig, KernelError, KernelState, RecordingRti, UnitContext,
    UnitMapping, VehicleMapping,
};

// ============================================================================
// Test Applications
// ============================================================================

type Log = Arc<Mutex<Vec<String>>>;

/// Writes every callback it receives into a shared log.
struct Recorder {
    unit: String,
    log: Log,
}

impl Recorder {
    fn record(&self, what: impl AsRef<str>) {
        self.log.lock().push(format!("{} {}", self.unit, what.as_ref()));
    }
}

impl Application for Recorder {
    fn on_startup(&mut self, _ctx: &mut UnitContext<'_>) -> AppResult {
        self.record("startup");
        Ok(())
    }

    fn on_shutdown(&mut self, _ctx: &mut UnitContext<'_>) -> AppResult {
        self.record("shutdown");
        Ok(())
    }

    fn on_vehicle_updated(
        &mut self,
        previous: Option<&VehicleData>,
        _updated: &VehicleData,
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        self.record(if previous.is_some() { "moved" } else { "added" });
        Ok(())
    }

    fn on_traffic_detectors_updated(
        &mut self,
        induction_loops: &[InductionLoopInfo],
        _lane_area_detectors: &[cosim_kernel::objects::LaneAreaDetectorInfo],
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        let names: Vec<&str> = induction_loops.iter().map(|info| info.name.as_str()).collect();
        self.record(format!("loops {}", names.join(",")));
        Ok(())
    }

    fn on_message_received(&mut self, message: &ReceivedV2xMessage, _ctx: &mut UnitContext<'_>) -> AppResult {
        self.record(format!("received {}", message.message.id));
        Ok(())
    }

    fn on_interaction_received(
        &mut self,
        interaction: &ApplicationInteraction,
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        self.record(format!("got {}", interaction.name));
        Ok(())
    }
}

/// Fails on every application interaction it receives.
struct Faulty;

impl Application for Faulty {
    fn on_interaction_received(
        &mut self,
        interaction: &ApplicationInteraction,
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        Err(format!("cannot handle {}", interaction.name).into())
    }
}

/// Broadcasts one beacon on startup, using the unit number as message id.
struct Beacon;

impl Application for Beacon {
    fn on_startup(&mut self, ctx: &mut UnitContext<'_>) -> AppResult {
        let id = ctx
            .unit_id()
            .rsplit('_')
            .next()
            .and_then(|n| n.parse::<i32>().ok())
            .unwrap_or(0);
        let source = ctx.unit_id().to_string();
        ctx.send_v2x_message(message(id, &source));
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn message(id: i32, source: &str) -> V2xMessage {
    V2xMessage {
        id,
        source: source.to_string(),
        destination: Destination::adhoc_broadcast(AdHocChannel::Cch),
        payload_length: 200,
        payload: serde_json::Value::Null,
    }
}

fn recording_kernel(config: &KernelConfig) -> (ApplicationKernel, RecordingRti, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app_log = log.clone();
    let applications = ApplicationRegistry::new()
        .with("Recorder", move |unit| {
            Box::new(Recorder {
                unit: unit.to_string(),
                log: app_log.clone(),
            })
        })
        .with("Beacon", |_unit| Box::new(Beacon))
        .with("Faulty", |_unit| Box::new(Faulty));
    let rti = RecordingRti::new();
    let kernel = ApplicationKernel::new(config, rti.clone(), Arc::new(applications)).unwrap();
    (kernel, rti, log)
}

fn apps(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn vehicle_mapping(name: &str, applications: Vec<String>) -> VehicleMapping {
    VehicleMapping {
        name: name.to_string(),
        group: None,
        applications,
        vehicle_type: VehicleType::new("car", VehicleClass::Car),
    }
}

fn vehicle_registration(time: u64, name: &str, applications: Vec<String>) -> Interaction {
    Interaction::VehicleRegistration(VehicleRegistration {
        time,
        mapping: vehicle_mapping(name, applications),
        departure: VehicleDeparture::default(),
    })
}

fn vehicle_updates(time: u64, added: &[&str], updated: &[&str]) -> Interaction {
    let data = |name: &&str| VehicleData::new(*name, time, CartesianPoint::new(10.0, 20.0));
    Interaction::VehicleUpdates {
        time,
        added: added.iter().map(data).collect(),
        updated: updated.iter().map(data).collect(),
        removed: Vec::new(),
    }
}

fn tmc(name: &str, loops: &[&str]) -> Interaction {
    Interaction::TmcRegistration {
        time: 0,
        mapping: TmcMapping {
            name: name.to_string(),
            group: None,
            applications: apps(&["Recorder"]),
            induction_loops: loops.iter().map(|l| l.to_string()).collect(),
            lane_area_detectors: BTreeSet::new(),
        },
    }
}

fn induction_loop(name: &str) -> InductionLoopInfo {
    InductionLoopInfo {
        name: name.to_string(),
        vehicle_count: 3,
        mean_speed: 12.5,
    }
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_vehicle_starts_on_first_movement() {
    let (mut kernel, _rti, log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();

    kernel
        .process_interaction(vehicle_registration(0, "veh_0", apps(&["Recorder"])))
        .unwrap();
    assert!(!kernel.registry().contains("veh_0"));
    assert_eq!(kernel.router().pending_vehicles(), 1);

    kernel.process_interaction(vehicle_updates(5 * SECOND, &["veh_0"], &[])).unwrap();
    assert!(kernel.registry().contains("veh_0"));
    assert_eq!(kernel.router().pending_vehicles(), 0);

    kernel.process_time_advance_grant(5 * SECOND).unwrap();
    assert_eq!(*log.lock(), vec!["veh_0 startup", "veh_0 added"]);

    kernel.process_interaction(vehicle_updates(6 * SECOND, &[], &["veh_0"])).unwrap();
    kernel.process_time_advance_grant(6 * SECOND).unwrap();
    assert_eq!(log.lock().last().map(String::as_str), Some("veh_0 moved"));
    assert_eq!(log.lock().iter().filter(|l| l.ends_with("startup")).count(), 1);
}

#[test]
fn test_vehicle_without_applications_never_registers() {
    let (mut kernel, _rti, _log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();

    kernel.process_interaction(vehicle_registration(0, "veh_0", Vec::new())).unwrap();
    kernel.process_interaction(vehicle_updates(SECOND, &["veh_0"], &[])).unwrap();
    kernel.process_time_advance_grant(SECOND).unwrap();

    assert!(kernel.registry().is_empty());
    assert_eq!(kernel.router().pending_vehicles(), 0);
}

#[test]
fn test_duplicate_registration_fails() {
    let (mut kernel, _rti, _log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();

    let registration = Interaction::RsuRegistration {
        time: 0,
        mapping: UnitMapping::new("rsu_0", apps(&["Recorder"])),
    };
    kernel.process_interaction(registration.clone()).unwrap();
    let err = kernel.process_interaction(registration).unwrap_err();

    assert_eq!(err.code(), ErrorCode::UncaughtErrorInProcessInteraction);
    assert!(matches!(err.root_cause(), KernelError::DuplicateUnit { id } if id == "rsu_0"));
    assert_eq!(kernel.registry().len(), 1);
}

#[test]
fn test_registration_activates_environment_sensors() {
    let (mut kernel, rti, _log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();

    kernel
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", apps(&["Recorder"])),
        })
        .unwrap();

    let activations: Vec<_> = rti
        .interactions()
        .into_iter()
        .filter(|i| matches!(i, Interaction::EnvironmentSensorActivation { unit_id, .. } if unit_id == "rsu_0"))
        .collect();
    assert_eq!(activations.len(), 1);
}

// ============================================================================
// Message Routing
// ============================================================================

#[test]
fn test_uncached_reception_is_dropped() {
    let (mut kernel, _rti, _log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();
    assert_eq!(kernel.pending_events(), 1);

    kernel
        .process_interaction(Interaction::V2xMessageReception {
            time: SECOND,
            receiver_name: "veh_0".to_string(),
            message_id: 42,
            receiver_information: ReceiverInformation {
                receive_time: SECOND,
                rssi: -70.0,
            },
        })
        .unwrap();

    assert_eq!(kernel.pending_events(), 1);
    assert_eq!(kernel.router().dropped(), 1);
    assert_eq!(kernel.stats().interactions_dropped, 1);
}

#[test]
fn test_cached_reception_is_delivered() {
    let (mut kernel, _rti, log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();
    kernel
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", apps(&["Recorder"])),
        })
        .unwrap();
    kernel
        .add_event(Event::callback(SECOND, "rsu_0", |ctx: &mut UnitContext<'_>| {
            ctx.send_v2x_message(message(7, "rsu_0"));
            Ok(())
        }))
        .unwrap();
    kernel.process_time_advance_grant(SECOND).unwrap();
    assert!(kernel.context().tables().v2x_messages.contains(7));

    kernel
        .process_interaction(Interaction::V2xMessageReception {
            time: 2 * SECOND,
            receiver_name: "rsu_0".to_string(),
            message_id: 7,
            receiver_information: ReceiverInformation {
                receive_time: 2 * SECOND,
                rssi: -60.0,
            },
        })
        .unwrap();
    kernel.process_time_advance_grant(2 * SECOND).unwrap();

    assert_eq!(log.lock().last().map(String::as_str), Some("rsu_0 received 7"));
}

#[test]
fn test_detector_updates_filtered_per_subscription() {
    let (mut kernel, _rti, log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();
    kernel.process_interaction(tmc("tmc_a", &["a"])).unwrap();
    kernel.process_interaction(tmc("tmc_b", &["b"])).unwrap();
    kernel.process_time_advance_grant(0).unwrap();
    log.lock().clear();

    kernel
        .process_interaction(Interaction::TrafficDetectorUpdates {
            time: SECOND,
            induction_loops: vec![induction_loop("a"), induction_loop("c")],
            lane_area_detectors: Vec::new(),
        })
        .unwrap();
    kernel.process_time_advance_grant(SECOND).unwrap();

    assert_eq!(*log.lock(), vec!["tmc_a loops a"]);
}

// ============================================================================
// Time Management
// ============================================================================

#[test]
fn test_queue_orders_by_time_then_nice() {
    let mut queue = EventQueue::new();
    let events = [
        (20, 0, "late"),
        (10, nice::UNIT_REMOVED, "removal"),
        (10, nice::START_APPLICATIONS, "start"),
        (10, 0, "first"),
        (10, 0, "second"),
    ];
    for (time, priority, unit) in events {
        queue
            .insert(Event::for_unit(time, priority, unit, EventPayload::GarbageCollection))
            .unwrap();
    }

    let order: Vec<String> = queue
        .pop_due_events(20)
        .into_iter()
        .filter_map(|event| event.unit_id().map(str::to_string))
        .collect();
    assert_eq!(order, vec!["start", "first", "second", "removal", "late"]);
}

#[test]
fn test_grant_requests_next_event_time() {
    let (mut kernel, rti, _log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();
    kernel
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", apps(&["Recorder"])),
        })
        .unwrap();
    kernel
        .add_event(Event::callback(30 * SECOND, "rsu_0", |_ctx: &mut UnitContext<'_>| Ok(())))
        .unwrap();
    rti.clear();

    kernel.process_time_advance_grant(10 * SECOND).unwrap();
    assert_eq!(kernel.current_time(), 10 * SECOND);
    assert_eq!(kernel.state(), KernelState::Running);
    assert_eq!(rti.advance_requests(), vec![30 * SECOND]);
}

#[test]
fn test_message_cache_garbage_collection() {
    let (mut kernel, rti, _log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 100 * SECOND).unwrap();
    kernel
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", apps(&["Recorder"])),
        })
        .unwrap();

    for (seconds, id) in [(10, 1), (20, 2), (40, 3)] {
        kernel
            .add_event(Event::callback(seconds * SECOND, "rsu_0", move |ctx: &mut UnitContext<'_>| {
                ctx.send_v2x_message(message(id, "rsu_0"));
                Ok(())
            }))
            .unwrap();
    }
    kernel.process_time_advance_grant(40 * SECOND).unwrap();
    assert_eq!(kernel.context().tables().v2x_messages.len(), 3);

    // Every vehicle update schedules a collection pass.
    kernel.process_interaction(vehicle_updates(45 * SECOND, &[], &[])).unwrap();
    kernel.process_time_advance_grant(45 * SECOND).unwrap();

    let removals: Vec<BTreeSet<i32>> = rti
        .interactions()
        .into_iter()
        .filter_map(|interaction| match interaction {
            Interaction::V2xMessageRemoval { removed_message_ids, .. } => Some(removed_message_ids),
            _ => None,
        })
        .collect();
    assert_eq!(removals, vec![BTreeSet::from([1])]);
    assert!(!kernel.context().tables().v2x_messages.contains(1));
    assert!(kernel.context().tables().v2x_messages.contains(2));
    assert_eq!(kernel.stats().messages_purged, 1);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_end_of_simulation_tears_down_units() {
    let (mut kernel, _rti, log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 60 * SECOND).unwrap();
    kernel
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", apps(&["Recorder"])),
        })
        .unwrap();

    kernel.process_time_advance_grant(60 * SECOND).unwrap();

    assert_eq!(kernel.state(), KernelState::Terminated);
    assert!(kernel.registry().is_empty());
    assert_eq!(*log.lock(), vec!["rsu_0 startup", "rsu_0 shutdown"]);
}

#[test]
fn test_finish_twice_shuts_down_once() {
    let (mut kernel, _rti, log) = recording_kernel(&KernelConfig::default());
    kernel.initialize(0, 60 * SECOND).unwrap();
    kernel
        .process_interaction(Interaction::RsuRegistration {
            time: 0,
            mapping: UnitMapping::new("rsu_0", apps(&["Recorder"])),
        })
        .unwrap();
    kernel.process_time_advance_grant(0).unwrap();

    kernel.finish_simulation().unwrap();
    kernel.finish_simulation().unwrap();

    let shutdowns = log.lock().iter().filter(|line| line.ends_with("shutdown")).count();
    assert_eq!(shutdowns, 1);
    assert_eq!(kernel.state(), KernelState::Terminated);
}

// ============================================================================
// Application Errors
// ============================================================================

fn rsu(name: &str, applications: &[&str]) -> Interaction {
    Interaction::RsuRegistration {
        time: 0,
        mapping: UnitMapping::new(name, apps(applications)),
    }
}

fn broadcast(time: u64, name: &str) -> Interaction {
    Interaction::ApplicationInteraction(ApplicationInteraction {
        time,
        unit_id: None,
        name: name.to_string(),
        payload: serde_json::Value::Null,
    })
}

/// Registers a failing and a recording unit, broadcasts one interaction and
/// grants past it. Returns the grant error, the log and the queue length.
fn run_failing_batch(threads: usize) -> (KernelError, Vec<String>, usize, ApplicationKernel) {
    let config = KernelConfig {
        event_scheduler_threads: threads,
        ..KernelConfig::default()
    };
    let (mut kernel, _rti, log) = recording_kernel(&config);
    kernel.initialize(0, 60 * SECOND).unwrap();
    kernel.process_interaction(rsu("rsu_a", &["Faulty"])).unwrap();
    kernel.process_interaction(rsu("rsu_b", &["Recorder"])).unwrap();
    kernel.process_interaction(broadcast(SECOND, "ping")).unwrap();

    let err = kernel.process_time_advance_grant(SECOND).unwrap_err();
    let queued = kernel.pending_events();
    let lines = log.lock().clone();
    (err, lines, queued, kernel)
}

#[test]
fn test_application_error_aborts_grant() {
    let (err, log, _queued, kernel) = run_failing_batch(1);

    assert!(matches!(err, KernelError::AdvanceTime { time, .. } if time == SECOND));
    assert_eq!(err.code(), ErrorCode::ErrorAdvanceTime);
    assert_eq!(err.code().code(), 0x0100_0013);
    match err.root_cause() {
        KernelError::Application { unit_id, source } => {
            assert_eq!(unit_id, "rsu_a");
            assert_eq!(source.to_string(), "cannot handle ping");
        }
        other => panic!("unexpected root cause: {other:?}"),
    }
    assert_eq!(err.root_cause().code(), ErrorCode::UncaughtErrorDuringEvent);

    // Nothing registered or started earlier in the step is rolled back.
    assert!(kernel.registry().contains("rsu_a"));
    assert!(kernel.registry().contains("rsu_b"));
    assert_eq!(log.first().map(String::as_str), Some("rsu_b startup"));
}

#[test]
fn test_application_error_keeps_sibling_events() {
    let (_err, log, queued, _kernel) = run_failing_batch(1);

    assert!(log.contains(&"rsu_b got ping".to_string()));
    // Only the end-of-simulation event is left.
    assert_eq!(queued, 1);
}

#[cfg(feature = "parallel")]
#[test]
fn test_application_error_same_for_any_thread_count() {
    let (sequential_err, sequential_log, sequential_queued, _) = run_failing_batch(1);
    let (parallel_err, parallel_log, parallel_queued, _) = run_failing_batch(4);

    assert_eq!(sequential_log, parallel_log);
    assert_eq!(sequential_queued, parallel_queued);
    assert_eq!(sequential_err.code(), parallel_err.code());
    assert_eq!(sequential_err.root_cause().code(), parallel_err.root_cause().code());
}

// ============================================================================
// Parallel Dispatch
// ============================================================================

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_dispatch_matches_sequential() {
    fn run(threads: usize) -> Vec<Interaction> {
        let config = KernelConfig {
            event_scheduler_threads: threads,
            ..KernelConfig::default()
        };
        let (mut kernel, rti, _log) = recording_kernel(&config);
        kernel.initialize(0, 60 * SECOND).unwrap();
        for n in 0..16 {
            kernel
                .process_interaction(Interaction::RsuRegistration {
                    time: 0,
                    mapping: UnitMapping::new(format!("rsu_{n}"), apps(&["Beacon"]))
                        .with_position(CartesianPoint::new(n as f64, 0.0)),
                })
                .unwrap();
        }
        kernel.process_time_advance_grant(SECOND).unwrap();
        rti.interactions()
    }

    let sequential = run(1);
    let parallel = run(4);
    assert_eq!(sequential.len(), 32);
    assert_eq!(sequential, parallel);

    let first = sequential.iter().find_map(|interaction| match interaction {
        Interaction::V2xMessageTransmission { message, .. } => Some(message.source.clone()),
        _ => None,
    });
    assert_eq!(first.as_deref(), Some("rsu_0"));
}
