//! ---
//! ems_section: "02-protection-logic"
//! ems_subsection: "tests"
//! ems_type: "test"
//! ems_scope: "code"
//! ems_description: "Scenario and invariant tests for the protection engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use proteve_core::{
    ClockPolicy, EventKind, ProtectionConfig, ProtectionEngine, ProtectionError, Sample,
    SystemStatus,
};

fn t(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
}

fn feed(engine: &mut ProtectionEngine, seconds: i64, voltage: f64) -> proteve_core::StepOutcome {
    engine
        .step(&Sample::new(t(seconds), voltage, 12.0), t(seconds))
        .expect("valid sample")
}

fn kinds(engine: &ProtectionEngine) -> Vec<EventKind> {
    engine
        .recent_events(usize::MAX)
        .into_iter()
        .map(|event| event.kind)
        .collect()
}

/// Open on `voltage` at `start`, then hold in band until re-armed. Returns the next free second.
fn fault_and_rearm(engine: &mut ProtectionEngine, start: i64, voltage: f64) -> i64 {
    feed(engine, start, voltage);
    feed(engine, start + 1, 220.0);
    feed(engine, start + 31, 220.0);
    start + 32
}

#[test]
fn undervoltage_then_debounced_rearm() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;

    let outcome = feed(&mut engine, 0, 170.0);
    assert!(!outcome.state.contactor_closed);
    assert_eq!(outcome.state.fault_count, 1);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::Undervoltage);
    assert_eq!(outcome.events[0].voltage, Some(170.0));

    let outcome = feed(&mut engine, 0, 220.0);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::RearmStarted);

    for second in 1..30 {
        let outcome = feed(&mut engine, second, 220.0);
        assert!(!outcome.state.contactor_closed, "closed early at {second}s");
        assert!(outcome.events.is_empty());
    }

    let outcome = feed(&mut engine, 30, 220.0);
    assert!(outcome.state.contactor_closed);
    assert_eq!(outcome.state.fault_count, 1);
    assert_eq!(outcome.state.rearm_started_at, None);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::RearmCompleted);

    assert_eq!(
        kinds(&engine),
        vec![
            EventKind::Normal,
            EventKind::Undervoltage,
            EventKind::RearmStarted,
            EventKind::RearmCompleted
        ]
    );
    Ok(())
}

#[test]
fn overvoltage_is_classified_by_violated_bound() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    let outcome = feed(&mut engine, 1, 255.5);
    assert_eq!(outcome.events[0].kind, EventKind::Overvoltage);
    assert!(outcome.events[0].description.contains("255.5"));
    Ok(())
}

#[test]
fn band_edges_never_trip() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    for (second, voltage) in [(1, 190.0), (2, 247.0), (3, 190.0), (4, 247.0)] {
        let outcome = feed(&mut engine, second, voltage);
        assert!(outcome.state.contactor_closed);
        assert!(outcome.events.is_empty());
    }
    assert_eq!(engine.snapshot().fault_count, 0);
    Ok(())
}

#[test]
fn consecutive_out_of_band_samples_count_one_fault() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    for second in 0..20 {
        feed(&mut engine, second, if second % 2 == 0 { 150.0 } else { 260.0 });
    }
    let state = engine.snapshot();
    assert_eq!(state.fault_count, 1);
    assert!(!state.contactor_closed);
    assert_eq!(kinds(&engine), vec![EventKind::Normal, EventKind::Undervoltage]);
    Ok(())
}

#[test]
fn third_fault_engages_lockout_despite_intervening_rearms() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    let mut clock = fault_and_rearm(&mut engine, 0, 170.0);
    clock = fault_and_rearm(&mut engine, clock + 60, 250.0);
    assert!(engine.snapshot().contactor_closed);
    assert_eq!(engine.snapshot().fault_count, 2);

    let outcome = feed(&mut engine, clock + 60, 180.0);
    assert!(outcome.state.locked_out);
    assert!(!outcome.state.contactor_closed);
    assert_eq!(outcome.state.fault_count, 3);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::LockoutEngaged);
    assert_eq!(outcome.events[0].voltage, Some(180.0));
    assert!(outcome.events[0].description.contains('3'));
    assert_eq!(engine.status(), SystemStatus::Lockout);
    Ok(())
}

#[test]
fn lockout_holds_contactor_open_for_in_band_samples() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    let mut clock = 0;
    for _ in 0..3 {
        clock = fault_and_rearm(&mut engine, clock, 170.0);
    }
    assert!(engine.snapshot().locked_out);
    let events_before = engine.event_log().last_id();

    for second in clock..clock + 120 {
        let outcome = feed(&mut engine, second, 220.0);
        assert!(!outcome.state.contactor_closed);
        assert!(outcome.state.locked_out);
        assert_eq!(outcome.state.rearm_started_at, None);
    }
    assert_eq!(engine.event_log().last_id(), events_before);
    Ok(())
}

#[test]
fn lockout_expires_after_quiet_window() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    fault_and_rearm(&mut engine, 0, 170.0);
    fault_and_rearm(&mut engine, 100, 170.0);
    feed(&mut engine, 200, 170.0);
    let state = engine.snapshot();
    assert!(state.locked_out);
    assert_eq!(state.last_fault_at, Some(t(200)));

    // Exactly the window is not enough; expiry needs strictly more.
    let outcome = feed(&mut engine, 200 + 900, 220.0);
    assert!(outcome.state.locked_out);
    assert!(outcome.events.is_empty());

    let outcome = feed(&mut engine, 200 + 901, 220.0);
    assert!(!outcome.state.locked_out);
    assert_eq!(outcome.state.fault_count, 0);
    assert_eq!(outcome.state.last_fault_at, None);
    assert_eq!(outcome.events.len(), 2);
    assert_eq!(outcome.events[0].kind, EventKind::RemoteReset);
    assert!(outcome.events[0].description.contains("expired"));
    assert_eq!(outcome.events[0].duration_seconds, Some(901.0));
    // Contactor stays open; a fresh debounce starts on the same in-band sample.
    assert_eq!(outcome.events[1].kind, EventKind::RearmStarted);
    assert!(!outcome.state.contactor_closed);
    assert_eq!(outcome.state.rearm_started_at, Some(t(1101)));
    assert_eq!(engine.status(), SystemStatus::Warning);

    let outcome = feed(&mut engine, 1101 + 30, 220.0);
    assert!(outcome.state.contactor_closed);
    assert_eq!(engine.status(), SystemStatus::Normal);
    Ok(())
}

#[test]
fn lockout_expiry_with_out_of_band_sample_counts_new_fault_only_on_edge() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    let mut clock = 0;
    for _ in 0..3 {
        clock = fault_and_rearm(&mut engine, clock, 170.0);
    }
    let locked_at = engine.snapshot().last_fault_at.expect("fault recorded");
    let expiry = (locked_at - t(0)).num_seconds() + 901;

    // Expiry clears the lockout, but K1 is already open so the low sample is not a new edge.
    let outcome = feed(&mut engine, expiry, 170.0);
    assert!(!outcome.state.locked_out);
    assert_eq!(outcome.state.fault_count, 0);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::RemoteReset);
    Ok(())
}

#[test]
fn remote_reset_is_idempotent_when_not_locked_out() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    feed(&mut engine, 0, 170.0);
    let before = engine.snapshot();
    let events_before = engine.recent_events(usize::MAX);

    let outcome = engine.remote_reset();
    assert!(outcome.events.is_empty());
    assert_eq!(outcome.state, before);
    assert_eq!(engine.recent_events(usize::MAX), events_before);
    Ok(())
}

#[test]
fn remote_reset_clears_lockout_with_single_event() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    let mut clock = 0;
    for _ in 0..3 {
        clock = fault_and_rearm(&mut engine, clock, 260.0);
    }
    assert!(engine.snapshot().locked_out);

    let outcome = engine.remote_reset();
    assert!(!outcome.state.locked_out);
    assert_eq!(outcome.state.fault_count, 0);
    assert_eq!(outcome.state.last_fault_at, None);
    assert!(!outcome.state.contactor_closed);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::RemoteReset);
    assert!(outcome.events[0].description.contains("manual"));

    assert!(engine.remote_reset().events.is_empty());

    // Recovery still goes through the debounce.
    let outcome = feed(&mut engine, clock, 220.0);
    assert_eq!(outcome.events[0].kind, EventKind::RearmStarted);
    let outcome = feed(&mut engine, clock + 30, 220.0);
    assert!(outcome.state.contactor_closed);
    Ok(())
}

#[test]
fn event_log_keeps_fifty_most_recent() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    let mut clock = 0;
    for _ in 0..30 {
        clock = fault_and_rearm(&mut engine, clock, 170.0);
        if engine.snapshot().locked_out {
            engine.remote_reset();
        }
    }
    let last_id = engine.event_log().last_id();
    assert!(last_id > 50);

    let recent = engine.recent_events(50);
    assert_eq!(recent.len(), 50);
    let ids: Vec<u64> = recent.iter().map(|e| e.id).collect();
    let expected: Vec<u64> = (last_id - 49..=last_id).collect();
    assert_eq!(ids, expected);
    assert_eq!(engine.recent_events(500).len(), 50);
    Ok(())
}

#[test]
fn invalid_samples_leave_state_untouched() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    feed(&mut engine, 0, 170.0);
    let before = engine.snapshot();
    let last_id = engine.event_log().last_id();

    for (voltage, current) in [
        (f64::NAN, 10.0),
        (f64::INFINITY, 10.0),
        (-5.0, 10.0),
        (10_000.0, 10.0),
        (220.0, f64::NAN),
        (220.0, -0.1),
    ] {
        let err = engine
            .step(&Sample::new(t(5), voltage, current), t(5))
            .unwrap_err();
        assert!(matches!(err, ProtectionError::InvalidSample { .. }));
        assert_eq!(engine.snapshot(), before);
        assert_eq!(engine.event_log().last_id(), last_id);
    }
    Ok(())
}

#[test]
fn clock_regression_is_rejected_by_default() -> Result<()> {
    let mut engine = ProtectionEngine::with_defaults(t(0))?;
    feed(&mut engine, 100, 220.0);
    let before = engine.snapshot();

    let err = engine
        .step(&Sample::new(t(50), 170.0, 12.0), t(50))
        .unwrap_err();
    assert_eq!(
        err,
        ProtectionError::ClockRegression {
            previous: t(100),
            now: t(50)
        }
    );
    assert_eq!(engine.snapshot(), before);

    // Equal instants are not a regression.
    assert!(engine.step(&Sample::new(t(100), 220.0, 12.0), t(100)).is_ok());
    Ok(())
}

#[test]
fn clock_regression_is_clamped_when_configured() -> Result<()> {
    let settings = ProtectionConfig {
        clock_policy: ClockPolicy::Clamp,
        ..ProtectionConfig::default()
    };
    let mut engine = ProtectionEngine::new(settings, t(0))?;
    feed(&mut engine, 100, 220.0);

    let outcome = engine.step(&Sample::new(t(50), 170.0, 12.0), t(50))?;
    assert_eq!(outcome.state.updated_at, t(100));
    assert_eq!(outcome.state.last_fault_at, Some(t(100)));
    assert_eq!(outcome.events[0].timestamp, t(100));
    Ok(())
}

#[test]
fn tunables_change_thresholds_and_timers() -> Result<()> {
    let settings = ProtectionConfig {
        v_min: 100.0,
        v_max: 130.0,
        v_nominal: 115.0,
        fault_threshold: 1,
        rearm_delay: std::time::Duration::from_secs(5),
        ..ProtectionConfig::default()
    };
    let mut engine = ProtectionEngine::new(settings, t(0))?;
    assert!(feed(&mut engine, 0, 125.0).state.contactor_closed);

    let outcome = feed(&mut engine, 1, 135.0);
    assert!(outcome.state.locked_out);
    assert_eq!(outcome.events[0].kind, EventKind::LockoutEngaged);
    Ok(())
}

#[test]
fn step_reports_events_evicted_from_a_tiny_log() -> Result<()> {
    let settings = ProtectionConfig {
        event_log_capacity: 1,
        fault_threshold: 1,
        ..ProtectionConfig::default()
    };
    let mut engine = ProtectionEngine::new(settings, t(0))?;

    let outcome = feed(&mut engine, 0, 170.0);
    assert!(outcome.state.locked_out);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::LockoutEngaged);

    let outcome = feed(&mut engine, 1_000, 220.0);
    let emitted: Vec<EventKind> = outcome.events.iter().map(|event| event.kind).collect();
    assert_eq!(emitted, vec![EventKind::RemoteReset, EventKind::RearmStarted]);
    assert!(outcome.events[0].id < outcome.events[1].id);
    assert_eq!(kinds(&engine), vec![EventKind::RearmStarted]);
    Ok(())
}

#[test]
fn oversized_event_log_is_refused_at_construction() {
    let settings = ProtectionConfig {
        event_log_capacity: usize::MAX,
        ..ProtectionConfig::default()
    };
    assert!(matches!(
        ProtectionEngine::new(settings, t(0)),
        Err(ProtectionError::InvalidSettings(_))
    ));
}
