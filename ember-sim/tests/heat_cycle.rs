//! Whole-controller runs against the simulated burner

use ember_core::faults::ErrorCode;
use ember_core::heater::{Sensor, Status};
use ember_sim::{run, Scenario, Summary};

fn scenario(text: &str) -> Scenario {
    Scenario::parse(text).unwrap()
}

/// Index of the first visit to each status, panicking if one is missing
fn first_visits(summary: &Summary, statuses: &[Status]) -> Vec<usize> {
    let path = summary.path();
    statuses
        .iter()
        .map(|status| {
            path.iter()
                .position(|s| s == status)
                .unwrap_or_else(|| panic!("{status:?} never visited: {path:?}"))
        })
        .collect()
}

#[test]
fn test_parking_heat_cycle() {
    let scenario = scenario(include_str!("../scenarios/parking.toml"));
    let summary = run(&scenario, 600).unwrap();

    let visits = first_visits(
        &summary,
        &[
            Status::Start,
            Status::Preheat,
            Status::Glow,
            Status::Ignite,
            Status::Stabilize,
            Status::BurnLow,
            Status::Stop,
            Status::Cooldown,
            Status::End,
        ],
    );
    assert!(visits.windows(2).all(|w| w[0] < w[1]), "{:?}", summary.path());

    assert_eq!(summary.status, Status::Off);
    assert!(summary.errors.is_empty(), "{:?}", summary.errors);
    assert_eq!(summary.persistent.start_counter, 1);
    assert_eq!(summary.persist_failures, 0);
    assert!(summary.strokes > 100);
    assert!(summary.peak_exchanger_c > 40.0);

    // The remote's off request is what ended the burn
    let stop = summary
        .events
        .iter()
        .find(|e| e.to == Status::Stop)
        .unwrap();
    assert!(stop.at_s >= 420.0 && stop.at_s < 421.0, "{stop:?}");
}

#[test]
fn test_fuel_that_never_lights() {
    let scenario = scenario(include_str!("../scenarios/no_ignition.toml"));
    let summary = run(&scenario, 400).unwrap();

    assert!(summary.visited(Status::Ignite));
    assert!(!summary.visited(Status::BurnHigh));
    assert_eq!(summary.status, Status::Off);
    assert!(summary
        .errors
        .find(ErrorCode::for_sensor(Sensor::Flame))
        .is_some());

    let failure = summary.events.iter().find(|e| e.error.is_some()).unwrap();
    assert_eq!(failure.to, Status::Off);
}

#[test]
fn test_front_panel_switch() {
    let scenario = scenario(
        r#"
        [[request]]
        at_s = 1
        command = "button"
        pressed = true

        [[request]]
        at_s = 260
        command = "button"
        pressed = false
        "#,
    );
    let summary = run(&scenario, 400).unwrap();

    first_visits(&summary, &[Status::Start, Status::BurnLow, Status::Stop]);
    assert_eq!(summary.status, Status::Off);
    assert!(summary.errors.is_empty(), "{:?}", summary.errors);
}

#[test]
fn test_ventilation_times_out() {
    let scenario = scenario(
        r#"
        [[request]]
        at_s = 1
        command = "on"
        mode = "vent"
        minutes = 1
        "#,
    );
    let summary = run(&scenario, 120).unwrap();

    assert_eq!(summary.path(), vec![Status::Off, Status::Vent, Status::Off]);
    assert!(summary.errors.is_empty(), "{:?}", summary.errors);
    assert_eq!(summary.strokes, 0);
}

#[test]
fn test_unattended_controller_stays_off() {
    let summary = run(&Scenario::default(), 60).unwrap();
    assert_eq!(summary.status, Status::Off);
    assert!(summary.events.is_empty());
    assert_eq!(summary.persistent.start_counter, 0);
}
