//! End-to-end tests for scripted instruction trials.

use std::time::Duration;

use circle_graph_nav::{
    CircleGraph, Error, MemoryMount, Sequencer, StateId, TrialConfig, TrialSpec,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::time::Instant;

fn engine(value: Value) -> CircleGraph<MemoryMount> {
    let spec = TrialSpec::from_value(value).unwrap();
    CircleGraph::new(TrialConfig::from_spec(spec).unwrap(), MemoryMount::new()).unwrap()
}

fn diamond() -> Value {
    json!({
        "graph": [[1, 2], [3], [3], [0]],
        "reward": [0, 2, -1, 5],
        "start": 0,
        "goal": 3,
    })
}

fn visits(cg: &CircleGraph<MemoryMount>) -> Vec<usize> {
    cg.log()
        .events()
        .iter()
        .filter(|e| e.event == "visit")
        .filter_map(|e| e.state())
        .map(StateId::index)
        .collect()
}

// ============================================================================
// 1. Scripts from JSON
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_collect_all_script_then_button() {
    let mut cg = engine(json!({"graph": [[1], [2], [0]], "reward": [0, 1, 1], "start": 0}));
    let script = Sequencer::from_json(
        r#"[
            {"op": "message", "text": "Collect all the points!"},
            {"op": "navigate", "termination": "collect_all"},
            {"op": "message", "text": null},
            {"op": "wait_for_button", "label": "next"}
        ]"#,
    )
    .unwrap();

    let input = cg.input();
    tokio::spawn(async move {
        for state in [1, 2] {
            tokio::time::sleep(Duration::from_millis(500)).await;
            input.click(StateId(state));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        input.press_button();
    });

    script.run(&mut cg).await.unwrap();

    assert_eq!(cg.score(), 2.0);
    assert_eq!(cg.scene().message, None);
    assert_eq!(cg.scene().button, None);
    assert_eq!(cg.pending_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_script_edits_rewards_before_navigating() {
    let mut cg = engine(diamond());
    let script = Sequencer::from_json(
        r#"[
            {"op": "set_reward", "state": 1, "reward": 10},
            {"op": "message", "text": "Go!"},
            {"op": "navigate"}
        ]"#,
    )
    .unwrap();

    let input = cg.input();
    tokio::spawn(async move {
        for state in [1, 3] {
            tokio::time::sleep(Duration::from_millis(500)).await;
            input.click(StateId(state));
        }
    });

    script.run(&mut cg).await.unwrap();

    assert_eq!(cg.score(), 15.0);
    assert_eq!(cg.scene().message.as_deref(), Some("Go!"));
}

#[tokio::test(start_paused = true)]
async fn test_set_rewards_zeroes_current_state() {
    let mut cg = engine(diamond());
    let script = Sequencer::from_json(r#"[{"op": "set_rewards", "rewards": [9, 1, 1, 1]}]"#).unwrap();

    script.run(&mut cg).await.unwrap();

    assert_eq!(cg.rewards(), &[0.0, 1.0, 1.0, 1.0]);
}

#[tokio::test(start_paused = true)]
async fn test_pause_waits_on_the_clock() {
    let mut cg = engine(diamond());
    let script = Sequencer::from_json(r#"[{"op": "pause", "ms": 250}]"#).unwrap();

    let before = Instant::now();
    script.run(&mut cg).await.unwrap();

    let waited = before.elapsed();
    assert!(waited >= Duration::from_millis(250) && waited < Duration::from_millis(260));
}

// ============================================================================
// 2. Presets
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_learn_rewards_restages_each_round() {
    let mut cg = engine(diamond());
    let script = Sequencer::learn_rewards(
        StateId(0),
        vec![vec![0.0, 3.0, 0.0, 0.0], vec![0.0, 0.0, 4.0, 0.0]],
        1,
    );

    let input = cg.input();
    tokio::spawn(async move {
        for state in [1, 2] {
            tokio::time::sleep(Duration::from_millis(500)).await;
            input.click(StateId(state));
        }
    });

    script.run(&mut cg).await.unwrap();

    assert_eq!(cg.score(), 7.0);
    assert_eq!(visits(&cg), vec![0, 1, 0, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_wait_hover_all_defaults_to_every_state() {
    let mut cg = engine(diamond());
    let script = Sequencer::from_json(r#"[{"op": "wait_hover_all"}]"#).unwrap();

    let input = cg.input();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        for state in [3, 2, 1, 0] {
            input.hover(StateId(state));
        }
    });

    script.run(&mut cg).await.unwrap();

    assert_eq!(cg.log().events().iter().filter(|e| e.event == "mouseenter").count(), 4);
    assert_eq!(cg.scene().message, None);
}

// ============================================================================
// 3. Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failing_step_stops_the_script() {
    let mut cg = engine(diamond());
    let script = Sequencer::from_json(
        r#"[
            {"op": "set_reward", "state": 9, "reward": 1},
            {"op": "message", "text": "never shown"}
        ]"#,
    )
    .unwrap();

    let err = script.run(&mut cg).await.unwrap_err();

    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(cg.scene().message, None);
}
