//! End-to-end tests for the trial engine's navigation loop.
//!
//! Each test builds a trial from JSON, drives it through the input queue
//! with a spawned "participant" task, and checks the score, the event log
//! and the presented scene. The clock is paused, so delays are exact.

use std::sync::Arc;
use std::time::Duration;

use circle_graph_nav::{
    CircleGraph, Error, InputHandle, MemoryMount, NavigateOptions, Phase, StateId, StepBudget,
    Termination, TrialConfig, TrialSpec,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

/// Four states: 0 → {1, 2}, 1 → 3, 2 → 3, 3 → 0.
fn diamond() -> Value {
    json!({
        "graph": [[1, 2], [3], [3], [0]],
        "reward": [0, 2, -1, 5],
        "start": 0,
        "goal": 3,
    })
}

fn engine(value: Value) -> CircleGraph<MemoryMount> {
    let spec = TrialSpec::from_value(value).unwrap();
    CircleGraph::new(TrialConfig::from_spec(spec).unwrap(), MemoryMount::new()).unwrap()
}

/// A participant who waits half a second before each click.
fn clicker(input: InputHandle, clicks: Vec<usize>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for state in clicks {
            tokio::time::sleep(Duration::from_millis(500)).await;
            input.click(StateId(state));
        }
    })
}

/// An engine whose mount the test can watch while the trial runs.
fn watched(value: Value) -> (CircleGraph<Arc<Mutex<MemoryMount>>>, Arc<Mutex<MemoryMount>>) {
    let mount = Arc::new(Mutex::new(MemoryMount::new()));
    let spec = TrialSpec::from_value(value).unwrap();
    let cg = CircleGraph::new(TrialConfig::from_spec(spec).unwrap(), Arc::clone(&mount)).unwrap();
    (cg, mount)
}

fn visits<M: circle_graph_nav::Mount>(cg: &CircleGraph<M>) -> Vec<usize> {
    cg.log()
        .events()
        .iter()
        .filter(|e| e.event == "visit")
        .filter_map(|e| e.state())
        .map(StateId::index)
        .collect()
}

// ============================================================================
// 1. The basic trial: start → 1 → goal
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_navigate_to_goal_collects_rewards() {
    let mut cg = engine(diamond());
    clicker(cg.input(), vec![1, 3]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(cg.score(), 7.0);
    assert_eq!(visits(&cg), vec![0, 1, 3]);
    assert_eq!(cg.rewards(), &[0.0, 0.0, -1.0, 0.0]);
    assert_eq!(cg.current_state(), Some(StateId(3)));
    assert_eq!(cg.phase(), Phase::Terminated);
    assert_eq!(cg.pending_listeners(), 0);

    let first = &cg.log().events()[0];
    assert_eq!(first.get("initial"), Some(&json!(true)));
}

#[tokio::test(start_paused = true)]
async fn test_scene_tracks_score_and_current_state() {
    let mut cg = engine(diamond());
    clicker(cg.input(), vec![2, 3]);
    cg.navigate(NavigateOptions::default()).await.unwrap();

    let frame = cg.mount().frame().unwrap();
    assert_eq!(frame.header.points, 4.0);
    assert_eq!(frame.current(), Some(StateId(3)));
    assert!(frame.node(StateId(2)).unwrap().visited);
    assert!(!frame.node(StateId(1)).unwrap().visited);
    assert!(frame.nodes.iter().all(|n| !n.selectable));
    assert!(frame.edges.iter().all(|e| !e.current), "current edges cleared at the end");
}

// ============================================================================
// 2. Invalid clicks are ignored
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_successor_clicks_are_ignored() {
    let mut cg = engine(diamond());
    // 3 is not a successor of 0; 0 is the current state.
    clicker(cg.input(), vec![3, 0, 1, 3]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(visits(&cg), vec![0, 1, 3]);
    assert_eq!(cg.score(), 7.0);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_waits_while_only_invalid_clicks_arrive() {
    let mut cg = engine(diamond());
    let input = cg.input();
    input.click_background();
    clicker(input, vec![3]);

    let out = tokio::time::timeout(Duration::from_secs(5), cg.navigate(NavigateOptions::default())).await;

    assert!(out.is_err(), "navigation should still be waiting");
    assert_eq!(visits(&cg), vec![0]);
    assert_eq!(cg.score(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_click_before_listener_is_not_heard() {
    let mut cg = engine(diamond());
    let input = cg.input();
    input.click(StateId(1));
    tokio::time::advance(Duration::from_millis(10)).await;
    clicker(input, vec![2, 3]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(visits(&cg), vec![0, 2, 3]);
    assert_eq!(cg.score(), 4.0);
}

// ============================================================================
// 3. Termination and step budget
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_step_budget_ends_navigation() {
    let mut cg = engine(diamond());
    clicker(cg.input(), vec![1, 3]);

    let options = NavigateOptions { n_steps: Some(StepBudget::Bounded(1)), ..Default::default() };
    cg.navigate(options).await.unwrap();

    assert_eq!(visits(&cg), vec![0, 1]);
    assert_eq!(cg.trial_state().steps_left(), StepBudget::Bounded(0));
    assert_eq!(cg.mount().frame().unwrap().header.steps, StepBudget::Bounded(0));
}

#[tokio::test(start_paused = true)]
async fn test_configured_step_budget_overrides_goal() {
    let mut value = diamond();
    value["n_steps"] = json!(3);
    value["goal"] = Value::Null;
    let mut cg = engine(value);
    assert!(cg.config().show_steps);
    clicker(cg.input(), vec![1, 3, 0]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(visits(&cg), vec![0, 1, 3, 0]);
    assert_eq!(cg.score(), 7.0);
}

#[tokio::test(start_paused = true)]
async fn test_collect_all_stops_when_nothing_is_left() {
    let mut cg = engine(json!({
        "graph": [[1], [2], [0]],
        "reward": [0, 1, 1],
        "start": 0,
    }));
    clicker(cg.input(), vec![1, 2]);

    let options = NavigateOptions { termination: Termination::CollectAll, ..Default::default() };
    cg.navigate(options).await.unwrap();

    assert_eq!(cg.score(), 2.0);
    assert!(cg.trial_state().all_collected());
}

#[tokio::test(start_paused = true)]
async fn test_collect_all_walks_past_the_goal() {
    let mut value = diamond();
    value["reward"] = json!([0, 3, 0, 0]);
    let mut cg = engine(value);
    clicker(cg.input(), vec![2, 3, 0, 1]);

    let options = NavigateOptions { termination: Termination::CollectAll, ..Default::default() };
    cg.navigate(options).await.unwrap();

    assert_eq!(visits(&cg), vec![0, 2, 3, 0, 1]);
    assert_eq!(cg.rewards(), &[0.0, 0.0, 0.0, 0.0]);
}

#[tokio::test(start_paused = true)]
async fn test_goal_without_successors_terminates_normally() {
    let mut value = diamond();
    value["graph"] = json!([[1, 2], [3], [3], []]);
    let mut cg = engine(value);
    clicker(cg.input(), vec![1, 3]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(cg.score(), 7.0);
    assert!(cg.log().events().iter().all(|e| e.event != "dead_end"));
}

#[tokio::test(start_paused = true)]
async fn test_custom_termination() {
    let mut cg = engine(diamond());
    clicker(cg.input(), vec![2]);

    let options = NavigateOptions {
        termination: Termination::custom(|state, _| state.score() < 0.0),
        ..Default::default()
    };
    cg.navigate(options).await.unwrap();

    assert_eq!(cg.score(), -1.0);
}

#[tokio::test(start_paused = true)]
async fn test_dead_end_ends_navigation() {
    let mut cg = engine(json!({"graph": [[1], []], "reward": [0, 3], "start": 0}));
    clicker(cg.input(), vec![1]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(cg.score(), 3.0);
    assert!(cg.log().events().iter().any(|e| e.event == "dead_end"));
}

#[tokio::test(start_paused = true)]
async fn test_rewards_kept_without_consume() {
    let mut value = diamond();
    value["consume"] = json!(false);
    value["goal"] = json!(0);
    let mut cg = engine(value);
    clicker(cg.input(), vec![1, 3, 0]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(cg.score(), 7.0);
    assert_eq!(cg.rewards(), &[0.0, 2.0, -1.0, 5.0]);
}

// ============================================================================
// 4. Leaving the graph
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_leave_flags_control_final_scene() {
    let mut cg = engine(diamond());
    clicker(cg.input(), vec![1, 3]);

    let options = NavigateOptions { leave_open: false, leave_state: false, ..Default::default() };
    cg.navigate(options).await.unwrap();

    let frame = cg.mount().frame().unwrap();
    assert!(frame.faded);
    assert_eq!(frame.current(), None);
}

// ============================================================================
// 5. Hooks, hover and cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_visit_hook_sees_non_initial_visits() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut cg = engine(diamond()).with_on_state_visit(move |s| sink.lock().push(s.index()));
    clicker(cg.input(), vec![1, 3]);

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(*seen.lock(), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_hover_events_are_logged() {
    let mut value = diamond();
    value["hover_rewards"] = json!(true);
    let mut cg = engine(value);
    let input = cg.input();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        input.hover(StateId(2));
        tokio::time::sleep(Duration::from_millis(100)).await;
        input.unhover(StateId(2));
        for state in [1, 3] {
            tokio::time::sleep(Duration::from_millis(500)).await;
            input.click(StateId(state));
        }
    });

    cg.navigate(NavigateOptions::default()).await.unwrap();

    let names: Vec<&str> = cg.log().events().iter().map(|e| e.event.as_str()).collect();
    assert_eq!(names, ["visit", "mouseenter", "mouseleave", "visit", "visit"]);
    let enter = &cg.log().events()[1];
    assert_eq!(enter.state(), Some(StateId(2)));
    assert_eq!(enter.time, 100);
    assert!(cg.scene().hide_states);
    assert!(!cg.scene().hide_edges);
}

#[tokio::test(start_paused = true)]
async fn test_hover_ignored_when_hover_is_off() {
    let mut cg = engine(diamond());
    let input = cg.input();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        input.hover(StateId(2));
        for state in [1, 3] {
            tokio::time::sleep(Duration::from_millis(500)).await;
            input.click(StateId(state));
        }
    });

    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert!(cg.log().events().iter().all(|e| e.event == "visit"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_rejects_pending_wait() {
    let mut cg = engine(diamond());
    let cancel = cg.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let err = cg.navigate(NavigateOptions::default()).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(cg.pending_listeners(), 0);
    assert_eq!(visits(&cg), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_steps_ends_navigation() {
    let mut value = diamond();
    value["hover_rewards"] = json!(true);
    let mut cg = engine(value);
    let input = cg.input();
    let cancel = cg.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        input.click(StateId(1));
        // Lands inside the pause that follows an accepted step.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        input.hover(StateId(2));
        tokio::time::sleep(Duration::from_millis(300)).await;
        input.click(StateId(3));
    });

    let err = cg.navigate(NavigateOptions::default()).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(visits(&cg), vec![0, 1]);
    assert_eq!(cg.score(), 2.0);
    assert_eq!(cg.pending_listeners(), 0);
    assert!(cg.log().events().iter().all(|e| e.event == "visit"));
}

#[tokio::test(start_paused = true)]
async fn test_engine_is_usable_after_a_cancelled_navigation() {
    let mut cg = engine(diamond());
    let cancel = cg.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    assert!(cg.navigate(NavigateOptions::default()).await.is_err());

    clicker(cg.input(), vec![1, 3]);
    cg.navigate(NavigateOptions::default()).await.unwrap();

    assert_eq!(cg.score(), 7.0);
}

#[tokio::test(start_paused = true)]
async fn test_goal_override_lasts_one_navigation() {
    let (mut cg, mount) = watched(diamond());
    let seen = Arc::new(Mutex::new(None));
    let input = cg.input();
    let (watch, record) = (Arc::clone(&mount), Arc::clone(&seen));
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        {
            let mount = watch.lock();
            let frame = mount.frame().unwrap();
            *record.lock() = Some((frame.node(StateId(1)).unwrap().goal, frame.node(StateId(3)).unwrap().goal));
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        input.click(StateId(1));
    });

    let options = NavigateOptions { goal: Some(StateId(1)), ..Default::default() };
    cg.navigate(options).await.unwrap();

    assert_eq!(visits(&cg), vec![0, 1]);
    assert_eq!(*seen.lock(), Some((true, false)), "override shown while navigating");
    assert_eq!(cg.trial_state().goal(), Some(StateId(3)));
    let mount = mount.lock();
    let frame = mount.frame().unwrap();
    assert!(frame.node(StateId(3)).unwrap().goal);
    assert!(!frame.node(StateId(1)).unwrap().goal);
}

#[tokio::test(start_paused = true)]
async fn test_score_pops_expire_while_waiting() {
    let (mut cg, mount) = watched(diamond());
    clicker(cg.input(), vec![1, 3]);
    cg.navigate(NavigateOptions::default()).await.unwrap();
    assert_eq!(mount.lock().frame().unwrap().pops.len(), 2);

    let seen = Arc::new(Mutex::new(None));
    let input = cg.input();
    let (watch, record) = (Arc::clone(&mount), Arc::clone(&seen));
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        *record.lock() = watch.lock().frame().map(|f| f.pops.len());
        input.press_button();
    });
    cg.wait_for_button("continue").await.unwrap();

    assert_eq!(*seen.lock(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_pause_takes_down_expired_pops() {
    let (mut cg, mount) = watched(diamond());
    clicker(cg.input(), vec![1, 3]);
    cg.navigate(NavigateOptions::default()).await.unwrap();

    cg.pause(Duration::from_millis(1200)).await.unwrap();

    assert!(mount.lock().frame().unwrap().pops.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_hover_all_nudges_then_completes() {
    let mut cg = engine(diamond());
    let input = cg.input();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        for state in 0..4 {
            input.hover(StateId(state));
        }
    });

    cg.wait_for_hover_all((0..4).map(StateId), Some("Hover over every circle".into()))
        .await
        .unwrap();

    assert_eq!(cg.scene().message.as_deref(), Some("Hover over every circle"));
    let names: Vec<&str> = cg.log().events().iter().map(|e| e.event.as_str()).collect();
    assert_eq!(names[0], "hover_nudge");
    assert_eq!(names.iter().filter(|n| **n == "mouseenter").count(), 4);
    assert_eq!(cg.pending_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_finish_clears_mount_and_builds_record() {
    let mut cg = engine(diamond());
    clicker(cg.input(), vec![1, 3]);
    cg.navigate(NavigateOptions::default()).await.unwrap();

    let (record, mount) = cg.finish();

    assert!(mount.is_cleared());
    assert_eq!(record.trial.start, Some(StateId(0)));
    assert_eq!(record.trial.reward, vec![0.0, 2.0, -1.0, 5.0]);
    assert_eq!(record.events_named("visit").count(), 3);
    let times: Vec<u64> = record.events.iter().map(|e| e.time).collect();
    assert_eq!(times, vec![0, 500, 1000]);
}

// ============================================================================
// 6. Property: random participants never break the trial's rules
// ============================================================================

mod random_clicks {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_every_visit_follows_an_edge(clicks in prop::collection::vec(0usize..4, 0..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            runtime.block_on(async {
                let mut value = diamond();
                value["goal"] = Value::Null;
                value["n_steps"] = json!(4);
                let mut cg = engine(value);
                let original = [0.0, 2.0, -1.0, 5.0];
                clicker(cg.input(), clicks);

                let _ = tokio::time::timeout(
                    Duration::from_secs(60),
                    cg.navigate(NavigateOptions::default()),
                )
                .await;

                let path = visits(&cg);
                prop_assert_eq!(path[0], 0);
                prop_assert!(path.len() <= 5);
                for pair in path.windows(2) {
                    prop_assert!(cg.graph().is_successor(StateId(pair[0]), StateId(pair[1])));
                }
                let mut seen = std::collections::HashSet::new();
                seen.insert(0);
                let expected: f64 = path[1..]
                    .iter()
                    .filter(|s| seen.insert(**s))
                    .map(|s| original[*s])
                    .sum();
                prop_assert_eq!(cg.score(), expected);
                Ok(())
            })?;
        }
    }
}
