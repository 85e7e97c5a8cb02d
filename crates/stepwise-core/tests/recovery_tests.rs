use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stepwise_core::{
    allowed_transitions, validate_transition, ActionFingerprint, Escalation, RecoveryError,
    RecoveryPolicy, RecoveryProcedure, Scenario, ScenarioContext, ScenarioStatus, Step,
    StepStatus,
};
use stepwise_escalation::{
    CallHumanTool, CancellationToken, HumanOperator, HumanRequest, InMemoryBroker, OperatorError,
    RequestHandler,
};
use stepwise_test_utils::{
    params, suggest, FakeEnvironment, ScriptedAdvisor, ScriptedScenario, StepScript, FAIL_TOOL,
    SET_FLAG_TOOL,
};

const HUMAN_TOOL: &str = "CallHumanTool";

fn only_step(scenario: &ScriptedScenario) -> Box<dyn Step<FakeEnvironment>> {
    scenario
        .build_steps(&params(json!({})))
        .unwrap()
        .pop()
        .unwrap()
}

fn failed_step(name: &str) -> Box<dyn Step<FakeEnvironment>> {
    only_step(&ScriptedScenario::new("test").with_step(StepScript::failing(name)))
}

fn escalating_step(broker: &Arc<InMemoryBroker>) -> Box<dyn Step<FakeEnvironment>> {
    only_step(
        &ScriptedScenario::new("test")
            .with_step(StepScript::failing("book"))
            .with_tool(HUMAN_TOOL, Arc::new(CallHumanTool::new(broker.clone()))),
    )
}

fn ask_human() -> stepwise_core::AdvisoryDecision {
    suggest(HUMAN_TOOL, json!({"question_to_human": "Which room?"}))
}

/// Picks the first room every time
struct FirstRoomOperator;

#[async_trait]
impl HumanOperator for FirstRoomOperator {
    async fn answer(&self, _request: &HumanRequest) -> Result<String, OperatorError> {
        Ok("1405".to_string())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_verify_success_is_idempotent() {
    let ctx = ScenarioContext::new("cmd", params(json!({})));
    let mut env = FakeEnvironment::new("https://site");
    let mut step = failed_step("book");

    assert!(!step.execute(&ctx, &mut env).await.unwrap());
    let first = step.verify_success(&ctx, &env).await.unwrap();
    let second = step.verify_success(&ctx, &env).await.unwrap();
    assert_eq!(first, second);

    env.set_flag("book", true);
    assert!(step.verify_success(&ctx, &env).await.unwrap());
    assert!(step.verify_success(&ctx, &env).await.unwrap());
}

#[tokio::test]
async fn test_history_without_successes() {
    let ctx = ScenarioContext::new("cmd", params(json!({})));
    let mut env = FakeEnvironment::new("https://site");
    let mut step = failed_step("book");
    step.execute(&ctx, &mut env).await.unwrap();
    step.state_mut()
        .invoke(SET_FLAG_TOOL, &params(json!({"flag": "other"})), &mut env, None)
        .await
        .unwrap();
    step.state_mut().set_status(StepStatus::Retrying);

    let full = step.render_history(true);
    let failures = step.render_history(false);

    assert!(full.contains("Total executions: 2"));
    assert!(full.contains("Success rate: 50.0%"));
    assert!(full.contains(SET_FLAG_TOOL));
    assert!(failures.contains("Total executions: 2"));
    assert!(failures.contains(FAIL_TOOL));
    assert!(!failures.contains(SET_FLAG_TOOL));
    assert!(failures.contains("env_address: https://site"));
}

#[tokio::test]
async fn test_alternating_actions_run_until_budget() {
    let advisor = ScriptedAdvisor::new([
        suggest(FAIL_TOOL, json!({})),
        suggest(SET_FLAG_TOOL, json!({"flag": "x"})),
        suggest(FAIL_TOOL, json!({})),
        suggest(SET_FLAG_TOOL, json!({"flag": "y"})),
    ]);
    let ctx = ScenarioContext::new("cmd", params(json!({})));
    let mut env = FakeEnvironment::new("https://site");
    let mut step = failed_step("book");

    let err = RecoveryProcedure::new(&advisor, RecoveryPolicy::new(4, 2))
        .run(&mut *step, &ctx, &mut env)
        .await
        .unwrap_err();

    assert!(matches!(err, RecoveryError::BudgetExhausted { attempts: 4 }));
    assert_eq!(advisor.calls(), 4);
    assert_eq!(step.state().history().len(), 5);
}

#[tokio::test]
async fn test_missing_parameter_is_recorded_and_retried() {
    let advisor = ScriptedAdvisor::new([
        suggest(SET_FLAG_TOOL, json!({"flg": "book"})),
        suggest(SET_FLAG_TOOL, json!({"flag": "book"})),
    ]);
    let ctx = ScenarioContext::new("cmd", params(json!({})));
    let mut env = FakeEnvironment::new("https://site");
    let mut step = failed_step("book");

    let report = RecoveryProcedure::new(&advisor, RecoveryPolicy::default())
        .run(&mut *step, &ctx, &mut env)
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(advisor.calls(), 2);
    assert!(env.flag("book"));
    let history = step.render_history(false);
    assert!(history.contains("missing required parameter `flag`"));
    assert!(history.contains("Recovery attempt 1: FAILURE"));
}

#[tokio::test]
async fn test_escalation_without_question_is_retried() {
    let broker = Arc::new(InMemoryBroker::new());
    let advisor = ScriptedAdvisor::new([
        suggest(HUMAN_TOOL, json!({"options": ["1405"]})),
        suggest(SET_FLAG_TOOL, json!({"flag": "book"})),
    ]);
    let escalation = Escalation::new(broker.clone()).with_timeout(Duration::from_secs(1));
    let ctx = ScenarioContext::new("cmd", params(json!({})));
    let mut env = FakeEnvironment::new("https://site");
    let mut step = escalating_step(&broker);

    let report = RecoveryProcedure::new(&advisor, RecoveryPolicy::default())
        .with_escalation(Some(&escalation))
        .run(&mut *step, &ctx, &mut env)
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.escalations, 1);
    assert_eq!(broker.stats().requests, 0);
    assert!(step
        .render_history(false)
        .contains("missing required parameter `question_to_human`"));
}

#[tokio::test]
async fn test_human_answer_resets_repeat_detection() {
    let broker = Arc::new(InMemoryBroker::new());
    let cancel = CancellationToken::new();
    let handler = RequestHandler::new(broker.clone(), Arc::new(FirstRoomOperator))
        .with_poll_interval(Duration::from_millis(20))
        .spawn(cancel.clone());

    let advisor = ScriptedAdvisor::new([
        suggest(FAIL_TOOL, json!({})),
        suggest(FAIL_TOOL, json!({})),
        ask_human(),
        suggest(FAIL_TOOL, json!({})),
        suggest(FAIL_TOOL, json!({})),
        suggest(SET_FLAG_TOOL, json!({"flag": "book"})),
    ]);
    let escalation = Escalation::new(broker.clone()).with_timeout(Duration::from_secs(5));
    let ctx = ScenarioContext::new("cmd", params(json!({})));
    let mut env = FakeEnvironment::new("https://site");
    let mut step = escalating_step(&broker);

    let result = RecoveryProcedure::new(&advisor, RecoveryPolicy::new(12, 3))
        .with_escalation(Some(&escalation))
        .run(&mut *step, &ctx, &mut env)
        .await;
    cancel.cancel();
    let stats = handler.await.unwrap().unwrap();

    let report = result.unwrap();
    assert_eq!(stats.answered, 1);
    assert_eq!(report.attempts, 6);
    assert_eq!(report.escalations, 1);
    assert_eq!(advisor.calls(), 6);
    assert!(step.render_history(true).contains("Human answered: \"1405\""));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_escalation_keeps_repeat_count() {
    let broker = Arc::new(InMemoryBroker::new());
    let advisor = ScriptedAdvisor::new([
        suggest(FAIL_TOOL, json!({})),
        suggest(FAIL_TOOL, json!({})),
        ask_human(),
        suggest(FAIL_TOOL, json!({})),
        suggest(SET_FLAG_TOOL, json!({"flag": "book"})),
    ]);
    let escalation = Escalation::new(broker.clone()).with_timeout(Duration::from_secs(1));
    let ctx = ScenarioContext::new("cmd", params(json!({})));
    let mut env = FakeEnvironment::new("https://site");
    let mut step = escalating_step(&broker);

    let err = RecoveryProcedure::new(&advisor, RecoveryPolicy::new(12, 3))
        .with_escalation(Some(&escalation))
        .run(&mut *step, &ctx, &mut env)
        .await
        .unwrap_err();

    assert!(matches!(err, RecoveryError::StuckLoop { ref tool, repeats: 3 } if tool == FAIL_TOOL));
    assert_eq!(advisor.calls(), 4);
    assert_eq!(broker.stats().requests, 1);
    assert!(!env.flag("book"));
}

proptest! {
    #[test]
    fn prop_transitions_match_table(
        from in prop::sample::select(ScenarioStatus::ALL.to_vec()),
        to in prop::sample::select(ScenarioStatus::ALL.to_vec()),
    ) {
        let allowed = allowed_transitions(from);
        prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
        if from.is_terminal() {
            prop_assert!(allowed.is_empty());
        }
    }

    #[test]
    fn prop_fingerprint_ignores_key_order(
        entries in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8),
    ) {
        let mut forward = serde_json::Map::new();
        for (key, value) in &entries {
            forward.insert(key.clone(), json!(value));
        }
        let mut backward = serde_json::Map::new();
        for (key, value) in entries.iter().rev() {
            backward.insert(key.clone(), json!(value));
        }
        prop_assert_eq!(
            ActionFingerprint::of("Tool", &forward),
            ActionFingerprint::of("Tool", &backward)
        );
    }

    #[test]
    fn prop_advisory_calls_bounded_by_budget(max_total in 1u32..10, consecutive in 1u32..5) {
        let advisor = ScriptedAdvisor::repeating(suggest(FAIL_TOOL, json!({})));
        let ctx = ScenarioContext::new("cmd", params(json!({})));

        let result = runtime().block_on(async {
            let mut env = FakeEnvironment::new("https://site");
            let mut step = failed_step("book");
            RecoveryProcedure::new(&advisor, RecoveryPolicy::new(max_total, consecutive))
                .run(&mut *step, &ctx, &mut env)
                .await
        });

        let calls = u32::try_from(advisor.calls()).unwrap();
        prop_assert!(calls <= max_total);
        prop_assert!(result.is_err());
        // a limit of one still lets the first suggestion run
        prop_assert_eq!(calls, consecutive.max(2).min(max_total));
    }
}
