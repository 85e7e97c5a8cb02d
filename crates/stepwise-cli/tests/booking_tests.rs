use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stepwise_cli::site::{MOVED_ROOMS_URL, ROOMS_URL};
use stepwise_cli::{BookingScenario, BookingSite, LineOperator, ReplayAdvisor, SiteFault};
use stepwise_core::{
    AdvisoryDecision, EngineConfig, EngineError, RecoveryError, ScenarioEngine, ScenarioStatus,
    Step,
};
use stepwise_escalation::{CancellationToken, InMemoryBroker, RequestHandler};
use stepwise_tools::ToolParams;

fn params(value: serde_json::Value) -> ToolParams {
    value.as_object().cloned().unwrap()
}

fn engine(
    broker: &Arc<InMemoryBroker>,
    fault: Option<SiteFault>,
    decisions: Vec<AdvisoryDecision>,
) -> ScenarioEngine<BookingSite> {
    let config = EngineConfig::new().with_escalation_timeout(Duration::from_secs(5));
    ScenarioEngine::new(
        Arc::new(BookingScenario::new(broker.clone()).with_human_timeout(config.escalation_timeout())),
        BookingSite::new().with_fault(fault),
        Arc::new(ReplayAdvisor::new(decisions)),
    )
    .with_config(config)
    .with_escalation(broker.clone())
}

#[tokio::test]
async fn test_books_every_room() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut engine = engine(&broker, None, Vec::new());

    let report = engine
        .execute("book rooms 101 and 204 on 2026-10-22")
        .await
        .unwrap();

    assert_eq!(report.status, ScenarioStatus::Completed);
    assert_eq!(report.steps_completed, 4);
    assert_eq!(report.recoveries, 0);
    assert!(engine.env().is_booked("101", "2026-10-22"));
    assert!(engine.env().is_booked("204", "2026-10-22"));
}

#[tokio::test]
async fn test_password_never_reaches_history() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut engine = engine(&broker, None, Vec::new());

    engine.execute("book room 101 on 2026-10-22").await.unwrap();

    let history = engine.steps()[0].render_history(true);
    assert!(history.contains("FillSecretTool"));
    assert!(history.contains("[REDACTED]"));
    assert!(!history.contains(stepwise_cli::site::DEMO_PASSWORD));
}

#[tokio::test]
async fn test_moved_form_is_recovered() {
    let broker = Arc::new(InMemoryBroker::new());
    let decisions = vec![AdvisoryDecision::new(
        "the booking form moved",
        "NavigateTool",
        params(json!({"url": MOVED_ROOMS_URL})),
    )];
    let mut engine = engine(&broker, Some(SiteFault::Navigate), decisions);

    let report = engine.execute("book room 101 on 2026-10-22").await.unwrap();

    assert_eq!(report.recoveries, 1);
    let history = engine.steps()[1].render_history(false);
    assert!(history.contains(ROOMS_URL));
    assert!(history.contains("404 Not Found"));
    assert!(engine.env().is_booked("101", "2026-10-22"));
}

#[tokio::test]
async fn test_without_advice_the_step_fails() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut engine = engine(&broker, Some(SiteFault::Login), Vec::new());

    let err = engine.execute("book room 101 on 2026-10-22").await.unwrap_err();

    match err {
        EngineError::StepFailed {
            step_index, source, ..
        } => {
            assert_eq!(step_index, 0);
            assert!(matches!(source, RecoveryError::Advisory(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        engine.context().unwrap().status(),
        ScenarioStatus::Failed
    );
}

#[tokio::test]
async fn test_human_answer_unblocks_booking() {
    let broker = Arc::new(InMemoryBroker::new());
    let cancel = CancellationToken::new();
    let handler = RequestHandler::new(broker.clone(), Arc::new(LineOperator::new(&b"1\n"[..], Vec::new())))
        .with_poll_interval(Duration::from_millis(50))
        .spawn(cancel.clone());

    let decisions = vec![
        AdvisoryDecision::new(
            "submit button is missing",
            "CallHumanTool",
            params(json!({
                "question_to_human": "Which button submits the booking?",
                "options": ["#confirm", "#submit"],
            })),
        ),
        AdvisoryDecision::new(
            "human chose #confirm",
            "ClickTool",
            params(json!({"selector": "#confirm"})),
        ),
    ];
    let mut engine = engine(&broker, Some(SiteFault::Booking), decisions);

    let report = engine.execute("book room 101 on 2026-10-22").await.unwrap();
    cancel.cancel();
    let stats = handler.await.unwrap().unwrap();

    assert_eq!(report.recoveries, 1);
    assert_eq!(stats.answered, 1);
    let history = engine.steps()[2].render_history(true);
    assert!(history.contains("Human answered: \"#confirm\""));
    assert!(engine.env().is_booked("101", "2026-10-22"));
}
