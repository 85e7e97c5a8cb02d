use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use stepwise_escalation::{
    call_human, BrokerError, CallHumanTool, CancellationToken, ClaimedRequest, EntryId,
    EscalationBroker, HumanOperator, HumanRequest, HumanResponse, InMemoryBroker, OperatorError,
    RequestHandler, DEFAULT_CONSUMER_GROUP,
};
use stepwise_tools::{Environment, Tool, ToolParams};
use tokio::sync::Notify;

/// Answers every request with `answer:<question>`
struct EchoOperator {
    seen: Mutex<Vec<HumanRequest>>,
}

impl EchoOperator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HumanOperator for EchoOperator {
    async fn answer(&self, request: &HumanRequest) -> Result<String, OperatorError> {
        self.seen.lock().push(request.clone());
        Ok(format!("answer:{}", request.question))
    }
}

/// Never answers; signals when a request reached it
struct StalledOperator {
    reached: Notify,
}

#[async_trait]
impl HumanOperator for StalledOperator {
    async fn answer(&self, _request: &HumanRequest) -> Result<String, OperatorError> {
        self.reached.notify_one();
        std::future::pending().await
    }
}

struct ClosedOperator;

#[async_trait]
impl HumanOperator for ClosedOperator {
    async fn answer(&self, _request: &HumanRequest) -> Result<String, OperatorError> {
        Err(OperatorError::Closed)
    }
}

/// In-memory broker whose acknowledgements fail
struct AckFailingBroker {
    inner: Arc<InMemoryBroker>,
}

#[async_trait]
impl EscalationBroker for AckFailingBroker {
    async fn publish_request(&self, request: &HumanRequest) -> Result<EntryId, BrokerError> {
        self.inner.publish_request(request).await
    }

    async fn publish_response(&self, response: &HumanResponse) -> Result<EntryId, BrokerError> {
        self.inner.publish_response(response).await
    }

    async fn claim_requests(
        &self,
        group: &str,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Vec<ClaimedRequest>, BrokerError> {
        self.inner.claim_requests(group, consumer, max_wait).await
    }

    async fn ack(&self, _group: &str, _entry: EntryId) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("ack rejected".into()))
    }

    async fn release(&self, group: &str, entry: EntryId) -> Result<(), BrokerError> {
        self.inner.release(group, entry).await
    }

    async fn find_response(&self, request_id: uuid::Uuid) -> Result<Option<HumanResponse>, BrokerError> {
        self.inner.find_response(request_id).await
    }

    async fn await_response(
        &self,
        request_id: uuid::Uuid,
        timeout: Duration,
    ) -> Result<Option<HumanResponse>, BrokerError> {
        self.inner.await_response(request_id, timeout).await
    }
}

struct NullEnv;

#[async_trait]
impl Environment for NullEnv {
    fn current_address(&self) -> String {
        String::new()
    }

    async fn describe_state(&self) -> String {
        String::new()
    }
}

#[tokio::test]
async fn responses_reach_only_their_own_waiter() {
    let broker = Arc::new(InMemoryBroker::new());
    let cancel = CancellationToken::new();
    let handler = RequestHandler::new(broker.clone(), EchoOperator::new())
        .with_poll_interval(Duration::from_millis(20))
        .spawn(cancel.clone());

    let questions = ["first", "second", "third"];
    let waiters: Vec<_> = questions
        .iter()
        .map(|question| {
            let broker = broker.clone();
            let question = (*question).to_string();
            tokio::spawn(async move {
                let scenario = format!("run-{question}");
                call_human(
                    broker.as_ref(),
                    &question,
                    None,
                    Some(&scenario),
                    Duration::from_secs(5),
                )
                .await
                .map(|answer| (question, answer.response))
            })
        })
        .collect();

    for waiter in waiters {
        let (question, response) = waiter.await.unwrap().unwrap();
        assert_eq!(response, format!("answer:{question}"));
    }

    cancel.cancel();
    let stats = handler.await.unwrap().unwrap();
    assert_eq!(stats.answered, 3);
}

#[tokio::test(start_paused = true)]
async fn waiter_ignores_foreign_responses() {
    let broker = InMemoryBroker::new();
    let request = HumanRequest::new("mine?");
    broker.publish_request(&request).await.unwrap();

    broker
        .publish_response(&HumanResponse::new(uuid::Uuid::new_v4(), "not yours"))
        .await
        .unwrap();

    let seen = broker
        .await_response(request.request_id, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(seen, None);
}

#[tokio::test]
async fn competing_consumers_split_requests() {
    let broker = Arc::new(InMemoryBroker::new());
    for i in 0..6 {
        broker
            .publish_request(&HumanRequest::new(format!("q{i}")))
            .await
            .unwrap();
    }

    let first = EchoOperator::new();
    let second = EchoOperator::new();
    let cancel = CancellationToken::new();
    let handlers = vec![
        RequestHandler::new(broker.clone(), first.clone())
            .with_consumer("c1")
            .with_poll_interval(Duration::from_millis(20))
            .spawn(cancel.clone()),
        RequestHandler::new(broker.clone(), second.clone())
            .with_consumer("c2")
            .with_poll_interval(Duration::from_millis(20))
            .spawn(cancel.clone()),
    ];

    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.stats().responses < 6 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    for handler in handlers {
        handler.await.unwrap().unwrap();
    }

    let mut delivered: HashMap<String, usize> = HashMap::new();
    for request in first.seen.lock().iter().chain(second.seen.lock().iter()) {
        *delivered.entry(request.question.clone()).or_default() += 1;
    }
    assert_eq!(delivered.len(), 6);
    assert!(delivered.values().all(|count| *count == 1));
    assert_eq!(broker.stats().pending, 0);
}

#[tokio::test]
async fn cancellation_releases_in_flight_request() {
    let broker = Arc::new(InMemoryBroker::new());
    let request = HumanRequest::new("still there?");
    broker.publish_request(&request).await.unwrap();

    let operator = Arc::new(StalledOperator {
        reached: Notify::new(),
    });
    let cancel = CancellationToken::new();
    let handler = RequestHandler::new(broker.clone(), operator.clone())
        .with_poll_interval(Duration::from_millis(20))
        .spawn(cancel.clone());

    operator.reached.notified().await;
    cancel.cancel();
    let stats = handler.await.unwrap().unwrap();
    assert_eq!(stats.released, 1);
    assert_eq!(stats.answered, 0);

    // The request survives for the next consumer
    let answerer = EchoOperator::new();
    let cancel = CancellationToken::new();
    let next = RequestHandler::new(broker.clone(), answerer.clone())
        .with_poll_interval(Duration::from_millis(20))
        .spawn(cancel.clone());

    let answer = broker
        .await_response(request.request_id, Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer.response, "answer:still there?");

    cancel.cancel();
    next.await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_operator_stops_handler_and_releases() {
    let broker = Arc::new(InMemoryBroker::new());
    broker.publish_request(&HumanRequest::new("a")).await.unwrap();
    broker.publish_request(&HumanRequest::new("b")).await.unwrap();

    let stats = RequestHandler::new(broker.clone(), Arc::new(ClosedOperator))
        .with_poll_interval(Duration::from_millis(20))
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.claimed, 2);
    assert_eq!(stats.released, 2);
    assert_eq!(broker.stats().pending, 0);
}

#[tokio::test(start_paused = true)]
async fn call_human_tool_reports_timeout_as_failure() {
    let broker = Arc::new(InMemoryBroker::new());
    let tool = CallHumanTool::new(broker.clone()).with_timeout(Duration::from_secs(1));

    let mut params = ToolParams::new();
    params.insert("question_to_human".into(), "Pick a room".into());
    let response = Tool::<NullEnv>::execute(&tool, &mut NullEnv, &params)
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Timeout waiting for human response")
    );
    assert!(response.meta.contains_key("request_id"));
    assert_eq!(broker.stats().requests, 1);
}

#[test]
fn call_human_tool_declares_escalation() {
    let broker: Arc<dyn EscalationBroker> = Arc::new(InMemoryBroker::new());
    let tool = CallHumanTool::new(broker);

    assert!(Tool::<NullEnv>::is_human_escalation(&tool));
    let spec = Tool::<NullEnv>::spec(&tool);
    let names: HashSet<_> = spec.params.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains("question_to_human"));
    assert!(names.contains("options"));
}

#[tokio::test]
async fn broker_failure_releases_rest_of_batch() {
    let inner = Arc::new(InMemoryBroker::new());
    inner.publish_request(&HumanRequest::new("first")).await.unwrap();
    inner.publish_request(&HumanRequest::new("second")).await.unwrap();
    let broker = Arc::new(AckFailingBroker {
        inner: inner.clone(),
    });

    let err = RequestHandler::new(broker, EchoOperator::new())
        .with_poll_interval(Duration::from_millis(20))
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Unavailable(_)));

    // the answered entry stays pending, the untouched one goes back to the group
    assert_eq!(inner.stats().pending, 1);
    let again = inner
        .claim_requests(DEFAULT_CONSUMER_GROUP, "next", Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].request.question, "second");
}
