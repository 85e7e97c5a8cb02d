//! Background request handling
//!
//! A [`RequestHandler`] drains the request log through a consumer group,
//! hands each request to a [`HumanOperator`] and publishes the answer. It
//! runs until its cancellation token fires; requests it holds at that point
//! go back to the group for a future consumer.

use crate::broker::{ClaimedRequest, EscalationBroker, DEFAULT_CONSUMER_GROUP};
use crate::error::{BrokerError, OperatorError};
use crate::message::{HumanRequest, HumanResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default wait of one claim round
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default pause after an operator error
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Whoever answers escalated questions (a terminal, a chat bridge, a test)
#[async_trait]
pub trait HumanOperator: Send + Sync {
    /// Answer one request
    ///
    /// # Errors
    /// - `OperatorError::Closed` when the operator is gone; the handler stops
    /// - any other error releases the request for a later attempt
    async fn answer(&self, request: &HumanRequest) -> Result<String, OperatorError>;
}

/// Counters of one handler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// Requests claimed from the group
    pub claimed: usize,
    /// Requests answered and acknowledged
    pub answered: usize,
    /// Requests handed back to the group
    pub released: usize,
    /// Operator errors
    pub failed: usize,
}

/// Why one request did not get answered
enum Interrupted {
    Cancelled,
    OperatorClosed,
}

/// Always-running consumer of the request log
pub struct RequestHandler {
    broker: Arc<dyn EscalationBroker>,
    operator: Arc<dyn HumanOperator>,
    group: String,
    consumer: String,
    poll_interval: Duration,
    retry_delay: Duration,
}

impl RequestHandler {
    /// Create handler in [`DEFAULT_CONSUMER_GROUP`] with a fresh consumer name
    #[must_use]
    pub fn new(broker: Arc<dyn EscalationBroker>, operator: Arc<dyn HumanOperator>) -> Self {
        Self {
            broker,
            operator,
            group: DEFAULT_CONSUMER_GROUP.to_string(),
            consumer: format!("consumer_{}", Uuid::new_v4()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// With consumer group
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// With consumer name
    #[must_use]
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// With claim round wait
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// With pause after operator errors
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Consumer name within the group
    #[must_use]
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Run on a new task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<HandlerStats, BrokerError>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Drain requests until cancelled or the operator closes
    ///
    /// # Errors
    /// Returns the broker error that stopped the handler
    pub async fn run(&self, cancel: CancellationToken) -> Result<HandlerStats, BrokerError> {
        let mut stats = HandlerStats::default();
        tracing::info!(group = %self.group, consumer = %self.consumer, "request handler started");

        loop {
            let batch = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                claimed = self.broker.claim_requests(&self.group, &self.consumer, self.poll_interval) => claimed?,
            };
            stats.claimed += batch.len();

            let mut batch = batch.into_iter();
            while let Some(claimed) = batch.next() {
                let handled = match self.handle(&claimed, &cancel, &mut stats).await {
                    Ok(handled) => handled,
                    Err(e) => {
                        tracing::error!(consumer = %self.consumer, error = %e, "broker failed, releasing unhandled requests");
                        for rest in batch.by_ref() {
                            if let Err(release) = self.release(&rest, &mut stats).await {
                                tracing::warn!(entry = %rest.entry, error = %release, "cannot release request");
                            }
                        }
                        return Err(e);
                    }
                };
                if let Err(interrupted) = handled {
                    self.release(&claimed, &mut stats).await?;
                    for rest in batch.by_ref() {
                        self.release(&rest, &mut stats).await?;
                    }
                    if matches!(interrupted, Interrupted::OperatorClosed) {
                        tracing::warn!(consumer = %self.consumer, "operator closed, stopping request handler");
                    }
                    return Ok(self.stopped(stats));
                }
            }
        }

        Ok(self.stopped(stats))
    }

    /// Answer one claimed request
    ///
    /// The outer `Result` carries broker failures; the inner one reports a
    /// request the handler still holds and must release.
    async fn handle(
        &self,
        claimed: &ClaimedRequest,
        cancel: &CancellationToken,
        stats: &mut HandlerStats,
    ) -> Result<Result<(), Interrupted>, BrokerError> {
        let request = &claimed.request;
        tracing::info!(
            request_id = %request.request_id,
            scenario_id = request.scenario_id.as_deref().unwrap_or("-"),
            "surfacing human request"
        );

        let answer = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Err(Interrupted::Cancelled)),
            answer = self.operator.answer(request) => answer,
        };

        match answer {
            Ok(text) => {
                let response = HumanResponse::new(request.request_id, text);
                if let Err(e) = self.broker.publish_response(&response).await {
                    self.release(claimed, stats).await?;
                    return Err(e);
                }
                self.broker.ack(&self.group, claimed.entry).await?;
                stats.answered += 1;
                Ok(Ok(()))
            }
            Err(OperatorError::Closed) => Ok(Err(Interrupted::OperatorClosed)),
            Err(e) => {
                tracing::warn!(request_id = %request.request_id, error = %e, "operator failed, releasing request");
                stats.failed += 1;
                self.release(claimed, stats).await?;

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(self.retry_delay) => {}
                }
                Ok(Ok(()))
            }
        }
    }

    async fn release(&self, claimed: &ClaimedRequest, stats: &mut HandlerStats) -> Result<(), BrokerError> {
        self.broker.release(&self.group, claimed.entry).await?;
        stats.released += 1;
        Ok(())
    }

    fn stopped(&self, stats: HandlerStats) -> HandlerStats {
        tracing::info!(
            consumer = %self.consumer,
            answered = stats.answered,
            released = stats.released,
            "request handler stopped"
        );
        stats
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Resolve operator input against the offered options
///
/// Without options any input is accepted. With options the input must be a
/// 1-based index or one of the options verbatim.
///
/// # Errors
/// `OperatorError::InvalidChoice` when the input selects no option
pub fn resolve_choice(input: &str, options: Option<&[String]>) -> Result<String, OperatorError> {
    let input = input.trim();
    let Some(options) = options.filter(|o| !o.is_empty()) else {
        return Ok(input.to_string());
    };

    if let Ok(index) = input.parse::<usize>() {
        if (1..=options.len()).contains(&index) {
            return Ok(options[index - 1].clone());
        }
    }
    options
        .iter()
        .find(|option| option.as_str() == input)
        .cloned()
        .ok_or_else(|| OperatorError::InvalidChoice(input.to_string()))
}
