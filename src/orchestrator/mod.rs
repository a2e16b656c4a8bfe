//! Search orchestration
//!
//! Expands a request into date pairs, runs workers in strictly sequential
//! batches with a per-batch concurrency cap, aggregates completions as
//! they land, re-analyzes after every completion, and always emits a
//! terminal snapshot.
//!
//! Settle semantics: one worker's failure never cancels its siblings. The
//! final `progressive_results{is_complete:true}` is emitted on this task
//! after every worker future has drained, so it is last by construction.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{error, info, warn};
use std::sync::Arc;

use crate::analyzer::ProgressiveAnalyzer;
use crate::model::{
    Aggregate, DatePair, FailureKind, RequestError, SearchRequest, WorkerFailure,
    expand_date_pairs,
};
use crate::search_events::SearchEvent;
use crate::worker::{Worker, WorkerContext};

/// Final counters for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Fan-out orchestrator for one search request.
pub struct SearchOrchestrator {
    ctx: Arc<WorkerContext>,
    analyzer: ProgressiveAnalyzer,
}

impl SearchOrchestrator {
    #[must_use]
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        let analyzer = ProgressiveAnalyzer::new(Arc::clone(&ctx.vision));
        Self { ctx, analyzer }
    }

    /// Run the request to completion.
    ///
    /// The subscriber's stream always terminates in either a terminal
    /// `error` event (invalid request) or a final
    /// `progressive_results{is_complete:true}` once any worker succeeded.
    pub async fn run(&self, request: &SearchRequest) -> Result<SearchOutcome, RequestError> {
        let pairs = match expand_date_pairs(request) {
            Ok(pairs) => pairs,
            Err(e) => {
                error!("Request expansion failed: {e}");
                let _ = self
                    .ctx
                    .events
                    .publish(SearchEvent::error(format!("configuration: {e}")));
                return Err(e);
            }
        };

        let request_id = uuid::Uuid::new_v4();
        let total = pairs.len();
        info!(
            "Request {request_id}: searching {} -> {}, {total} date pairs, batches of {}",
            request.from(),
            request.to(),
            self.ctx.config.concurrency_limit
        );
        let _ = self
            .ctx
            .events
            .publish(SearchEvent::combinations_generated(total));

        let from = request.from().to_string();
        let to = request.to().to_string();
        let mut aggregate = Aggregate::default();

        for batch in pairs.chunks(self.ctx.config.concurrency_limit.max(1)) {
            let mut in_flight = FuturesUnordered::new();
            for pair in batch {
                let worker = Worker::new(
                    pair.clone(),
                    from.clone(),
                    to.clone(),
                    Arc::clone(&self.ctx),
                );
                let handle = tokio::spawn(async move { worker.run().await });
                let pair = pair.clone();
                in_flight.push(async move { (pair, handle.await) });
            }

            while let Some((pair, joined)) = in_flight.next().await {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // A panicked worker is a terminal failure, not a
                        // request failure.
                        error!("Worker {} panicked: {e}", pair.pair_id);
                        Err(WorkerFailure::new(
                            FailureKind::Orchestrator,
                            format!("worker task panicked: {e}"),
                        ))
                    }
                };

                match outcome {
                    Ok(result) => {
                        // Terminal event and its snapshot are published from
                        // this task, so the snapshot always trails the
                        // completions it contains.
                        let _ = self
                            .ctx
                            .events
                            .publish(SearchEvent::minion_completed(&result));
                        aggregate.record_success(result);
                        self.emit_snapshot(&aggregate, total, &from, &to).await;
                    }
                    Err(failure) => {
                        warn!("Worker {} failed terminally: {failure}", pair.pair_id);
                        aggregate.record_failure();
                        let _ = self
                            .ctx
                            .events
                            .publish(SearchEvent::minion_failed_final(&pair, failure.to_string()));
                        // A trailing failure must still unblock the
                        // subscriber with a complete snapshot.
                        if aggregate.processed() == total && !aggregate.is_empty() {
                            self.emit_snapshot(&aggregate, total, &from, &to).await;
                        }
                    }
                }
            }
        }

        // Terminal snapshot, idempotent with the per-completion emissions
        // above. Runs after every worker future has drained.
        if !aggregate.is_empty() {
            self.emit_snapshot(&aggregate, total, &from, &to).await;
        }

        info!(
            "Request {request_id}: finished with {}/{total} completed, {} failed",
            aggregate.completed(),
            aggregate.failed()
        );
        Ok(SearchOutcome {
            total,
            completed: aggregate.completed(),
            failed: aggregate.failed(),
        })
    }

    /// Re-analyze the aggregate and emit one `progressive_results`.
    async fn emit_snapshot(&self, aggregate: &Aggregate, total: usize, from: &str, to: &str) {
        let analysis = self
            .analyzer
            .analyze(aggregate.results(), total, from, to)
            .await;
        let _ = self.ctx.events.publish(SearchEvent::progressive_results(
            total,
            aggregate.completed(),
            aggregate.failed(),
            aggregate.results().to_vec(),
            analysis,
            aggregate.processed() == total,
        ));
    }
}

/// Pairs preview helper for embedding layers that list the search space
/// before streaming.
#[must_use]
pub fn preview_pairs(request: &SearchRequest) -> Result<Vec<DatePair>, RequestError> {
    expand_date_pairs(request)
}
