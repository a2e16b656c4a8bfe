//! Per-pair search worker
//!
//! One worker drives one remote-browser session end-to-end for one
//! `(dep_date, ret_date)` pair:
//!
//! ```text
//! NEW -> SESSION_CREATING -> CONNECTED -> NAVIGATING -> PROBING <-> SOLVING_CAPTCHA
//!                                                          |
//!                                                     EXTRACTING -> DONE
//!                                                          |
//!                                                        FAILED
//! ```
//!
//! The worker absorbs per-step errors into state transitions; the
//! orchestrator only ever sees a `WorkerResult` or one terminal
//! `WorkerFailure`. The session is closed on every exit path, including
//! deadline cancellation.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::browser::{BrowserConnector, NAVIGATION_DEADLINE, PageDriver};
use crate::captcha::{CaptchaDelegator, CaptchaSidecar, HumanSolveRegistry};
use crate::config::{CaptchaMode, RetryMode, SearchConfig};
use crate::model::{DatePair, FailureKind, WorkerFailure, WorkerResult};
use crate::search_events::{SearchEvent, SearchEventBus};
use crate::session::SessionProvider;
use crate::vision::{ExtractionDriver, PageState, ReadinessProber, VisionModel};

/// Cadence of readiness probes. Probing has no iteration cap; the outer
/// deadline bounds it.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);
/// Backoff after a probe infrastructure failure.
const PROBE_ERROR_BACKOFF: Duration = Duration::from_secs(10);
/// Rendering buffer between extraction and result capture.
const STABILIZATION_PAUSE: Duration = Duration::from_secs(3);

/// Shared services handed to every worker.
///
/// Construction is explicit and happens once per process (or per test);
/// nothing here is ambient.
pub struct WorkerContext {
    pub config: Arc<SearchConfig>,
    pub provider: Arc<dyn SessionProvider>,
    pub connector: Arc<dyn BrowserConnector>,
    pub vision: Arc<dyn VisionModel>,
    pub sidecar: Arc<dyn CaptchaSidecar>,
    pub human_solves: Arc<HumanSolveRegistry>,
    pub events: Arc<SearchEventBus>,
    /// Sessions currently owned by live workers, keyed by pair id. Used
    /// for deadline cleanup and graceful shutdown.
    open_sessions: DashMap<u32, String>,
}

impl WorkerContext {
    #[must_use]
    pub fn new(
        config: Arc<SearchConfig>,
        provider: Arc<dyn SessionProvider>,
        connector: Arc<dyn BrowserConnector>,
        vision: Arc<dyn VisionModel>,
        sidecar: Arc<dyn CaptchaSidecar>,
        human_solves: Arc<HumanSolveRegistry>,
        events: Arc<SearchEventBus>,
    ) -> Self {
        Self {
            config,
            provider,
            connector,
            vision,
            sidecar,
            human_solves,
            events,
            open_sessions: DashMap::new(),
        }
    }

    /// Close every session still registered, bounded by `grace`.
    ///
    /// Called on request cancellation; a session that cannot be closed in
    /// time is abandoned to the provider's own expiry.
    pub async fn close_open_sessions(&self, grace: Duration) {
        let sessions: Vec<(u32, String)> = self
            .open_sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        if sessions.is_empty() {
            return;
        }
        info!("Closing {} in-flight sessions", sessions.len());
        let closes = sessions.iter().map(|(pair_id, session_id)| {
            self.open_sessions.remove(pair_id);
            self.provider.close_session(session_id)
        });
        if tokio::time::timeout(grace, futures::future::join_all(closes))
            .await
            .is_err()
        {
            warn!("Session cleanup exceeded its {grace:?} grace period");
        }
    }

    /// Number of sessions currently owned by live workers.
    #[must_use]
    pub fn open_session_count(&self) -> usize {
        self.open_sessions.len()
    }
}

/// Worker for one date pair.
pub struct Worker {
    pair: DatePair,
    from: String,
    to: String,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    #[must_use]
    pub fn new(pair: DatePair, from: String, to: String, ctx: Arc<WorkerContext>) -> Self {
        Self {
            pair,
            from,
            to,
            ctx,
        }
    }

    /// Run the worker under the configured retry policy.
    ///
    /// Exactly one of `Ok(result)` or `Err(failure)` is produced. Terminal
    /// events are published by the orchestrator on the worker's behalf, so
    /// they serialize with the aggregate snapshots.
    pub async fn run(&self) -> Result<WorkerResult, WorkerFailure> {
        match self.ctx.config.retry_mode {
            RetryMode::Off => self.attempt().await,
            RetryMode::Bounded => self.run_bounded().await,
        }
    }

    /// Deadline-plus-retry variant: each attempt gets a fresh session and
    /// the full wall deadline.
    async fn run_bounded(&self) -> Result<WorkerResult, WorkerFailure> {
        let deadline = self.ctx.config.worker_deadline;
        let attempts = 1 + self.ctx.config.worker_retries;
        let mut last_failure =
            WorkerFailure::new(FailureKind::Orchestrator, "worker never attempted");

        for attempt in 0..attempts {
            match tokio::time::timeout(deadline, self.attempt()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(failure)) => {
                    let retryable = failure.kind.worker_retryable();
                    last_failure = failure;
                    if !retryable {
                        return Err(last_failure);
                    }
                }
                Err(_) => {
                    self.close_registered_session().await;
                    last_failure = WorkerFailure::new(
                        FailureKind::WorkerTimeout,
                        format!("worker exceeded its {deadline:?} deadline"),
                    );
                }
            }
            if attempt + 1 < attempts {
                warn!(
                    "Worker {} attempt {}/{} failed ({}); retrying with a fresh session",
                    self.pair.pair_id,
                    attempt + 1,
                    attempts,
                    last_failure
                );
            }
        }
        Err(last_failure)
    }

    async fn close_registered_session(&self) {
        if let Some((_, session_id)) = self.ctx.open_sessions.remove(&self.pair.pair_id) {
            self.ctx.provider.close_session(&session_id).await;
        }
    }

    /// One full session lifecycle: create, drive, always close.
    async fn attempt(&self) -> Result<WorkerResult, WorkerFailure> {
        debug!("Worker {} creating session", self.pair.pair_id);
        let handle = self
            .ctx
            .provider
            .create_session()
            .await
            .map_err(|e| WorkerFailure::new(e.failure_kind(), e.to_string()))?;

        self.ctx
            .open_sessions
            .insert(self.pair.pair_id, handle.session_id.clone());

        let outcome = self.drive(&handle).await;

        self.ctx.provider.close_session(&handle.session_id).await;
        self.ctx.open_sessions.remove(&self.pair.pair_id);
        outcome
    }

    /// CONNECTED through DONE, against an open session.
    async fn drive(
        &self,
        handle: &crate::session::SessionHandle,
    ) -> Result<WorkerResult, WorkerFailure> {
        let driver = self.ctx.connector.attach(handle).await.map_err(|e| {
            WorkerFailure::new(
                FailureKind::ProviderTransient,
                format!("network: failed to attach to session: {e}"),
            )
        })?;

        let _ = self.ctx.events.publish(SearchEvent::session_created(
            &self.pair,
            handle.session_id.clone(),
            handle.live_view_url.clone(),
        ));

        // NAVIGATING: timeouts are tolerated; the probe loop decides what
        // the page actually holds.
        let url = self.search_url();
        if let Err(e) = driver.navigate(&url, NAVIGATION_DEADLINE).await {
            warn!(
                "Worker {} navigation did not settle ({e}); probing anyway",
                self.pair.pair_id
            );
        }

        self.probe_until_ready(driver.as_ref(), handle.live_view_url.clone())
            .await
    }

    /// PROBING / SOLVING_CAPTCHA / EXTRACTING.
    async fn probe_until_ready(
        &self,
        driver: &dyn PageDriver,
        live_view_url: Option<String>,
    ) -> Result<WorkerResult, WorkerFailure> {
        let prober = ReadinessProber::new(Arc::clone(&self.ctx.vision));
        let delegator = CaptchaDelegator::new(
            Arc::clone(&self.ctx.sidecar),
            Arc::clone(&self.ctx.events),
            self.ctx.config.max_iter_captcha,
        );

        loop {
            let verdict = match prober.probe(driver).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(
                        "Worker {} probe failed ({e}); backing off {PROBE_ERROR_BACKOFF:?}",
                        self.pair.pair_id
                    );
                    tokio::time::sleep(PROBE_ERROR_BACKOFF).await;
                    continue;
                }
            };

            debug!(
                "Worker {} probe: {:?} (ready={}, confidence={:.2})",
                self.pair.pair_id, verdict.page_state, verdict.is_ready, verdict.confidence
            );

            match verdict.page_state {
                PageState::ResultsReady if verdict.is_ready => {
                    return self.extract(driver).await;
                }
                PageState::Error => {
                    // The model may misread a dense results page as an
                    // error; extraction is still worth one attempt.
                    info!(
                        "Worker {} sees an error page; attempting extraction anyway",
                        self.pair.pair_id
                    );
                    return self.extract(driver).await;
                }
                PageState::NoResults => {
                    info!("Worker {} found no results", self.pair.pair_id);
                    return Ok(WorkerResult::completed(&self.pair, Vec::new()));
                }
                PageState::Captcha => {
                    let solved = match self.ctx.config.captcha_mode {
                        CaptchaMode::Ai => delegator.resolve(driver, self.pair.pair_id).await,
                        CaptchaMode::Human => {
                            delegator
                                .resolve_human(
                                    self.pair.pair_id,
                                    live_view_url.clone(),
                                    &self.ctx.human_solves,
                                    self.ctx.config.human_solve_timeout,
                                )
                                .await
                        }
                    };
                    // Solved or not, return to probing: an unsolved CAPTCHA
                    // may clear passively, and the outer deadline owns the
                    // worst case.
                    if !solved {
                        warn!(
                            "Worker {} CAPTCHA unresolved; continuing to probe",
                            self.pair.pair_id
                        );
                    }
                }
                PageState::Loading | PageState::Unknown | PageState::ResultsReady => {
                    tokio::time::sleep(PROBE_INTERVAL).await;
                }
            }
        }
    }

    /// EXTRACTING and result assembly.
    async fn extract(&self, driver: &dyn PageDriver) -> Result<WorkerResult, WorkerFailure> {
        let extractor = ExtractionDriver::new(
            Arc::clone(&self.ctx.vision),
            Arc::clone(&self.ctx.events),
            self.ctx.config.max_iter_extract,
        );
        let extraction = extractor
            .run(driver, self.pair.pair_id, &self.extraction_task())
            .await;

        tokio::time::sleep(STABILIZATION_PAUSE).await;

        let mut flights = extraction.flights;
        for flight in &mut flights {
            flight.trip_type = "round_trip".to_string();
        }
        info!(
            "Worker {} extracted {} flights (final url: {})",
            self.pair.pair_id,
            flights.len(),
            extraction.final_url
        );
        Ok(WorkerResult::completed(&self.pair, flights))
    }

    /// Target URL for this pair's search. Site specifics stay out of the
    /// orchestrator; the query is plain text the site's own search parses.
    fn search_url(&self) -> String {
        let query = format!(
            "Flights from {} to {} on {} through {}",
            self.from, self.to, self.pair.dep_date, self.pair.ret_date
        );
        format!(
            "https://www.google.com/travel/flights?q={}",
            urlencoding::encode(&query)
        )
    }

    fn extraction_task(&self) -> String {
        format!(
            "This page shows round-trip flight results from {from} to {to}, departing \
             {dep} and returning {ret}. Interact with the page if needed to reveal all \
             options, then answer with JSON only: {{\"flights\":[{{\"airline\":\"...\",\
             \"price\":\"...\",\"duration\":\"...\",\"route\":\"...\",\"stops\":\"...\"}}],\
             \"summary\":\"...\"}}. Keep prices exactly as displayed.",
            from = self.from,
            to = self.to,
            dep = self.pair.dep_date,
            ret = self.pair.ret_date,
        )
    }
}
