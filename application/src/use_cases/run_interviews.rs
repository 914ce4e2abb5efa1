//! Async interview runner
//!
//! Expands agents × scenarios × models × iterations into interviews and runs
//! them in chunks of at most `max_concurrent`. A chunk is spawned on a
//! [`JoinSet`] and drained before the next one starts, so in-flight work is
//! bounded no matter how many interviews there are.
//!
//! Finished interviews are streamed as [`RunnerEvent`]s in completion order,
//! each tagged with its submission index.

use crate::config::RunParams;
use crate::use_cases::interview::{Interview, InterviewError};
use crate::use_cases::shared::{InterviewServices, is_cancelled};
use cohort_domain::{
    Agent, FailedInterview, InterviewResult, LanguageModel, Results, Scenario, Survey,
    SurveyError,
};
use futures::{Stream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that end a run early
#[derive(Error, Debug, Clone)]
pub enum RunnerError {
    #[error("Survey configuration error in interview {index}: {source}")]
    Configuration { index: usize, source: SurveyError },

    #[error("Interview {index} failed: {message}")]
    InterviewFailed { index: usize, message: String },

    #[error("Run cancelled")]
    Cancelled,
}

/// One finished interview
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Completed(InterviewResult),
    /// Excluded from the completed results; carries what it gathered
    Failed(FailedInterview),
}

impl RunnerEvent {
    /// Submission index of the interview
    pub fn index(&self) -> usize {
        match self {
            RunnerEvent::Completed(result) => result.index,
            RunnerEvent::Failed(failed) => failed.index,
        }
    }
}

type StreamItem = Result<RunnerEvent, RunnerError>;

/// Completed interviews as they finish.
///
/// Yields at most one `Err`, always last. Dropping the stream aborts the run.
pub struct ResultStream {
    rx: mpsc::Receiver<StreamItem>,
    driver: JoinHandle<()>,
}

impl ResultStream {
    /// Drain the stream into a [`Results`] aggregate.
    ///
    /// Everything received before a terminal error is kept.
    pub async fn into_results(mut self) -> (Results, Option<RunnerError>) {
        let mut results = Results::new();
        let mut error = None;
        while let Some(item) = self.next().await {
            match item {
                Ok(RunnerEvent::Completed(result)) => results.push(result),
                Ok(RunnerEvent::Failed(failed)) => results.push_failed(failed),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        results.sort();
        (results, error)
    }
}

impl Stream for ResultStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Bounded concurrent scheduler for the interviews of one run
pub struct AsyncInterviewRunner {
    survey: Arc<Survey>,
    agents: Vec<Arc<Agent>>,
    scenarios: Vec<Arc<Scenario>>,
    models: Vec<Arc<LanguageModel>>,
    params: RunParams,
    services: InterviewServices,
    only: Option<BTreeSet<usize>>,
}

impl AsyncInterviewRunner {
    /// No agents means one default agent; no scenarios means one empty scenario.
    pub fn new(
        survey: Arc<Survey>,
        agents: Vec<Agent>,
        scenarios: Vec<Scenario>,
        models: Vec<LanguageModel>,
        params: RunParams,
        services: InterviewServices,
    ) -> Self {
        let agents = if agents.is_empty() {
            vec![Agent::new()]
        } else {
            agents
        };
        let scenarios = if scenarios.is_empty() {
            vec![Scenario::new()]
        } else {
            scenarios
        };
        Self {
            survey,
            agents: agents.into_iter().map(Arc::new).collect(),
            scenarios: scenarios.into_iter().map(Arc::new).collect(),
            models: models.into_iter().map(Arc::new).collect(),
            params,
            services,
            only: None,
        }
    }

    /// Restrict the run to these submission indices
    pub fn only(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.only = Some(indices.into_iter().collect());
        self
    }

    /// Size of the full expansion, ignoring [`only`](Self::only)
    pub fn total(&self) -> usize {
        self.agents.len() * self.scenarios.len() * self.models.len() * self.params.n_iterations
    }

    /// One fresh interview per (agent, scenario, model, iteration).
    ///
    /// Submission indices follow that nesting order, iterations innermost.
    pub fn interviews(&self) -> Vec<Interview> {
        let mut interviews = Vec::new();
        let mut index = 0;
        for agent in &self.agents {
            for scenario in &self.scenarios {
                for model in &self.models {
                    for iteration in 0..self.params.n_iterations {
                        if self.only.as_ref().is_none_or(|only| only.contains(&index)) {
                            interviews.push(Interview::new(
                                index,
                                Arc::clone(&self.survey),
                                Arc::clone(agent),
                                Arc::clone(scenario),
                                Arc::clone(model),
                                iteration,
                            ));
                        }
                        index += 1;
                    }
                }
            }
        }
        interviews
    }

    /// Start the run in the background and stream its results
    pub fn run(self, cancel: Option<CancellationToken>) -> ResultStream {
        let interviews = self.interviews();
        let capacity = self.params.max_concurrent.max(1) * 2;
        let (tx, rx) = mpsc::channel(capacity);
        let driver = tokio::spawn(drive(interviews, self.params, self.services, cancel, tx));
        ResultStream { rx, driver }
    }

    /// Run to completion and aggregate
    pub async fn collect(
        self,
        cancel: Option<CancellationToken>,
    ) -> (Results, Option<RunnerError>) {
        self.run(cancel).into_results().await
    }
}

struct Tally {
    completed: usize,
    failed: usize,
}

async fn drive(
    interviews: Vec<Interview>,
    params: RunParams,
    services: InterviewServices,
    cancel: Option<CancellationToken>,
    tx: mpsc::Sender<StreamItem>,
) {
    let total = interviews.len();
    let chunk_size = params.max_concurrent.max(1);
    info!(total, max_concurrent = chunk_size, "Starting interviews");
    services.observer.on_run_start(total, chunk_size);

    let mut tally = Tally {
        completed: 0,
        failed: 0,
    };
    let mut pending = interviews.into_iter();
    let mut chunk = 0;
    loop {
        let batch: Vec<Interview> = pending.by_ref().take(chunk_size).collect();
        if batch.is_empty() {
            break;
        }
        if is_cancelled(&cancel) {
            info!(chunk, "Run cancelled between chunks");
            services
                .observer
                .on_run_complete(tally.completed, tally.failed);
            let _ = tx.send(Err(RunnerError::Cancelled)).await;
            return;
        }

        debug!(chunk, size = batch.len(), "Launching chunk");
        services.observer.on_chunk_start(chunk, batch.len());
        if let Err(error) = run_chunk(batch, &params, &services, &cancel, &tx, &mut tally).await {
            services
                .observer
                .on_run_complete(tally.completed, tally.failed);
            if let Some(error) = error {
                let _ = tx.send(Err(error)).await;
            }
            return;
        }
        chunk += 1;

        if is_cancelled(&cancel) {
            info!(chunk, "Run cancelled");
            services
                .observer
                .on_run_complete(tally.completed, tally.failed);
            let _ = tx.send(Err(RunnerError::Cancelled)).await;
            return;
        }
    }

    info!(
        completed = tally.completed,
        failed = tally.failed,
        "Interviews finished"
    );
    services
        .observer
        .on_run_complete(tally.completed, tally.failed);
}

/// Spawn one chunk and drain it.
///
/// `Err(Some(_))` stops the run with an error; `Err(None)` means the
/// receiver is gone.
async fn run_chunk(
    batch: Vec<Interview>,
    params: &RunParams,
    services: &InterviewServices,
    cancel: &Option<CancellationToken>,
    tx: &mpsc::Sender<StreamItem>,
    tally: &mut Tally,
) -> Result<(), Option<RunnerError>> {
    let mut join_set = JoinSet::new();
    let mut launched = HashMap::new();
    for interview in batch {
        let services = services.clone();
        let params = params.clone();
        let cancel = cancel.clone();
        let identity = (
            interview.index(),
            interview.agent().label().to_string(),
            interview.model().to_string(),
        );
        let handle = join_set.spawn(async move {
            interview.conduct(&services, &params, cancel).await
        });
        launched.insert(handle.id(), identity);
    }

    while let Some(joined) = join_set.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                let Some((index, agent, model)) = launched.remove(&e.id()) else {
                    continue;
                };
                let message = if e.is_panic() {
                    "interview task panicked".to_string()
                } else {
                    e.to_string()
                };
                warn!(index, error = %message, "Interview task failed");
                services.observer.on_interview_failed(index, &message);
                tally.failed += 1;
                let failed = FailedInterview {
                    index,
                    agent,
                    model,
                    error: message.clone(),
                    partial: None,
                };
                if params.stop_on_exception {
                    join_set.abort_all();
                    let _ = tx.send(Ok(RunnerEvent::Failed(failed))).await;
                    return Err(Some(RunnerError::InterviewFailed { index, message }));
                }
                if tx.send(Ok(RunnerEvent::Failed(failed))).await.is_err() {
                    join_set.abort_all();
                    return Err(None);
                }
                continue;
            }
        };
        let Some((index, agent, model)) = launched.remove(&id) else {
            continue;
        };

        let event = match outcome {
            Ok(result) if params.stop_on_exception && result.has_unfixed_exceptions() => {
                let message = result
                    .unfixed_exceptions()
                    .next()
                    .map(|e| format!("'{}': {}", e.question_name, e.message))
                    .unwrap_or_default();
                services.observer.on_interview_failed(index, &message);
                warn!(index, error = %message, "Stopping run on first exception");
                tally.failed += 1;
                join_set.abort_all();
                let failed = FailedInterview {
                    index,
                    agent,
                    model,
                    error: message.clone(),
                    partial: Some(result),
                };
                let _ = tx.send(Ok(RunnerEvent::Failed(failed))).await;
                return Err(Some(RunnerError::InterviewFailed { index, message }));
            }
            Ok(result) => {
                tally.completed += 1;
                RunnerEvent::Completed(result)
            }
            Err(InterviewError::Configuration(source)) => {
                warn!(index, error = %source, "Survey configuration error; aborting run");
                join_set.abort_all();
                return Err(Some(RunnerError::Configuration { index, source }));
            }
            Err(InterviewError::Cancelled { .. }) => {
                debug!(index, "Interview cancelled; partial result dropped");
                continue;
            }
            Err(error @ InterviewError::ValidationAborted { .. }) => {
                let message = error.to_string();
                warn!(index, error = %message, "Interview failed");
                services.observer.on_interview_failed(index, &message);
                tally.failed += 1;
                let failed = FailedInterview {
                    index,
                    agent,
                    model,
                    error: message.clone(),
                    partial: error.into_partial(),
                };
                if params.stop_on_exception {
                    join_set.abort_all();
                    let _ = tx.send(Ok(RunnerEvent::Failed(failed))).await;
                    return Err(Some(RunnerError::InterviewFailed { index, message }));
                }
                RunnerEvent::Failed(failed)
            }
        };

        if tx.send(Ok(event)).await.is_err() {
            debug!("Result receiver dropped; aborting chunk");
            join_set.abort_all();
            return Err(None);
        }
    }
    Ok(())
}
