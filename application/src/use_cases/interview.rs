//! Interview use case
//!
//! Conducts one (survey, agent, scenario, model, iteration) run. Questions are
//! strictly sequential: each one goes through
//!
//! 1. **Skip check**: before-rules may route around it without a model call
//! 2. **Prepare**: render the prompt with the memory-plan-visible prior answers
//! 3. **Throttle**: one request plus the estimated tokens from the service's buckets
//! 4. **Call**: the gateway, wrapped in a timeout, retried with backoff on transient failures
//! 5. **Validate**: a rejected answer gets a corrective follow-up
//! 6. **Commit**: store the answer, then after-rules pick the next question and
//!    everything jumped over is marked skipped
//!
//! Per-question failures never abort the interview; they are recorded on the
//! exception log and the answer is left empty.

use crate::config::RunParams;
use crate::ports::llm_gateway::{GatewayError, LlmRequest, Prompt};
use crate::ports::prompt_renderer::MemoryEntry;
use crate::ports::response_cache::{CachedResponse, fingerprint};
use crate::rate_limit::RateLimitError;
use crate::use_cases::shared::{InterviewServices, is_cancelled, sleep_cancellable};
use chrono::{DateTime, Utc};
use cohort_domain::core::string::excerpt;
use cohort_domain::{
    Agent, AnswerEnvironment, ErrorKind, InterviewException, InterviewIdentity, InterviewResult,
    InterviewState, LanguageModel, NextQuestion, Question, QuestionRecord, QuestionStatus,
    RuleDecision, Scenario, Survey, SurveyError, Usage,
};
use serde_json::Value;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest excerpt of a rejected response kept in an exception message
const RESPONSE_EXCERPT_CHARS: usize = 200;

/// Errors that end an interview early
#[derive(Error, Debug)]
pub enum InterviewError {
    /// The survey itself is unusable; aborts the whole run
    #[error("Survey configuration error: {0}")]
    Configuration(#[from] SurveyError),

    #[error("Answer to '{question}' stayed invalid: {message}")]
    ValidationAborted {
        question: String,
        message: String,
        partial: Box<InterviewResult>,
    },

    #[error("Interview cancelled")]
    Cancelled { partial: Box<InterviewResult> },
}

impl InterviewError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, InterviewError::Configuration(_))
    }

    /// What the interview gathered before it stopped
    pub fn partial(&self) -> Option<&InterviewResult> {
        match self {
            InterviewError::Configuration(_) => None,
            InterviewError::ValidationAborted { partial, .. }
            | InterviewError::Cancelled { partial } => Some(partial),
        }
    }

    pub fn into_partial(self) -> Option<InterviewResult> {
        match self {
            InterviewError::Configuration(_) => None,
            InterviewError::ValidationAborted { partial, .. }
            | InterviewError::Cancelled { partial } => Some(*partial),
        }
    }
}

/// Early exit from a single question
enum Halt {
    Cancelled,
    Validation { question: String, message: String },
}

struct Fetched {
    content: String,
    usage: Usage,
    fingerprint: String,
    cached: bool,
}

/// One running interview.
///
/// Holds shared read-only references to the survey and its inputs plus its
/// own mutable [`InterviewState`].
pub struct Interview {
    index: usize,
    iteration: usize,
    survey: Arc<Survey>,
    agent: Arc<Agent>,
    scenario: Arc<Scenario>,
    model: Arc<LanguageModel>,
    state: InterviewState,
}

impl Interview {
    pub fn new(
        index: usize,
        survey: Arc<Survey>,
        agent: Arc<Agent>,
        scenario: Arc<Scenario>,
        model: Arc<LanguageModel>,
        iteration: usize,
    ) -> Self {
        let state = InterviewState::new(survey.question_names());
        Self {
            index,
            iteration,
            survey,
            agent,
            scenario,
            model,
            state,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn model(&self) -> &LanguageModel {
        &self.model
    }

    pub fn state(&self) -> &InterviewState {
        &self.state
    }

    fn identity(&self) -> InterviewIdentity {
        InterviewIdentity {
            index: self.index,
            iteration: self.iteration,
            agent: (*self.agent).clone(),
            scenario: (*self.scenario).clone(),
            model: (*self.model).clone(),
        }
    }

    fn into_result(self, started_at: DateTime<Utc>) -> InterviewResult {
        let identity = self.identity();
        InterviewResult::from_state(identity, self.state, started_at)
    }

    fn halt(self, halt: Halt, started_at: DateTime<Utc>) -> InterviewError {
        let index = self.index;
        let partial = Box::new(self.into_result(started_at));
        match halt {
            Halt::Cancelled => {
                info!(index, "Interview cancelled");
                InterviewError::Cancelled { partial }
            }
            Halt::Validation { question, message } => {
                warn!(index, question = %question, "Interview aborted on invalid answer");
                InterviewError::ValidationAborted {
                    question,
                    message,
                    partial,
                }
            }
        }
    }

    /// Run the interview to completion.
    ///
    /// Only a survey configuration error, an answer that stays invalid under
    /// `raise_validation_errors`, or cancellation end it early.
    pub async fn conduct(
        mut self,
        services: &InterviewServices,
        params: &RunParams,
        cancel: Option<CancellationToken>,
    ) -> Result<InterviewResult, InterviewError> {
        let started_at = Utc::now();
        let survey = Arc::clone(&self.survey);
        let count = survey.len();

        info!(
            index = self.index,
            agent = self.agent.label(),
            model = %self.model,
            iteration = self.iteration,
            "Interview started"
        );
        services
            .observer
            .on_interview_start(self.index, self.agent.label(), &self.model);

        let mut current = 0;
        while current < count {
            if is_cancelled(&cancel) {
                return Err(self.halt(Halt::Cancelled, started_at));
            }
            let Some(question) = survey.question(current) else {
                break;
            };

            // 1. Skip check
            let skip = survey.rules().skip_before(current, &self.environment());
            if let Some(decision) = skip {
                self.log_eval_errors(current, &decision);
                debug!(
                    index = self.index,
                    question = %question.name,
                    next = %decision.next,
                    "Skip rule fired"
                );
                match decision.next {
                    NextQuestion::Index(next) => {
                        self.skip_range(current..next, services);
                        current = next;
                        continue;
                    }
                    NextQuestion::EndOfSurvey => {
                        self.skip_range(current..count, services);
                        break;
                    }
                }
            }

            // 2-5. Prepare, throttle, call, validate
            let (answer, record) = match self.ask(question, services, params, &cancel).await {
                Ok(outcome) => outcome,
                Err(halt) => return Err(self.halt(halt, started_at)),
            };

            // 6. Commit and route
            services
                .observer
                .on_question_answered(self.index, &question.name, &record);
            self.state.commit(current, answer, record);

            let decision = survey.rules().decide_next(current, &self.environment())?;
            self.log_eval_errors(current, &decision);
            match decision.next {
                NextQuestion::Index(next) => {
                    self.skip_range(current + 1..next, services);
                    current = next;
                }
                NextQuestion::EndOfSurvey => {
                    self.skip_range(current + 1..count, services);
                    break;
                }
            }
        }

        let result = self.into_result(started_at);
        info!(
            index = result.index,
            answered = result.answers.len(),
            skipped = result.skipped.len(),
            unfixed = result.unfixed_exceptions().count(),
            "Interview complete"
        );
        services.observer.on_interview_complete(&result);
        Ok(result)
    }

    fn environment(&self) -> AnswerEnvironment<'_> {
        AnswerEnvironment::new(self.state.answers(), &self.scenario, &self.agent)
    }

    fn log_eval_errors(&self, question: usize, decision: &RuleDecision) {
        for (priority, error) in &decision.eval_errors {
            debug!(
                index = self.index,
                question,
                priority,
                error = %error,
                "Rule condition did not evaluate; treated as non-matching"
            );
        }
    }

    fn skip_range(&mut self, range: Range<usize>, services: &InterviewServices) {
        let end = range.end.min(self.survey.len());
        for i in range.start..end {
            if self.state.status(i) == Some(&QuestionStatus::Pending) {
                self.state.skip(i);
                if let Some(question) = self.survey.question(i) {
                    services.observer.on_question_skipped(self.index, &question.name);
                }
            }
        }
    }

    fn record(&mut self, services: &InterviewServices, exception: InterviewException) {
        services.observer.on_exception(self.index, &exception);
        self.state.record_exception(exception);
    }

    fn memory_for(&self, question: &Question) -> Vec<MemoryEntry> {
        self.survey
            .memory()
            .visible_to(&question.name)
            .iter()
            .filter_map(|prior| {
                let answer = self.state.answers().get(prior)?;
                let text = self
                    .survey
                    .index_of(prior)
                    .ok()
                    .and_then(|i| self.survey.question(i))
                    .map(|q| q.text.clone())?;
                Some(MemoryEntry {
                    question_name: prior.clone(),
                    question_text: text,
                    answer: answer.clone(),
                })
            })
            .collect()
    }

    async fn ask(
        &mut self,
        question: &Question,
        services: &InterviewServices,
        params: &RunParams,
        cancel: &Option<CancellationToken>,
    ) -> Result<(Option<Value>, QuestionRecord), Halt> {
        let memory = self.memory_for(question);
        let base = match services
            .renderer
            .render(question, &self.scenario, &self.agent, &memory)
        {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(
                    index = self.index,
                    question = %question.name,
                    error = %error,
                    "Prompt rendering failed"
                );
                let exception = InterviewException::new(
                    &question.name,
                    ErrorKind::Render,
                    error.to_string(),
                    0,
                );
                self.record(services, exception);
                return Ok((None, QuestionRecord::default()));
            }
        };

        let mut record = QuestionRecord::default();
        let mut prompt = base.clone();
        let mut corrections = 0;
        loop {
            let Some(fetched) = self
                .fetch(question, &prompt, &mut record, services, params, cancel)
                .await?
            else {
                return Ok((None, record));
            };
            record.raw_response = Some(fetched.content.clone());

            match services.validator.validate(question, &fetched.content) {
                Ok(value) => {
                    record.validated = true;
                    if params.use_cache && !fetched.cached {
                        services.cache.put(
                            &fetched.fingerprint,
                            CachedResponse {
                                content: fetched.content,
                                usage: fetched.usage,
                            },
                        );
                    }
                    self.state.mark_fixed(&question.name);
                    return Ok((Some(value), record));
                }
                Err(error) => {
                    let message = format!(
                        "{} (response: {})",
                        error,
                        excerpt(&fetched.content, RESPONSE_EXCERPT_CHARS)
                    );
                    let exception = InterviewException::new(
                        &question.name,
                        ErrorKind::Validation,
                        message,
                        record.attempts,
                    );
                    self.record(services, exception);

                    if corrections >= params.retry.max_validation_retries {
                        if params.raise_validation_errors {
                            return Err(Halt::Validation {
                                question: question.name.clone(),
                                message: error.to_string(),
                            });
                        }
                        warn!(
                            index = self.index,
                            question = %question.name,
                            error = %error,
                            "Answer still invalid; leaving it empty"
                        );
                        return Ok((None, record));
                    }
                    corrections += 1;
                    debug!(
                        index = self.index,
                        question = %question.name,
                        "Sending corrective follow-up"
                    );
                    prompt = services
                        .renderer
                        .corrective(&base, question, &fetched.content, &error);
                }
            }
        }
    }

    /// Cache lookup, then throttle and call with transient retries.
    ///
    /// `Ok(None)` means the call failed for good; the failure is already recorded.
    async fn fetch(
        &mut self,
        question: &Question,
        prompt: &Prompt,
        record: &mut QuestionRecord,
        services: &InterviewServices,
        params: &RunParams,
        cancel: &Option<CancellationToken>,
    ) -> Result<Option<Fetched>, Halt> {
        let fingerprint = fingerprint(prompt, &self.model);
        if params.use_cache
            && let Some(hit) = services.cache.get(&fingerprint)
        {
            debug!(index = self.index, question = %question.name, "Cache hit");
            record.cached = true;
            return Ok(Some(Fetched {
                content: hit.content,
                usage: hit.usage,
                fingerprint,
                cached: true,
            }));
        }

        let estimated = services.estimator.estimate(prompt) as f64;
        let mut failures = 0u32;
        loop {
            if is_cancelled(cancel) {
                return Err(Halt::Cancelled);
            }
            let buckets = services.buckets.resolve(&self.model);
            let outcome = match buckets
                .acquire(estimated, params.max_bucket_wait, cancel.as_ref())
                .await
            {
                Err(RateLimitError::Cancelled(_)) => return Err(Halt::Cancelled),
                Err(starved) => Err(GatewayError::Transient(starved.to_string())),
                Ok(waited) => {
                    if !waited.is_zero() {
                        debug!(
                            index = self.index,
                            service = %self.model.service,
                            ?waited,
                            "Waited for rate limit"
                        );
                    }
                    if is_cancelled(cancel) {
                        return Err(Halt::Cancelled);
                    }
                    record.attempts += 1;
                    let request = LlmRequest::new(
                        &self.model,
                        prompt.clone(),
                        params.llm_timeout,
                        &question.name,
                    );
                    let call = services.gateway.invoke(&request);
                    match tokio::time::timeout(params.llm_timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(GatewayError::Timeout(params.llm_timeout)),
                    }
                }
            };

            let error = match outcome {
                Ok(response) => {
                    record.input_tokens += response.usage.input_tokens;
                    record.output_tokens += response.usage.output_tokens;
                    return Ok(Some(Fetched {
                        content: response.content,
                        usage: response.usage,
                        fingerprint,
                        cached: false,
                    }));
                }
                Err(error) => error,
            };

            failures += 1;
            let kind = if error.is_transient() {
                ErrorKind::Transient
            } else {
                ErrorKind::Permanent
            };
            self.record(
                services,
                InterviewException::new(&question.name, kind, error.to_string(), failures),
            );
            if !error.is_transient() || failures > params.retry.max_transient_retries {
                warn!(
                    index = self.index,
                    question = %question.name,
                    error = %error,
                    attempts = failures,
                    "Giving up on question"
                );
                return Ok(None);
            }
            let delay = params.retry.delay_for(failures - 1);
            debug!(
                index = self.index,
                question = %question.name,
                ?delay,
                "Retrying after transient failure"
            );
            if !sleep_cancellable(delay, cancel).await {
                return Err(Halt::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::ports::prompt_renderer::PromptRenderer;
    use crate::rate_limit::BucketCollection;
    use crate::use_cases::test_support::{MapCache, ScriptedGateway};
    use cohort_domain::{QuestionKind, Target};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn services(gateway: Arc<ScriptedGateway>) -> InterviewServices {
        InterviewServices::new(gateway, Arc::new(BucketCollection::infinity()))
    }

    fn interview(survey: Survey) -> Interview {
        interview_with(survey, Agent::named("ann"), Scenario::new())
    }

    fn interview_with(survey: Survey, agent: Agent, scenario: Scenario) -> Interview {
        Interview::new(
            0,
            Arc::new(survey),
            Arc::new(agent),
            Arc::new(scenario),
            Arc::new(LanguageModel::new("m", "svc", 600.0, 1e9)),
            0,
        )
    }

    fn tea_survey() -> Survey {
        Survey::new(vec![
            Question::yes_no("q1", "Do you drink tea?"),
            Question::free_text("q2", "Which tea?"),
            Question::free_text("q3", "Anything else?"),
        ])
        .unwrap()
    }

    fn quick() -> RunParams {
        RunParams::default().with_retry(RetryPolicy {
            base_delay: Duration::from_millis(10),
            ..RetryPolicy::default()
        })
    }

    #[tokio::test]
    async fn test_sequential_without_rules() {
        let gateway = Arc::new(ScriptedGateway::new("yes"));
        let result = interview(tea_survey())
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.asked(), vec!["q1", "q2", "q3"]);
        assert_eq!(result.answers.len(), 3);
        assert!(result.skipped.is_empty());
        assert_eq!(result.records["q1"].attempts, 1);
        assert_eq!(result.usage.input_tokens, 30);
    }

    #[tokio::test]
    async fn test_no_routes_past_second_question() {
        let survey = tea_survey()
            .add_rule("q1", "q1 == 'no'", Target::question("q3"), 1)
            .unwrap();
        let gateway = Arc::new(ScriptedGateway::new("fine").script("q1", vec![Ok("No")]));
        let result = interview(survey)
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();

        assert_eq!(gateway.calls_for("q2"), 0);
        assert_eq!(result.answers.keys().collect::<Vec<_>>(), vec!["q1", "q3"]);
        assert_eq!(result.answer("q1"), Some(&json!("no")));
        assert_eq!(result.skipped, vec!["q2"]);
        assert!(!result.answers.contains_key("q2"));
    }

    #[tokio::test]
    async fn test_jump_of_three_skips_two_without_calls() {
        let survey = Survey::new(
            (0..5)
                .map(|i| Question::free_text(format!("q{i}"), "?"))
                .collect(),
        )
        .unwrap()
        .add_rule("q0", "q0 == 'jump'", Target::question("q3"), 0)
        .unwrap();
        let gateway = Arc::new(ScriptedGateway::new("ok").script("q0", vec![Ok("jump")]));
        let result = interview(survey)
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.asked(), vec!["q0", "q3", "q4"]);
        assert_eq!(result.skipped, vec!["q1", "q2"]);
    }

    #[tokio::test]
    async fn test_stop_rule_skips_the_rest() {
        let survey = tea_survey().add_stop_rule("q1", "q1 == 'no'").unwrap();
        let gateway = Arc::new(ScriptedGateway::new("no"));
        let result = interview(survey)
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.asked(), vec!["q1"]);
        assert_eq!(result.skipped, vec!["q2", "q3"]);
    }

    #[tokio::test]
    async fn test_skip_rule_uses_scenario_and_agent() {
        let survey = tea_survey()
            .add_skip_rule("q2", "scenario.country == 'UK' and agent.age > 60")
            .unwrap();
        let gateway = Arc::new(ScriptedGateway::new("yes"));
        let result = interview_with(
            survey,
            Agent::new().with_trait("age", 70),
            Scenario::new().with("country", "UK"),
        )
        .conduct(&services(gateway.clone()), &quick(), None)
        .await
        .unwrap();
        assert_eq!(gateway.asked(), vec!["q1", "q3"]);
        assert_eq!(result.skipped, vec!["q2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_and_marked_fixed() {
        let gateway = Arc::new(ScriptedGateway::new("yes").script(
            "q1",
            vec![Err(GatewayError::Transient("503".into())), Ok("yes")],
        ));
        let result = interview(tea_survey())
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.calls_for("q1"), 2);
        assert_eq!(result.answer("q1"), Some(&json!("yes")));
        assert_eq!(result.exceptions.len(), 1);
        assert!(result.exceptions.entries()[0].fixed);
        assert!(!result.has_unfixed_exceptions());
        assert_eq!(result.records["q1"].attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_leave_answer_empty_and_continue() {
        let failures = vec![Err(GatewayError::Transient("503".into())); 4];
        let gateway = Arc::new(ScriptedGateway::new("yes").script("q1", failures));
        let result = interview(tea_survey())
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.calls_for("q1"), 4);
        assert!(result.answer("q1").is_none());
        assert!(result.answer("q2").is_some());
        let summary = result.error_summary();
        assert_eq!(summary.len(), 4);
        assert!(summary.iter().all(|(q, k, _)| q == "q1" && *k == ErrorKind::Transient));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_double() {
        let failures = vec![Err(GatewayError::Transient("503".into())); 3];
        let gateway = Arc::new(ScriptedGateway::new("yes").script("q1", failures));
        let start = Instant::now();
        let params = RunParams::default().with_retry(RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::default()
        });
        interview(tea_survey())
            .conduct(&services(gateway), &params, None)
            .await
            .unwrap();
        // 1s + 2s + 4s before the fourth attempt succeeds
        assert_eq!(Instant::now() - start, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let gateway = Arc::new(
            ScriptedGateway::new("yes")
                .script("q1", vec![Err(GatewayError::Permanent("401".into()))]),
        );
        let result = interview(tea_survey())
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.calls_for("q1"), 1);
        assert_eq!(result.error_summary()[0].1, ErrorKind::Permanent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_gateway_times_out_as_transient() {
        let gateway = Arc::new(ScriptedGateway::new("yes").with_latency(Duration::from_secs(10)));
        let params = RunParams::default()
            .with_llm_timeout(Duration::from_secs(1))
            .with_retry(RetryPolicy::none());
        let survey = Survey::new(vec![Question::yes_no("q1", "?")]).unwrap();
        let result = interview(survey)
            .conduct(&services(gateway), &params, None)
            .await
            .unwrap();
        let exception = &result.exceptions.entries()[0];
        assert_eq!(exception.kind, ErrorKind::Transient);
        assert!(exception.message.contains("Timed out"));
    }

    #[tokio::test]
    async fn test_invalid_answer_gets_corrective_follow_up() {
        let gateway =
            Arc::new(ScriptedGateway::new("ok").script("q1", vec![Ok("perhaps"), Ok("No")]));
        let result = interview(tea_survey())
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        let calls: Vec<_> = gateway
            .calls()
            .into_iter()
            .filter(|c| c.question_name == "q1")
            .collect();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].prompt.user.contains("perhaps"));
        assert!(calls[1].prompt.user.contains("rejected"));
        assert_eq!(result.answer("q1"), Some(&json!("no")));
        assert_eq!(result.exceptions.entries()[0].kind, ErrorKind::Validation);
        assert!(!result.has_unfixed_exceptions());
    }

    #[tokio::test]
    async fn test_still_invalid_answer_is_recorded() {
        let gateway = Arc::new(ScriptedGateway::new("perhaps"));
        let survey = Survey::new(vec![
            Question::yes_no("q1", "?"),
            Question::free_text("q2", "?"),
        ])
        .unwrap();
        let result = interview(survey)
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.calls_for("q1"), 2);
        assert!(result.answer("q1").is_none());
        assert_eq!(result.answer("q2"), Some(&json!("perhaps")));
        assert_eq!(result.unfixed_exceptions().count(), 2);
    }

    #[tokio::test]
    async fn test_raise_validation_errors_aborts_interview() {
        let gateway = Arc::new(ScriptedGateway::new("perhaps"));
        let params = quick().with_raise_validation_errors(true);
        let err = interview(tea_survey())
            .conduct(&services(gateway.clone()), &params, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InterviewError::ValidationAborted { ref question, .. } if question == "q1"
        ));
        assert!(err.partial().is_some());
        assert_eq!(gateway.calls_for("q2"), 0);
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_interviews() {
        let gateway = Arc::new(ScriptedGateway::new("yes"));
        let cache = Arc::new(MapCache::default());
        let services = services(gateway.clone()).with_cache(cache.clone());

        interview(tea_survey()).conduct(&services, &quick(), None).await.unwrap();
        assert_eq!(cache.len(), 3);
        let second = interview(tea_survey()).conduct(&services, &quick(), None).await.unwrap();

        assert_eq!(gateway.calls().len(), 3);
        assert_eq!(second.cache_hits, 3);
        assert!(second.records["q1"].cached);

        let uncached = interview(tea_survey())
            .conduct(&services, &quick().with_cache(false), None)
            .await
            .unwrap();
        assert_eq!(gateway.calls().len(), 6);
        assert_eq!(uncached.cache_hits, 0);
    }

    #[tokio::test]
    async fn test_memory_plan_feeds_prior_answers() {
        let survey = tea_survey().add_targeted_memory("q3", "q1").unwrap();
        let gateway = Arc::new(ScriptedGateway::new("yes"));
        interview(survey)
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        let calls = gateway.calls();
        assert!(!calls[1].prompt.user.contains("Do you drink tea?"));
        assert!(calls[2].prompt.user.contains("Question: Do you drink tea?"));
        assert!(calls[2].prompt.user.contains("Answer: yes"));
    }

    #[tokio::test]
    async fn test_render_failure_is_recorded_without_call() {
        let survey = Survey::new(vec![
            Question::free_text("q1", "In {{ scenario.city }}?"),
            Question::new("q2", "?", QuestionKind::FreeText),
        ])
        .unwrap();
        let gateway = Arc::new(ScriptedGateway::new("ok"));
        let result = interview(survey)
            .conduct(&services(gateway.clone()), &quick(), None)
            .await
            .unwrap();
        assert_eq!(gateway.asked(), vec!["q2"]);
        assert_eq!(result.error_summary()[0].1, ErrorKind::Render);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_service_bucket_throttles_questions() {
        let gateway = Arc::new(ScriptedGateway::new("yes"));
        let buckets = Arc::new(BucketCollection::new());
        let services = InterviewServices::new(gateway, buckets);
        let slow = Interview::new(
            0,
            Arc::new(tea_survey()),
            Arc::new(Agent::new()),
            Arc::new(Scenario::new()),
            Arc::new(LanguageModel::new("m", "svc", 60.0, 1e9)),
            0,
        );
        let start = Instant::now();
        slow.conduct(&services, &quick(), None).await.unwrap();
        // One request per second: the 2nd and 3rd question wait a second each
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_keeps_partial() {
        let gateway = Arc::new(ScriptedGateway::new("yes"));
        let token = CancellationToken::new();
        token.cancel();
        let err = interview(tea_survey())
            .conduct(&services(gateway.clone()), &quick(), Some(token))
            .await
            .unwrap_err();
        assert!(matches!(err, InterviewError::Cancelled { .. }));
        assert!(err.into_partial().unwrap().answers.is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_renderer_is_used() {
        struct Plain;
        impl PromptRenderer for Plain {
            fn render(
                &self,
                question: &Question,
                _scenario: &Scenario,
                _agent: &Agent,
                _memory: &[MemoryEntry],
            ) -> Result<Prompt, crate::ports::prompt_renderer::RenderError> {
                Ok(Prompt::new("", question.text.to_uppercase()))
            }
        }
        let gateway = Arc::new(ScriptedGateway::new("yes"));
        let services = services(gateway.clone()).with_renderer(Arc::new(Plain));
        interview(tea_survey()).conduct(&services, &quick(), None).await.unwrap();
        assert_eq!(gateway.calls()[0].prompt.user, "DO YOU DRINK TEA?");
    }
}
