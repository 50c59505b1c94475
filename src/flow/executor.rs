//! Flow executor: drives a plan to completion for one session.
//!
//! The executor asks the scheduler for the ready set, dispatches each ready
//! step to its capability, and applies the retry and failure policy. Every
//! attempt is appended to the ledger, and acknowledged, before the run moves on.

use crate::capability::CapabilityRegistry;
use crate::config::RunConfig;
use crate::errors::{LedgerError, StepError};
use crate::flow::session::{Context, Session, SessionId};
use crate::flow::state::{ExecutionTimer, FatalFailure, RunResult, RunStatus, StepOutcome};
use crate::ledger::{ExecutionRecord, Ledger, StepInput};
use crate::observability::{FlowEvent, ObservabilityHub};
use crate::plan::{Plan, Step, StepScheduler, StepStatus};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// How a dispatched step ended.
enum StepEnd {
    Succeeded(Value),
    /// Fatal: non-retryable, or retries exhausted
    Failed(StepError),
    /// Cancellation observed between attempts
    Interrupted,
}

/// Drives plans through the registered capabilities.
#[derive(Clone)]
pub struct FlowExecutor {
    registry: Arc<CapabilityRegistry>,
    ledger: Ledger,
    hub: ObservabilityHub,
}

impl FlowExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, ledger: Ledger, hub: ObservabilityHub) -> Self {
        Self {
            registry,
            ledger,
            hub,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run `plan` to completion within `session`.
    ///
    /// Step failures are reported in the [`RunResult`]; only a ledger failure
    /// is returned as an error, since the run cannot proceed unrecorded.
    pub async fn run(&self, plan: Plan, session: Session) -> Result<RunResult, LedgerError> {
        let span = info_span!("session", session_id = %session.id);
        self.run_inner(plan, session).instrument(span).await
    }

    async fn run_inner(&self, plan: Plan, mut session: Session) -> Result<RunResult, LedgerError> {
        let timer = ExecutionTimer::start();
        let session_id = session.id;
        let cancel = session.cancel_token();
        let config = session.config.clone();

        info!(steps = plan.len(), mode = %plan.mode(), "Starting plan");
        self.hub
            .emit(FlowEvent::plan_started(session_id, &session.goal.text, plan.len()));

        let mut scheduler = StepScheduler::new(plan, config.failure_policy);
        let mut attempts = vec![0u32; scheduler.plan().len()];
        let mut failure: Option<FatalFailure> = None;
        let mut optional_failures = Vec::new();
        let mut cancelled = false;

        'run: loop {
            let ready = scheduler.ready_steps();
            if ready.is_empty() {
                break;
            }

            for index in ready {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'run;
                }
                let Some(step) = scheduler.plan().step(index).cloned() else {
                    continue;
                };

                scheduler.mark_running(index);
                let (end, used) = self
                    .drive_step(session_id, &step, &session.context, &config, &cancel)
                    .instrument(info_span!("step", step_id = %step.id))
                    .await?;
                attempts[index] = used;

                match end {
                    StepEnd::Succeeded(output) => {
                        scheduler.mark_succeeded(index);
                        session.context.insert(step.id.clone(), output);
                        self.hub
                            .emit(FlowEvent::step_succeeded(session_id, &step.id, used));
                    }
                    StepEnd::Failed(err) => {
                        let fatal = FatalFailure {
                            step_id: step.id.clone(),
                            kind: err.kind(),
                            message: err.to_string(),
                        };
                        if scheduler.mark_failed(index) {
                            warn!(step_id = %step.id, error = %fatal, "Step failed, aborting run");
                            failure = Some(fatal);
                            break 'run;
                        }
                        warn!(step_id = %step.id, error = %fatal, "Optional step failed, continuing");
                        optional_failures.push(fatal);
                        for dependent in scheduler.skip_dependents(index) {
                            if let Some(skipped) = scheduler.plan().step(dependent) {
                                debug!(step_id = %skipped.id, "Skipping dependent of failed step");
                                self.hub.emit(FlowEvent::step_skipped(session_id, &skipped.id));
                            }
                        }
                    }
                    StepEnd::Interrupted => {
                        scheduler.mark_skipped(index);
                        self.hub.emit(FlowEvent::step_skipped(session_id, &step.id));
                        cancelled = true;
                        break 'run;
                    }
                }
            }
        }

        if cancel.is_cancelled() && failure.is_none() && !scheduler.all_complete() {
            cancelled = true;
        }

        for index in scheduler.skip_remaining() {
            if let Some(step) = scheduler.plan().step(index) {
                debug!(step_id = %step.id, "Skipping step");
                self.hub.emit(FlowEvent::step_skipped(session_id, &step.id));
            }
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let answer = final_answer(scheduler.plan(), &scheduler, &session.context);
        let steps = scheduler
            .statuses()
            .into_iter()
            .zip(&attempts)
            .map(|((step_id, status), &attempts)| StepOutcome {
                step_id,
                status,
                attempts,
            })
            .collect();

        self.hub.emit(FlowEvent::plan_completed(session_id, status));
        let duration = timer.elapsed();
        info!(
            status = %status,
            completed = scheduler.count(StepStatus::Succeeded),
            duration_ms = duration.as_millis() as u64,
            "Plan finished"
        );

        Ok(RunResult {
            session_id,
            status,
            answer,
            context: session.context,
            trace: self.ledger.query(&session_id),
            steps,
            failure,
            optional_failures,
            duration,
        })
    }

    /// Dispatch one step, retrying retryable failures with exponential backoff.
    ///
    /// Returns how the step ended and the number of attempts made.
    async fn drive_step(
        &self,
        session_id: SessionId,
        step: &Step,
        context: &Context,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<(StepEnd, u32), LedgerError> {
        let max_attempts = config.retry.effective_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let input = StepInput::snapshot(step, context.keys().cloned().collect());
            self.hub
                .emit(FlowEvent::step_started(session_id, &step.id, attempt));
            let started_at = Utc::now();

            match self.attempt(step, context, config).await {
                Ok(output) => {
                    let record = ExecutionRecord::succeeded(
                        session_id,
                        &step.id,
                        attempt,
                        input,
                        output.clone(),
                        started_at,
                    );
                    self.ledger.append(session_id, record).await?;
                    info!(attempt, "Step succeeded");
                    return Ok((StepEnd::Succeeded(output), attempt));
                }
                Err(err) => {
                    let retryable = err.is_retryable() && attempt < max_attempts;
                    let will_retry = retryable && !cancel.is_cancelled();

                    let record = ExecutionRecord::failed(
                        session_id, &step.id, attempt, input, &err, started_at,
                    );
                    self.ledger.append(session_id, record).await?;
                    self.hub.emit(FlowEvent::step_failed(
                        session_id,
                        &step.id,
                        attempt,
                        err.kind(),
                        &err.to_string(),
                        will_retry,
                    ));

                    if !retryable {
                        return Ok((StepEnd::Failed(err), attempt));
                    }
                    if !will_retry {
                        return Ok((StepEnd::Interrupted, attempt));
                    }

                    let delay = config.retry.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        backoff_ms = delay.as_millis() as u64,
                        "Step attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok((StepEnd::Interrupted, attempt)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One attempt under the per-step timeout.
    async fn attempt(
        &self,
        step: &Step,
        context: &Context,
        config: &RunConfig,
    ) -> Result<Value, StepError> {
        let capability = self.registry.resolve(&step.kind).ok_or_else(|| {
            StepError::Validation(format!("no executor registered for kind '{}'", step.kind))
        })?;

        let limit = config.per_step_timeout;
        match tokio::time::timeout(limit, capability.execute(step, context, limit)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::Timeout(limit)),
        }
    }
}

/// Output of the last succeeded leaf step, in plan order.
fn final_answer(plan: &Plan, scheduler: &StepScheduler, context: &Context) -> Option<Value> {
    plan.leaf_steps()
        .into_iter()
        .rev()
        .filter(|&i| scheduler.status(i) == StepStatus::Succeeded)
        .find_map(|i| plan.step(i).and_then(|s| context.get(&s.id)).cloned())
}
