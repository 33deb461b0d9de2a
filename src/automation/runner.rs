use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::actions::ActionExecutor;
use super::context::build_context;
use super::filters::{self, FilterContext};
use super::model::{ActionOutcome, Automation, Event, ExecutionLog, GuildInfo};
use crate::db::DatabaseError;
use crate::web::metrics::Metrics;

/// Where automations come from and where their outcomes go.
#[async_trait]
pub trait AutomationSource: Send + Sync {
    /// Enabled automations of `guild_id` that trigger on `event_type`.
    async fn triggered_automations(
        &self,
        guild_id: &str,
        event_type: &str,
    ) -> Result<Vec<Automation>, DatabaseError>;

    /// Stores the log row and bumps the automation's trigger bookkeeping.
    async fn log_execution(&self, log: &ExecutionLog) -> Result<(), DatabaseError>;

    /// Appends the event to the guild's event log unless the guild's
    /// settings exclude it.
    async fn record_event(&self, event: &Event) -> Result<(), DatabaseError>;
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to load automations: {0}")]
    Fetch(#[source] DatabaseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Automations whose actions all succeeded.
    pub executed: usize,
    /// Automations with at least one failed action, plus aborted events.
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub ignore_bot_events: bool,
    /// Write every received event, bot-authored ones included, to the event log.
    pub record_events: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            ignore_bot_events: true,
            record_events: true,
        }
    }
}

/// Drives one event through fetch, filter, execute and log.
#[derive(Clone)]
pub struct AutomationRunner {
    source: Arc<dyn AutomationSource>,
    executor: ActionExecutor,
    settings: RunnerSettings,
}

impl AutomationRunner {
    pub fn new(
        source: Arc<dyn AutomationSource>,
        executor: ActionExecutor,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            source,
            executor,
            settings,
        }
    }

    /// Processes one event. Never fails; a failure to load automations is
    /// counted as a single error.
    pub async fn process(
        &self,
        event: &Event,
        guild: &GuildInfo,
        filter_ctx: &FilterContext,
    ) -> RunSummary {
        let span = info_span!(
            "automation_run",
            run_id = %Uuid::new_v4(),
            guild_id = %event.guild_id,
            event_type = %event.event_type,
        );

        async move {
            Metrics::event_received();

            if self.settings.record_events {
                if let Err(err) = self.source.record_event(event).await {
                    warn!("failed to record event: {err}");
                }
            }

            if self.settings.ignore_bot_events && event.is_bot() {
                Metrics::event_ignored();
                debug!("ignoring bot-authored event");
                return RunSummary::default();
            }

            let started = Instant::now();
            let summary = match self.run(event, guild, filter_ctx).await {
                Ok(summary) => summary,
                Err(err) => {
                    Metrics::event_processing_error();
                    error!("automation processing error: {err}");
                    RunSummary {
                        executed: 0,
                        errors: 1,
                    }
                }
            };

            if summary.executed > 0 || summary.errors > 0 {
                info!(
                    "processed {} automations with {} errors in {}ms",
                    summary.executed,
                    summary.errors,
                    started.elapsed().as_millis()
                );
            }
            summary
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        event: &Event,
        guild: &GuildInfo,
        filter_ctx: &FilterContext,
    ) -> Result<RunSummary, RunnerError> {
        let automations = self
            .source
            .triggered_automations(&event.guild_id, &event.event_type)
            .await
            .map_err(RunnerError::Fetch)?;

        let mut summary = RunSummary::default();
        if automations.is_empty() {
            return Ok(summary);
        }
        debug!("found {} automations", automations.len());

        let context = build_context(event, guild).to_value();

        for automation in &automations {
            if automation.actions.is_empty() {
                debug!(automation = %automation.name, "no actions configured, skipping");
                continue;
            }
            if !filters::matches(event, &automation.trigger_filters, filter_ctx) {
                debug!(automation = %automation.name, "filters not matched, skipping");
                continue;
            }

            let started = Instant::now();
            let outcomes = self.execute_actions(automation, event, &context).await;
            let success = outcomes.iter().all(|outcome| outcome.result.success);
            let error_message = outcomes
                .iter()
                .find(|outcome| !outcome.result.success)
                .and_then(|outcome| outcome.result.error.clone());

            let log = ExecutionLog {
                automation_id: automation.id,
                guild_id: event.guild_id.clone(),
                trigger_event: event.event_type.clone(),
                trigger_data: event.clone(),
                action_result: outcomes,
                success,
                error_message,
                execution_time_ms: started.elapsed().as_millis() as u64,
            };
            if let Err(err) = self.source.log_execution(&log).await {
                warn!(automation_id = automation.id, "failed to write execution log: {err}");
            }

            if success {
                summary.executed += 1;
                Metrics::automation_executed();
                info!(
                    automation = %automation.name,
                    "all {} action(s) executed successfully",
                    log.action_result.len()
                );
            } else {
                summary.errors += 1;
                Metrics::automation_failed();
                error!(automation = %automation.name, "completed with errors");
            }
        }

        Ok(summary)
    }

    /// Runs every action in declared order. A failure does not stop the
    /// remaining actions.
    async fn execute_actions(
        &self,
        automation: &Automation,
        event: &Event,
        context: &serde_json::Value,
    ) -> Vec<ActionOutcome> {
        let total = automation.actions.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, spec) in automation.actions.iter().enumerate() {
            let result = self.executor.execute(automation, spec, event, context).await;
            if result.success {
                Metrics::action_succeeded();
                debug!(
                    automation = %automation.name,
                    "action {}/{} ({}) succeeded",
                    index + 1,
                    total,
                    spec.action_type
                );
            } else {
                Metrics::action_failed();
                error!(
                    automation = %automation.name,
                    "action {}/{} ({}) failed: {}",
                    index + 1,
                    total,
                    spec.action_type,
                    result.error.as_deref().unwrap_or_default()
                );
            }
            outcomes.push(ActionOutcome {
                action_index: index,
                action_type: spec.action_type.clone(),
                result,
            });
        }

        outcomes
    }
}
