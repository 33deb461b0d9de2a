//! The automation engine: rules, filters, templates and actions.
//!
//! An [`Event`] from the gateway is handed to [`AutomationRunner::process`],
//! which loads matching rules from an [`AutomationSource`], evaluates their
//! filters and runs their actions through the [`ActionExecutor`].

pub mod actions;
pub mod context;
pub mod filters;
pub mod metadata;
pub mod model;
pub mod runner;
pub mod template;
pub mod values;

#[cfg(test)]
pub(crate) mod testing;

pub use self::actions::{ActionError, ActionExecutor, ActionType, ExecutorSettings};
pub use self::filters::FilterContext;
pub use self::model::{
    ActionOutcome, ActionResult, ActionSpec, Automation, Event, ExecutionLog, GuildInfo,
};
pub use self::runner::{AutomationRunner, AutomationSource, RunSummary, RunnerError, RunnerSettings};
