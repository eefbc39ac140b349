//! # Conditions
//!
//! Pure helpers over a [`ConditionsAccessor`] plus the functional options
//! used to build conditions, and the readiness [`Manager`].
//!
//! Writes keep `last_transition_time` stable unless the status actually
//! changes, so re-applying the same observation on every reconcile does not
//! churn the resource status.

mod manager;

pub use manager::Manager;

use crate::constants::REASON_ERROR;
use crate::crd::{Condition, ConditionSeverity, ConditionsAccessor};
use chrono::Utc;
use std::fmt;

/// Modifier applied to a condition before it is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOption {
    Reason(String),
    Message(String),
    Severity(ConditionSeverity),
    ObservedGeneration(i64),
    /// Error severity, reason `Error`, and the error text as message
    Error(String),
}

impl ConditionOption {
    pub fn apply(&self, condition: &mut Condition) {
        match self {
            Self::Reason(reason) => condition.reason.clone_from(reason),
            Self::Message(message) => condition.message.clone_from(message),
            Self::Severity(severity) => condition.severity = *severity,
            Self::ObservedGeneration(generation) => condition.observed_generation = *generation,
            Self::Error(message) => {
                condition.severity = ConditionSeverity::Error;
                condition.reason = REASON_ERROR.to_string();
                condition.message.clone_from(message);
            }
        }
    }
}

pub fn with_reason(reason: impl Into<String>) -> ConditionOption {
    ConditionOption::Reason(reason.into())
}

/// Accepts anything displayable, including `format_args!`
pub fn with_message(message: impl fmt::Display) -> ConditionOption {
    ConditionOption::Message(message.to_string())
}

pub fn with_severity(severity: ConditionSeverity) -> ConditionOption {
    ConditionOption::Severity(severity)
}

pub fn with_observed_generation(generation: i64) -> ConditionOption {
    ConditionOption::ObservedGeneration(generation)
}

pub fn with_error(err: &(dyn std::error::Error + '_)) -> ConditionOption {
    ConditionOption::Error(err.to_string())
}

pub(crate) fn apply_options(condition: &mut Condition, opts: &[ConditionOption]) {
    for opt in opts {
        opt.apply(condition);
    }
}

/// Set `new` on the accessor, returning whether anything was written
///
/// A semantically equal condition is a no-op. The transition time only moves
/// when the status changes, and is taken from `new` when it carries one.
pub fn set_status_condition<A>(accessor: &mut A, new: Condition) -> bool
where
    A: ConditionsAccessor + ?Sized,
{
    let mut conditions = accessor.conditions().to_vec();
    let now = Utc::now();

    match conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        None => {
            let mut condition = new;
            if condition.last_transition_time.is_none() {
                condition.last_transition_time = Some(now);
            }
            condition.last_heartbeat_time = None;
            conditions.push(condition);
        }
        Some(existing) => {
            if existing.semantically_equal(&new) {
                return false;
            }

            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = Some(new.last_transition_time.unwrap_or(now));
            }

            existing.reason = new.reason;
            existing.message = new.message;
            existing.observed_generation = new.observed_generation;
            existing.severity = new.severity;
            existing.last_heartbeat_time = None;
        }
    }

    accessor.set_conditions(conditions);
    true
}

/// Remove the condition of the given type, returning whether it existed
pub fn remove_status_condition<A>(accessor: &mut A, condition_type: &str) -> bool
where
    A: ConditionsAccessor + ?Sized,
{
    let conditions = accessor.conditions();
    if !conditions.iter().any(|c| c.r#type == condition_type) {
        return false;
    }

    let remaining = conditions
        .iter()
        .filter(|c| c.r#type != condition_type)
        .cloned()
        .collect();
    accessor.set_conditions(remaining);
    true
}

pub fn find_status_condition<A>(accessor: &A, condition_type: &str) -> Option<Condition>
where
    A: ConditionsAccessor + ?Sized,
{
    accessor
        .conditions()
        .iter()
        .find(|c| c.r#type == condition_type)
        .cloned()
}

pub fn is_status_condition_true<A>(accessor: &A, condition_type: &str) -> bool
where
    A: ConditionsAccessor + ?Sized,
{
    accessor
        .conditions()
        .iter()
        .any(|c| c.r#type == condition_type && c.is_true())
}

pub fn is_status_condition_false<A>(accessor: &A, condition_type: &str) -> bool
where
    A: ConditionsAccessor + ?Sized,
{
    accessor
        .conditions()
        .iter()
        .any(|c| c.r#type == condition_type && c.is_false())
}
