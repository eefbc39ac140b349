//! # Component Status
//!
//! Status types shared by every platform component resource: the condition
//! record, its tri-state status and severity, and the `ConditionsAccessor`
//! capability the condition support functions and `Manager` operate on.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state status of a condition
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Severity of a condition
///
/// Only `Error` conditions take part in readiness aggregation. `Info`
/// conditions are diagnostic. `Error` is the zero value and is serialized as
/// an empty string, so it is omitted from the wire shape entirely.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum ConditionSeverity {
    #[default]
    #[serde(rename = "")]
    Error,
    Info,
}

impl ConditionSeverity {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

/// Condition represents one observable aspect of a resource's health
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, unique within one resource
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Generation of the resource this condition was computed against
    #[serde(default, skip_serializing_if = "is_zero")]
    pub observed_generation: i64,
    /// Last time the status changed
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Machine readable reason for the last transition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Human readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Severity, omitted when `Error`
    #[serde(default, skip_serializing_if = "ConditionSeverity::is_error")]
    pub severity: ConditionSeverity,
    /// Legacy field, cleared on every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<DateTime<Utc>>,
}

#[allow(
    clippy::trivially_copy_pass_by_ref,
    reason = "signature required by serde skip_serializing_if"
)]
fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            r#type: condition_type.into(),
            status,
            ..Self::default()
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    /// Two conditions are semantically equal when everything but the
    /// timestamps matches
    pub fn semantically_equal(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
            && self.severity == other.severity
    }
}

/// Capability of a status-bearing resource whose conditions can be managed
pub trait ConditionsAccessor {
    fn conditions(&self) -> &[Condition];
    fn set_conditions(&mut self, conditions: Vec<Condition>);
}

impl<A: ConditionsAccessor + ?Sized> ConditionsAccessor for &mut A {
    fn conditions(&self) -> &[Condition] {
        (**self).conditions()
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        (**self).set_conditions(conditions);
    }
}

/// Release/platform a component was deployed with
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Platform type (OpenDataHub, SelfManagedRhoai, ...)
    pub name: String,
    /// Platform version
    #[serde(default)]
    pub version: String,
}

/// Status shared by every component resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Ready or Not Ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Generation last reconciled to a happy state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Release the component was last deployed with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<Release>,
}

impl ConditionsAccessor for ComponentStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.conditions = conditions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_severity_is_omitted_on_the_wire() {
        let condition = Condition::new("Ready", ConditionStatus::True);
        let value = serde_json::to_value(&condition).unwrap();
        assert!(value.get("severity").is_none());
        assert_eq!(value["status"], "True");

        let info = Condition {
            severity: ConditionSeverity::Info,
            ..condition
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["severity"], "Info");
    }

    #[test]
    fn missing_severity_deserializes_as_error() {
        let condition: Condition =
            serde_json::from_str(r#"{"type":"Ready","status":"False","reason":"X"}"#).unwrap();
        assert_eq!(condition.severity, ConditionSeverity::Error);
        assert!(condition.is_false());
        assert_eq!(condition.reason, "X");
    }

    #[test]
    fn semantic_equality_ignores_timestamps() {
        let a = Condition {
            last_transition_time: Some(Utc::now()),
            ..Condition::new("A", ConditionStatus::True)
        };
        let b = Condition::new("A", ConditionStatus::True);
        assert!(a.semantically_equal(&b));
        assert!(!a.semantically_equal(&Condition::new("A", ConditionStatus::False)));
    }
}
