//! Integration tests for the condition manager

use chrono::{TimeZone, Utc};
use dsc_operator::controller::conditions::{with_message, with_reason, with_severity, Manager};
use dsc_operator::crd::{Condition, ConditionSeverity, ConditionStatus, ConditionsAccessor};

const READY: &str = "Ready";
const DEPENDENCY_1: &str = "Dependency1";
const DEPENDENCY_2: &str = "Dependency2";

#[derive(Debug, Default)]
struct FakeAccessor {
    conditions: Vec<Condition>,
}

impl ConditionsAccessor for FakeAccessor {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.conditions = conditions;
    }
}

fn manager(dependents: &[&str]) -> Manager<FakeAccessor> {
    Manager::new(FakeAccessor::default(), READY, dependents)
}

fn types(manager: &Manager<FakeAccessor>) -> Vec<String> {
    manager
        .accessor()
        .conditions()
        .iter()
        .map(|c| c.r#type.clone())
        .collect()
}

#[test]
fn test_initialize_conditions() {
    let manager = manager(&[DEPENDENCY_1, DEPENDENCY_2]);

    assert_eq!(manager.happy_type(), READY);
    assert_eq!(manager.accessor().conditions().len(), 3);
    assert_eq!(
        manager.condition(READY).unwrap().status,
        ConditionStatus::Unknown
    );
    assert!(manager.condition(DEPENDENCY_1).is_some());
    assert!(manager.condition(DEPENDENCY_2).is_some());
}

#[test]
fn test_dependents_inherit_a_true_happy_condition() {
    let accessor = FakeAccessor {
        conditions: vec![Condition::new(READY, ConditionStatus::True)],
    };
    let manager = Manager::new(accessor, READY, &[DEPENDENCY_1]);

    assert_eq!(
        manager.condition(DEPENDENCY_1).unwrap().status,
        ConditionStatus::True
    );
}

#[test]
fn test_is_happy() {
    let mut manager = manager(&[DEPENDENCY_1, DEPENDENCY_2]);
    assert!(!manager.is_happy());

    manager.mark_false(DEPENDENCY_1, &[]);
    manager.mark_false(DEPENDENCY_2, &[]);
    assert!(!manager.is_happy());

    manager.mark_true(DEPENDENCY_1, &[]);
    assert!(!manager.is_happy());

    manager.mark_true(DEPENDENCY_2, &[]);
    assert!(manager.is_happy());
}

#[test]
fn test_is_happy_without_dependents() {
    let accessor = FakeAccessor {
        conditions: vec![
            Condition::new(DEPENDENCY_1, ConditionStatus::Unknown),
            Condition::new(DEPENDENCY_2, ConditionStatus::Unknown),
        ],
    };
    let mut manager = Manager::new(accessor, READY, &[]);
    assert!(!manager.is_happy());

    manager.mark_false(DEPENDENCY_1, &[]);
    assert!(!manager.is_happy());

    manager.mark_true(DEPENDENCY_1, &[]);
    assert!(!manager.is_happy());

    manager.mark_false(DEPENDENCY_2, &[]);
    assert!(!manager.is_happy());

    manager.mark_true(DEPENDENCY_2, &[]);
    assert!(manager.is_happy());
}

#[test]
fn test_set_and_clear_condition() {
    let mut manager = manager(&[DEPENDENCY_1]);

    manager.mark_true(DEPENDENCY_1, &[]);
    assert_eq!(
        manager.condition(DEPENDENCY_1).unwrap().status,
        ConditionStatus::True
    );

    manager.clear_condition(DEPENDENCY_1);
    assert!(manager.condition(DEPENDENCY_1).is_none());

    // Clearing twice is fine
    manager.clear_condition(DEPENDENCY_1);
}

#[test]
fn test_recompute_happiness_surfaces_the_failure() {
    let mut manager = manager(&[DEPENDENCY_1, DEPENDENCY_2]);

    manager.mark_true(DEPENDENCY_1, &[]);
    manager.mark_false(
        DEPENDENCY_2,
        &[
            with_severity(ConditionSeverity::Error),
            with_reason("Broken"),
            with_message(format_args!("{} is broken", DEPENDENCY_2)),
        ],
    );
    assert!(!manager.is_happy());

    let top = manager.top_level_condition().unwrap();
    assert_eq!(top.status, ConditionStatus::False);
    assert_eq!(top.reason, "Broken");
    assert_eq!(top.message, "Dependency2 is broken");

    manager.mark_true(DEPENDENCY_2, &[]);
    assert!(manager.is_happy());
    let top = manager.top_level_condition().unwrap();
    assert!(top.reason.is_empty());
    assert!(top.message.is_empty());
}

#[test]
fn test_info_severity_does_not_block_readiness() {
    let mut manager = manager(&[DEPENDENCY_1, DEPENDENCY_2]);

    manager.mark_true(DEPENDENCY_1, &[]);
    manager.mark_false(DEPENDENCY_2, &[with_severity(ConditionSeverity::Info)]);
    assert!(manager.is_happy());

    // Flipping the severity back makes it count again
    manager.mark_false(DEPENDENCY_2, &[with_severity(ConditionSeverity::Error)]);
    assert!(!manager.is_happy());
}

#[test]
fn test_most_recent_false_dependent_wins() {
    let mut manager = manager(&[DEPENDENCY_1, DEPENDENCY_2]);
    let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let newer = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

    manager.set_condition(Condition {
        message: "second".to_string(),
        last_transition_time: Some(newer),
        ..Condition::new(DEPENDENCY_2, ConditionStatus::False)
    });
    manager.set_condition(Condition {
        message: "first".to_string(),
        last_transition_time: Some(older),
        ..Condition::new(DEPENDENCY_1, ConditionStatus::False)
    });

    assert_eq!(manager.top_level_condition().unwrap().message, "second");
}

#[test]
fn test_false_takes_precedence_over_unknown() {
    let mut manager = manager(&[DEPENDENCY_1, DEPENDENCY_2]);

    manager.mark_unknown(DEPENDENCY_1, &[with_message("pending")]);
    manager.mark_false(DEPENDENCY_2, &[with_message("failed")]);
    manager.mark_unknown(DEPENDENCY_1, &[with_message("still pending")]);

    let top = manager.top_level_condition().unwrap();
    assert_eq!(top.status, ConditionStatus::False);
    assert_eq!(top.message, "failed");

    manager.mark_true(DEPENDENCY_2, &[]);
    let top = manager.top_level_condition().unwrap();
    assert_eq!(top.status, ConditionStatus::Unknown);
    assert_eq!(top.message, "still pending");
}

#[test]
fn test_mark_from_copies_the_source() {
    let mut manager = manager(&[DEPENDENCY_1]);
    let source = Condition {
        reason: "Upstream".to_string(),
        message: "upstream failed".to_string(),
        ..Condition::new("Other", ConditionStatus::False)
    };

    manager.mark_from(DEPENDENCY_1, &source);

    let mirrored = manager.condition(DEPENDENCY_1).unwrap();
    assert_eq!(mirrored.status, ConditionStatus::False);
    assert_eq!(mirrored.reason, "Upstream");
    assert_eq!(mirrored.message, "upstream failed");
    assert!(!manager.is_happy());
}

#[test]
fn test_sort() {
    let mut manager = Manager::new(FakeAccessor::default(), "Z", &["A", "C"]);
    manager.mark_true("B", &[]);
    manager.mark_true("D", &[]);
    manager.mark_true("E", &[]);
    manager.sort();

    assert_eq!(types(&manager), vec!["Z", "A", "C", "B", "D", "E"]);
}

#[test]
fn test_reset_drops_undeclared_conditions() {
    let mut manager = manager(&[DEPENDENCY_1]);
    manager.mark_true(DEPENDENCY_1, &[]);
    manager.mark_false("Stale", &[with_severity(ConditionSeverity::Info)]);
    let transition = manager
        .condition(DEPENDENCY_1)
        .unwrap()
        .last_transition_time;

    manager.reset();

    assert_eq!(types(&manager), vec![READY, DEPENDENCY_1]);
    assert_eq!(
        manager.condition(DEPENDENCY_1).unwrap().last_transition_time,
        transition
    );
}

#[test]
fn test_duplicate_and_happy_dependents_are_ignored() {
    let manager = manager(&[DEPENDENCY_1, READY, DEPENDENCY_1]);
    assert_eq!(manager.dependents(), [DEPENDENCY_1.to_string()]);
    assert_eq!(manager.accessor().conditions().len(), 2);
}
