//! # Condition Manager
//!
//! Maintains one top-level "happy" condition and a set of dependent
//! conditions on a [`ConditionsAccessor`]. Every effective write recomputes
//! happiness: the most recently changed Error-severity dependent that is
//! `False` (or, failing that, `Unknown`) is surfaced on the happy condition,
//! otherwise the happy condition becomes `True`.

use super::{
    apply_options, find_status_condition, is_status_condition_true, remove_status_condition,
    set_status_condition, ConditionOption,
};
use crate::crd::{Condition, ConditionStatus, ConditionsAccessor};
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug)]
pub struct Manager<A> {
    happy: String,
    dependents: Vec<String>,
    accessor: A,
}

impl<A: ConditionsAccessor> Manager<A> {
    /// Bind a manager to `accessor`, initializing the happy condition to
    /// `Unknown` and every missing dependent to the happy condition's state
    pub fn new(accessor: A, happy: impl Into<String>, dependents: &[&str]) -> Self {
        let happy = happy.into();
        let mut deps: Vec<String> = Vec::with_capacity(dependents.len());
        for dependent in dependents {
            if *dependent == happy || deps.iter().any(|d| d == dependent) {
                continue;
            }
            deps.push((*dependent).to_string());
        }

        let mut manager = Self {
            happy,
            dependents: deps,
            accessor,
        };
        manager.initialize_conditions();
        manager
    }

    fn initialize_conditions(&mut self) {
        let happy = match self.condition(&self.happy) {
            Some(happy) => happy,
            None => {
                let happy = Condition::new(self.happy.clone(), ConditionStatus::Unknown);
                self.set_condition(happy.clone());
                happy
            }
        };

        let status = if happy.is_true() {
            ConditionStatus::True
        } else {
            ConditionStatus::Unknown
        };

        for dependent in self.dependents.clone() {
            if self.condition(&dependent).is_some() {
                continue;
            }
            self.set_condition(Condition::new(dependent, status));
        }
    }

    pub fn happy_type(&self) -> &str {
        &self.happy
    }

    pub fn dependents(&self) -> &[String] {
        &self.dependents
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn accessor_mut(&mut self) -> &mut A {
        &mut self.accessor
    }

    pub fn into_inner(self) -> A {
        self.accessor
    }

    pub fn is_happy(&self) -> bool {
        is_status_condition_true(&self.accessor, &self.happy)
    }

    pub fn condition(&self, condition_type: &str) -> Option<Condition> {
        find_status_condition(&self.accessor, condition_type)
    }

    pub fn top_level_condition(&self) -> Option<Condition> {
        self.condition(&self.happy)
    }

    /// Store `condition`; happiness is only recomputed when the write changed
    /// something
    pub fn set_condition(&mut self, condition: Condition) {
        let condition_type = condition.r#type.clone();
        if !set_status_condition(&mut self.accessor, condition) {
            return;
        }
        self.recompute_happiness(&condition_type);
    }

    /// Remove a condition. Removing a condition that does not exist is not an
    /// error.
    pub fn clear_condition(&mut self, condition_type: &str) {
        if !remove_status_condition(&mut self.accessor, condition_type) {
            return;
        }
        self.recompute_happiness(condition_type);
    }

    pub fn mark(&mut self, condition_type: &str, status: ConditionStatus, opts: &[ConditionOption]) {
        let mut condition = Condition::new(condition_type, status);
        apply_options(&mut condition, opts);
        self.set_condition(condition);
    }

    pub fn mark_true(&mut self, condition_type: &str, opts: &[ConditionOption]) {
        self.mark(condition_type, ConditionStatus::True, opts);
    }

    pub fn mark_false(&mut self, condition_type: &str, opts: &[ConditionOption]) {
        self.mark(condition_type, ConditionStatus::False, opts);
    }

    pub fn mark_unknown(&mut self, condition_type: &str, opts: &[ConditionOption]) {
        self.mark(condition_type, ConditionStatus::Unknown, opts);
    }

    /// Mirror `source` under a local condition type
    pub fn mark_from(&mut self, condition_type: &str, source: &Condition) {
        self.set_condition(Condition {
            r#type: condition_type.to_string(),
            status: source.status,
            reason: source.reason.clone(),
            message: source.message.clone(),
            severity: source.severity,
            ..Condition::default()
        });
    }

    pub fn recompute_happiness(&mut self, triggering_type: &str) {
        if let Some(unhappy) = self.find_unhappy_dependent() {
            self.set_condition(Condition {
                r#type: self.happy.clone(),
                status: unhappy.status,
                reason: unhappy.reason,
                message: unhappy.message,
                ..Condition::default()
            });
        } else if triggering_type != self.happy {
            self.set_condition(Condition::new(self.happy.clone(), ConditionStatus::True));
        }
    }

    fn is_candidate(&self, condition: &Condition) -> bool {
        if condition.r#type == self.happy {
            return false;
        }
        // With no declared dependents every other condition feeds the happy one
        if !self.dependents.is_empty() && !self.dependents.contains(&condition.r#type) {
            return false;
        }
        condition.severity.is_error()
    }

    fn find_unhappy_dependent(&self) -> Option<Condition> {
        let mut candidates: Vec<Condition> = self
            .accessor
            .conditions()
            .iter()
            .filter(|c| self.is_candidate(c))
            .cloned()
            .collect();

        // Most recent transition first; a missing timestamp sorts last
        candidates.sort_by_key(|c| Reverse(c.last_transition_time));

        if let Some(pos) = candidates.iter().position(Condition::is_false) {
            return Some(candidates.swap_remove(pos));
        }

        candidates
            .into_iter()
            .find(|c| c.status == ConditionStatus::Unknown)
    }

    /// Order conditions: happy first, dependents in declaration order, then
    /// everything else alphabetically
    pub fn sort(&mut self) {
        let mut conditions = self.accessor.conditions().to_vec();
        if conditions.len() <= 1 {
            return;
        }

        let count = self.dependents.len();
        let mut priorities: HashMap<&str, usize> = self
            .dependents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.as_str(), count - i))
            .collect();
        priorities.insert(self.happy.as_str(), count + 1);

        let priority = |c: &Condition| priorities.get(c.r#type.as_str()).copied().unwrap_or(0);
        conditions.sort_by(|a, b| {
            priority(b)
                .cmp(&priority(a))
                .then_with(|| a.r#type.cmp(&b.r#type))
        });

        self.accessor.set_conditions(conditions);
    }

    /// Drop every condition that is neither the happy condition nor a
    /// declared dependent, so types a controller stopped reporting disappear
    pub fn reset(&mut self) {
        let conditions = self.accessor.conditions();
        let retained: Vec<Condition> = conditions
            .iter()
            .filter(|c| c.r#type == self.happy || self.dependents.contains(&c.r#type))
            .cloned()
            .collect();

        if retained.len() != conditions.len() {
            self.accessor.set_conditions(retained);
        }
    }
}
