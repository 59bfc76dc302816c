//! Cutover plan
//!
//! Discrete steps whose target weights strictly increase. At every step
//! the previous primary receives the complement, so each record always
//! sums to 100 across the two regions.

use serde::Serialize;

use super::errors::CutoverError;
use crate::region::RegionId;

/// Default weight schedule for the promoted region.
pub const DEFAULT_WEIGHT_STEPS: [u8; 2] = [50, 100];

/// Upper bound of a routing weight.
pub const FULL_WEIGHT: u8 = 100;

/// One weight write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingChange {
    pub record: String,
    pub region: RegionId,
    pub weight: u8,
}

/// One step of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CutoverStep {
    /// 1-based position in the plan
    pub number: usize,
    /// Weight of the promoted region
    pub target_weight: u8,
}

impl CutoverStep {
    pub fn complement(&self) -> u8 {
        FULL_WEIGHT - self.target_weight
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CutoverPlan {
    target: RegionId,
    previous: Option<RegionId>,
    records: Vec<String>,
    steps: Vec<CutoverStep>,
}

impl CutoverPlan {
    /// Build a plan. `previous` is `None` when the record names no
    /// previous primary; only the target is weighted then.
    pub fn new(
        target: RegionId,
        previous: Option<RegionId>,
        records: Vec<String>,
        weights: &[u8],
    ) -> Result<Self, CutoverError> {
        validate_weights(weights)?;
        if records.is_empty() {
            return Err(CutoverError::invalid_plan("no routing records to update"));
        }
        if previous.as_ref() == Some(&target) {
            return Err(CutoverError::invalid_plan(
                "previous primary and target are the same region",
            ));
        }

        let steps = weights
            .iter()
            .enumerate()
            .map(|(i, w)| CutoverStep {
                number: i + 1,
                target_weight: *w,
            })
            .collect();

        Ok(Self {
            target,
            previous,
            records,
            steps,
        })
    }

    pub fn target(&self) -> &RegionId {
        &self.target
    }

    pub fn previous(&self) -> Option<&RegionId> {
        self.previous.as_ref()
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn steps(&self) -> &[CutoverStep] {
        &self.steps
    }

    /// Weight writes of a step: the target first, then the complement.
    pub fn changes(&self, step: &CutoverStep) -> Vec<RoutingChange> {
        let mut changes = Vec::with_capacity(self.records.len() * 2);
        for record in &self.records {
            changes.push(RoutingChange {
                record: record.clone(),
                region: self.target.clone(),
                weight: step.target_weight,
            });
            if let Some(previous) = &self.previous {
                changes.push(RoutingChange {
                    record: record.clone(),
                    region: previous.clone(),
                    weight: step.complement(),
                });
            }
        }
        changes
    }

    /// Steps still to run when the target already carries `observed`.
    ///
    /// Skips steps below the observed weight so a resumed cutover never
    /// lowers the target's share.
    pub fn remaining(&self, observed: u8) -> &[CutoverStep] {
        let start = self
            .steps
            .iter()
            .position(|s| s.target_weight >= observed)
            .unwrap_or(self.steps.len());
        &self.steps[start..]
    }
}

/// Strictly increasing, each in 1..=100, ending at 100.
pub fn validate_weights(weights: &[u8]) -> Result<(), CutoverError> {
    if weights.is_empty() {
        return Err(CutoverError::invalid_plan("weight schedule is empty"));
    }
    if weights.iter().any(|w| *w == 0 || *w > FULL_WEIGHT) {
        return Err(CutoverError::invalid_plan("weights must be within 1..=100"));
    }
    if weights.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(CutoverError::invalid_plan("weights must strictly increase"));
    }
    if weights.last() != Some(&FULL_WEIGHT) {
        return Err(CutoverError::invalid_plan("final weight must be 100"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(weights: &[u8]) -> CutoverPlan {
        CutoverPlan::new(
            RegionId::new("us-west-2"),
            Some(RegionId::new("us-east-1")),
            vec!["db.example.com".to_string()],
            weights,
        )
        .unwrap()
    }

    #[test]
    fn test_default_plan_has_two_steps() {
        let plan = plan(&DEFAULT_WEIGHT_STEPS);
        let weights: Vec<u8> = plan.steps().iter().map(|s| s.target_weight).collect();
        assert_eq!(weights, vec![50, 100]);
        assert_eq!(plan.steps()[0].number, 1);
    }

    #[test]
    fn test_changes_pair_target_with_complement() {
        let plan = plan(&[25, 100]);
        let changes = plan.changes(&plan.steps()[0]);
        assert_eq!(
            changes,
            vec![
                RoutingChange {
                    record: "db.example.com".to_string(),
                    region: RegionId::new("us-west-2"),
                    weight: 25,
                },
                RoutingChange {
                    record: "db.example.com".to_string(),
                    region: RegionId::new("us-east-1"),
                    weight: 75,
                },
            ]
        );
    }

    #[test]
    fn test_changes_without_previous_primary() {
        let plan = CutoverPlan::new(
            RegionId::new("us-west-2"),
            None,
            vec!["a".to_string(), "b".to_string()],
            &[100],
        )
        .unwrap();
        let changes = plan.changes(&plan.steps()[0]);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.weight == 100));
    }

    #[test]
    fn test_remaining_never_goes_backwards() {
        let plan = plan(&[10, 50, 100]);
        assert_eq!(plan.remaining(0).len(), 3);
        assert_eq!(plan.remaining(10).len(), 3);
        assert_eq!(plan.remaining(30)[0].target_weight, 50);
        assert_eq!(plan.remaining(100).len(), 1);
    }

    #[test]
    fn test_invalid_schedules() {
        assert!(validate_weights(&[]).is_err());
        assert!(validate_weights(&[0, 100]).is_err());
        assert!(validate_weights(&[50, 50, 100]).is_err());
        assert!(validate_weights(&[60, 40, 100]).is_err());
        assert!(validate_weights(&[50, 90]).is_err());
        assert!(validate_weights(&[50, 101]).is_err());
        assert!(validate_weights(&[100]).is_ok());
    }

    #[test]
    fn test_plan_requires_records_and_distinct_regions() {
        assert!(CutoverPlan::new(RegionId::new("a"), None, vec![], &[100]).is_err());
        assert!(CutoverPlan::new(
            RegionId::new("a"),
            Some(RegionId::new("a")),
            vec!["r".to_string()],
            &[100]
        )
        .is_err());
    }
}
