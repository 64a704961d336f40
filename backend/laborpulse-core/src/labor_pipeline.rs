// src/labor_pipeline.rs
//
// Pure computation of one refresh pass: raw ERP rows in, efficiency report out.
use crate::dept_translate::DeptTranslate;
use crate::efficiency::{compute_efficiency, EmployeeRoster};
use crate::labor_allocation::{allocate_labor, job_totals};
use crate::labor_model::{
    ActiveAssignmentRow, ClockTime, EfficiencyRecord, EmployeeId, JobNum, JobStandard,
    JobStandardRow, LaborDtlRow, LaborInterval, NotClockedInRecord, NotClockedInRow, ShiftRow,
};
use crate::not_clocked_in::audit_not_clocked_in;
use crate::time_grid::{build_occupancy_grid, BreakWindows};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

/// Everything one pass needs from the ERP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaborInputs {
    #[serde(default)]
    pub labor_rows: Vec<LaborDtlRow>,
    #[serde(default)]
    pub shift_rows: Vec<ShiftRow>,
    #[serde(default)]
    pub job_standards: Vec<JobStandardRow>,
    #[serde(default)]
    pub active_assignments: Vec<ActiveAssignmentRow>,
    #[serde(default)]
    pub not_clocked_in: Vec<NotClockedInRow>,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub slice_minutes: u32,
    /// Current local time of day; closes intervals that are still clocked in.
    pub now: ClockTime,
}

impl PipelineConfig {
    #[cfg(test)]
    pub fn at(now: ClockTime) -> Self {
        Self {
            slice_minutes: crate::time_grid::DEFAULT_SLICE_MINUTES,
            now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NoData {
    #[error("no labor intervals for the labor date")]
    NoLaborIntervals,
    #[error("nobody has an active labor transaction")]
    NobodyActive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaborReport {
    pub active_labor: Vec<EfficiencyRecord>,
    pub not_clocked_in: Vec<NotClockedInRecord>,
}

/// Outcome of the core. The not-clocked-in audit is produced either way.
#[derive(Debug, Clone, PartialEq)]
pub enum LaborOutcome {
    Computed(LaborReport),
    NoData {
        reason: NoData,
        not_clocked_in: Vec<NotClockedInRecord>,
    },
}

impl LaborOutcome {
    pub fn not_clocked_in(&self) -> &[NotClockedInRecord] {
        match self {
            LaborOutcome::Computed(report) => &report.not_clocked_in,
            LaborOutcome::NoData { not_clocked_in, .. } => not_clocked_in,
        }
    }
}

/// Runs one labor computation over already fetched inputs: occupancy grid,
/// split across concurrent jobs, active-pair filter, then efficiency records.
/// Returns `NoData` when there are no intervals or nothing active remains.
/// The not-clocked-in audit is included either way.
pub fn compute_labor(
    inputs: &LaborInputs,
    depts: &DeptTranslate,
    config: &PipelineConfig,
) -> LaborOutcome {
    let not_clocked_in = audit_not_clocked_in(&inputs.not_clocked_in, depts);

    let intervals: Vec<LaborInterval> = inputs.labor_rows.iter().map(LaborInterval::from_row).collect();
    let breaks = BreakWindows::from_shift_rows(&inputs.shift_rows);

    let grid = match build_occupancy_grid(&intervals, &breaks, config.now, config.slice_minutes) {
        Some(grid) => grid,
        None => {
            return LaborOutcome::NoData {
                reason: NoData::NoLaborIntervals,
                not_clocked_in,
            }
        }
    };

    let mut allocated = allocate_labor(&grid);
    let active_pairs: HashSet<(JobNum, EmployeeId)> = intervals
        .iter()
        .filter(|interval| interval.active)
        .map(|interval| (interval.job.clone(), interval.employee.clone()))
        .collect();
    allocated.retain_active_pairs(&active_pairs);
    let totals = job_totals(&allocated);
    for total in &totals {
        debug!(
            "Job {}: {} slices, {} hours",
            total.job, total.slice_units, total.hours
        );
    }

    if inputs.active_assignments.is_empty() {
        return LaborOutcome::NoData {
            reason: NoData::NobodyActive,
            not_clocked_in,
        };
    }

    let standards: Vec<JobStandard> = inputs.job_standards.iter().map(JobStandard::from).collect();
    let roster = EmployeeRoster::from_shift_rows(&inputs.shift_rows);
    let active_labor = compute_efficiency(&standards, &totals, &inputs.active_assignments, &roster);
    info!(
        "Labor report: {} efficiency records, {} employees not clocked in",
        active_labor.len(),
        not_clocked_in.len()
    );

    LaborOutcome::Computed(LaborReport {
        active_labor,
        not_clocked_in,
    })
}
