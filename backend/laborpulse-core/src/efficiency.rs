// src/efficiency.rs
use crate::labor_allocation::JobTotal;
use crate::labor_model::{ActiveAssignmentRow, EfficiencyRecord, EmployeeId, JobStandard, ShiftRow};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use tracing::warn;

const HOURS_DP: u32 = 2;

/// Rounds hours and ratios to two places, midpoint away from zero.
pub fn round_hours(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(HOURS_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// `(previous + active) / standard`, or zero when there is no positive standard
/// or the quotient does not fit in a `Decimal`.
pub fn efficiency_ratio(previous: Decimal, active: Decimal, standard: Decimal) -> Decimal {
    if standard <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    match (previous + active).checked_div(standard) {
        Some(ratio) => ratio,
        None => {
            warn!(
                "Efficiency overflow for {} hours over standard {}, reporting 0",
                previous + active,
                standard
            );
            Decimal::ZERO
        }
    }
}

/// Employee display names keyed by employee id.
#[derive(Debug, Clone, Default)]
pub struct EmployeeRoster {
    names: HashMap<EmployeeId, (String, String)>,
}

impl EmployeeRoster {
    pub fn from_shift_rows(rows: &[ShiftRow]) -> Self {
        let mut names = HashMap::new();
        for row in rows {
            names
                .entry(row.emp_id.trim().to_string())
                .or_insert_with(|| (row.first_name.trim().to_string(), row.last_name.trim().to_string()));
        }
        Self { names }
    }

    /// `"F. Last"`, falling back to the employee id when unknown.
    pub fn display_name(&self, employee: &str) -> String {
        match self.names.get(employee) {
            Some((first, last)) => format_initial_last(first, last).unwrap_or_else(|| employee.to_string()),
            None => employee.to_string(),
        }
    }
}

fn format_initial_last(first: &str, last: &str) -> Option<String> {
    match (first.chars().next(), last.is_empty()) {
        (Some(initial), false) => Some(format!("{}. {}", initial, last)),
        (Some(initial), true) => Some(format!("{}.", initial)),
        (None, false) => Some(last.to_string()),
        (None, true) => None,
    }
}

/// Joins job standards with per-job labor totals into efficiency records,
/// sorted by part number then job number.
pub fn compute_efficiency(
    standards: &[JobStandard],
    totals: &[JobTotal],
    assignments: &[ActiveAssignmentRow],
    roster: &EmployeeRoster,
) -> Vec<EfficiencyRecord> {
    let hours_by_job: HashMap<&str, Decimal> = totals
        .iter()
        .map(|total| (total.job.as_str(), total.hours))
        .collect();

    let mut records: Vec<EfficiencyRecord> = standards
        .iter()
        .map(|standard| {
            let active = hours_by_job
                .get(standard.job.as_str())
                .copied()
                .unwrap_or(Decimal::ZERO);
            let ratio = efficiency_ratio(standard.previous_hours, active, standard.standard_hours);

            EfficiencyRecord {
                opr_seq: standard.opr_seq,
                job_num: standard.job.clone(),
                part_num: standard.part_num.clone(),
                standard: round_hours(standard.standard_hours),
                prev_hrs: round_hours(standard.previous_hours),
                active_labor: round_hours(active),
                efficiency: round_hours(ratio),
                emps: employees_on_job(&standard.job, assignments, roster),
            }
        })
        .collect();

    records.sort_by(|a, b| {
        a.part_num
            .cmp(&b.part_num)
            .then_with(|| a.job_num.cmp(&b.job_num))
    });
    records
}

fn employees_on_job(job: &str, assignments: &[ActiveAssignmentRow], roster: &EmployeeRoster) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for assignment in assignments {
        let employee = assignment.employee_num.trim();
        if assignment.job_num.trim() == job && !seen.contains(&employee) {
            seen.push(employee);
        }
    }
    seen.iter()
        .map(|employee| roster.display_name(employee))
        .collect::<Vec<_>>()
        .join(" - ")
}
