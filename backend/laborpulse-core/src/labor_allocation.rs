// src/labor_allocation.rs
use crate::labor_model::{ClockTime, EmployeeId, JobNum};
use crate::time_grid::{GridRow, OccupancyGrid};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Grid of fractional labor: each employee's unit per slice split across the
/// jobs they are clocked into at that slice.
#[derive(Debug, Clone)]
pub struct AllocatedGrid {
    pub slice_minutes: u32,
    pub slices: Vec<ClockTime>,
    pub rows: Vec<GridRow>,
    pub cells: Vec<Vec<Decimal>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobTotal {
    pub job: JobNum,
    pub slice_units: Decimal,
    pub hours: Decimal,
}

impl AllocatedGrid {
    #[cfg(test)]
    pub fn cell_at(&self, job: &str, employee: &str, slice: ClockTime) -> Option<Decimal> {
        let row = self
            .rows
            .iter()
            .position(|r| r.job == job && r.employee == employee)?;
        let column = self.slices.iter().position(|s| *s == slice)?;
        Some(self.cells[row][column])
    }

    /// Sum of an employee's allocated labor across jobs at one slice column.
    #[cfg(test)]
    pub fn employee_slice_sum(&self, employee: &str, column: usize) -> Decimal {
        self.rows
            .iter()
            .zip(&self.cells)
            .filter(|(row, _)| row.employee == employee)
            .map(|(_, cells)| cells[column])
            .sum()
    }

    /// Drops rows whose (job, employee) pair has no active labor transaction.
    pub fn retain_active_pairs(&mut self, active: &HashSet<(JobNum, EmployeeId)>) {
        let keep: Vec<bool> = self
            .rows
            .iter()
            .map(|row| active.contains(&(row.job.clone(), row.employee.clone())))
            .collect();

        let mut index = 0;
        self.rows.retain(|_| {
            let k = keep[index];
            index += 1;
            k
        });
        let mut index = 0;
        self.cells.retain(|_| {
            let k = keep[index];
            index += 1;
            k
        });
    }
}

/// Divides every occupied cell by the employee's simultaneous job count at that slice.
/// The count is taken over all of the employee's rows, active or not.
///
/// The last occupied job of an employee at a slice takes the remainder, so the
/// shares of one employee-slice always sum to exactly one.
pub fn allocate_labor(grid: &OccupancyGrid) -> AllocatedGrid {
    let columns = grid.slices.len();
    let mut job_counts: HashMap<&str, Vec<u32>> = HashMap::new();
    for (row, cells) in grid.rows.iter().zip(&grid.cells) {
        let counts = job_counts
            .entry(row.employee.as_str())
            .or_insert_with(|| vec![0; columns]);
        for (count, cell) in counts.iter_mut().zip(cells) {
            *count += u32::from(*cell);
        }
    }

    let mut handed_out: HashMap<&str, Vec<u32>> = HashMap::new();
    let mut cells = Vec::with_capacity(grid.rows.len());
    for (row, occupancy) in grid.rows.iter().zip(&grid.cells) {
        let employee = row.employee.as_str();
        let counts = job_counts.get(employee);
        let given = handed_out
            .entry(employee)
            .or_insert_with(|| vec![0; columns]);

        let mut allocated = Vec::with_capacity(columns);
        for (column, cell) in occupancy.iter().enumerate() {
            let count = counts.map(|c| c[column]).unwrap_or(0);
            if *cell == 0 || count == 0 {
                allocated.push(Decimal::ZERO);
                continue;
            }
            let share = Decimal::ONE / Decimal::from(count);
            given[column] += 1;
            if given[column] == count {
                allocated.push(Decimal::ONE - share * Decimal::from(count - 1));
            } else {
                allocated.push(share);
            }
        }
        cells.push(allocated);
    }

    AllocatedGrid {
        slice_minutes: grid.slice_minutes,
        slices: grid.slices.clone(),
        rows: grid.rows.clone(),
        cells,
    }
}

/// Per-job totals ordered by job number. Hours are slice units times the slice width.
pub fn job_totals(grid: &AllocatedGrid) -> Vec<JobTotal> {
    let mut units: BTreeMap<&str, Decimal> = BTreeMap::new();
    for (row, cells) in grid.rows.iter().zip(&grid.cells) {
        let total: Decimal = cells.iter().copied().sum();
        *units.entry(row.job.as_str()).or_insert(Decimal::ZERO) += total;
    }

    let slice_minutes = Decimal::from(grid.slice_minutes);
    units
        .into_iter()
        .map(|(job, slice_units)| JobTotal {
            job: job.to_string(),
            slice_units,
            hours: slice_units * slice_minutes / Decimal::from(60),
        })
        .collect()
}
