// src/time_grid.rs
use crate::labor_model::{ClockTime, EmployeeId, JobNum, LaborInterval, ShiftRow};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

pub const DEFAULT_SLICE_MINUTES: u32 = 5;

// --- Break windows ---

/// Lunch and break windows per employee, built from the shift roster.
/// An employee may have several rows (one per shift-break definition).
#[derive(Debug, Clone, Default)]
pub struct BreakWindows {
    by_employee: HashMap<EmployeeId, Vec<(ClockTime, ClockTime)>>,
}

impl BreakWindows {
    pub fn from_shift_rows(rows: &[ShiftRow]) -> Self {
        let mut by_employee: HashMap<EmployeeId, Vec<(ClockTime, ClockTime)>> = HashMap::new();
        for row in rows {
            let windows = by_employee.entry(row.emp_id.trim().to_string()).or_default();
            // Only fully specified windows suppress anything.
            if let (Some(start), Some(end)) = (row.lunch_start, row.lunch_end) {
                windows.push((
                    ClockTime::from_decimal_hours(start),
                    ClockTime::from_decimal_hours(end),
                ));
            }
            if let (Some(start), Some(end)) = (row.break_start, row.break_end) {
                windows.push((
                    ClockTime::from_decimal_hours(start),
                    ClockTime::from_decimal_hours(end),
                ));
            }
        }
        Self { by_employee }
    }

    /// True when `time` lies inside any lunch or break window of `employee`, bounds inclusive.
    pub fn is_on_break(&self, employee: &str, time: ClockTime) -> bool {
        self.by_employee
            .get(employee)
            .map(|windows| {
                windows
                    .iter()
                    .any(|(start, end)| *start <= time && time <= *end)
            })
            .unwrap_or(false)
    }
}

// --- Occupancy grid ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridRow {
    pub job: JobNum,
    pub employee: EmployeeId,
}

/// Occupancy matrix: one row per (job, employee), one column per time slice.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    pub slice_minutes: u32,
    pub slices: Vec<ClockTime>,
    pub rows: Vec<GridRow>,
    /// `cells[row][slice]`, 1 when occupied.
    pub cells: Vec<Vec<u8>>,
}

impl OccupancyGrid {
    #[cfg(test)]
    pub fn row_index(&self, job: &str, employee: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.job == job && row.employee == employee)
    }

    #[cfg(test)]
    pub fn cell_at(&self, job: &str, employee: &str, slice: ClockTime) -> Option<u8> {
        let row = self.row_index(job, employee)?;
        let column = self.slices.iter().position(|s| *s == slice)?;
        Some(self.cells[row][column])
    }
}

/// Builds the closed axis `[start, end]` at `step_minutes`. The last slice is
/// the last step not after `end`.
pub fn build_time_axis(start: ClockTime, end: ClockTime, step_minutes: u32) -> Vec<ClockTime> {
    let step = step_minutes.max(1) * 60;
    let mut axis = Vec::new();
    let mut current = Some(start);
    while let Some(slice) = current {
        if slice > end {
            break;
        }
        axis.push(slice);
        current = slice.checked_add_seconds(step);
    }
    axis
}

/// Builds the occupancy grid for one day of intervals, closing open intervals
/// at `now`. Returns `None` when there are no intervals.
///
/// Idle slices (no occupancy in any row) are removed after the full grid is built.
pub fn build_occupancy_grid(
    intervals: &[LaborInterval],
    breaks: &BreakWindows,
    now: ClockTime,
    slice_minutes: u32,
) -> Option<OccupancyGrid> {
    let resolved: Vec<(&LaborInterval, ClockTime, ClockTime)> = intervals
        .iter()
        .map(|interval| {
            let (start, end) = interval.resolve(now);
            (interval, start, end)
        })
        .collect();

    let min_time = resolved.iter().map(|(_, start, _)| *start).min()?;
    let max_time = resolved.iter().map(|(_, _, end)| *end).max()?;
    let slices = build_time_axis(min_time, max_time, slice_minutes);

    let jobs: BTreeSet<&str> = intervals.iter().map(|i| i.job.as_str()).collect();
    let employees: BTreeSet<&str> = intervals.iter().map(|i| i.employee.as_str()).collect();

    let rows: Vec<GridRow> = jobs
        .iter()
        .flat_map(|job| {
            employees.iter().map(move |employee| GridRow {
                job: job.to_string(),
                employee: employee.to_string(),
            })
        })
        .collect();

    let mut spans: HashMap<(&str, &str), Vec<(ClockTime, ClockTime)>> = HashMap::new();
    for (interval, start, end) in &resolved {
        spans
            .entry((interval.job.as_str(), interval.employee.as_str()))
            .or_default()
            .push((*start, *end));
    }

    let on_break: HashMap<&str, Vec<bool>> = employees
        .iter()
        .map(|employee| {
            let flags = slices
                .iter()
                .map(|slice| breaks.is_on_break(employee, *slice))
                .collect();
            (*employee, flags)
        })
        .collect();

    let cells: Vec<Vec<u8>> = rows
        .iter()
        .map(|row| {
            let pair_spans = spans.get(&(row.job.as_str(), row.employee.as_str()));
            let breaks_for_employee = on_break.get(row.employee.as_str());
            slices
                .iter()
                .enumerate()
                .map(|(column, slice)| {
                    let covered = pair_spans
                        .map(|spans| {
                            spans
                                .iter()
                                .any(|(start, end)| *start <= *slice && *slice <= *end)
                        })
                        .unwrap_or(false);
                    let resting = breaks_for_employee
                        .map(|flags| flags[column])
                        .unwrap_or(false);
                    u8::from(covered && !resting)
                })
                .collect()
        })
        .collect();

    let mut grid = OccupancyGrid {
        slice_minutes,
        slices,
        rows,
        cells,
    };
    let dense = grid.slices.len();
    drop_idle_slices(&mut grid);
    debug!(
        "Built occupancy grid: {} rows, {} of {} slices occupied ({} - {})",
        grid.rows.len(),
        grid.slices.len(),
        dense,
        min_time,
        max_time
    );
    Some(grid)
}

fn drop_idle_slices(grid: &mut OccupancyGrid) {
    let keep: Vec<bool> = (0..grid.slices.len())
        .map(|column| grid.cells.iter().any(|row| row[column] != 0))
        .collect();

    let mut column = 0;
    grid.slices.retain(|_| {
        let k = keep[column];
        column += 1;
        k
    });
    for row in grid.cells.iter_mut() {
        let mut column = 0;
        row.retain(|_| {
            let k = keep[column];
            column += 1;
            k
        });
    }
}
