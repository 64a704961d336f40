// src/not_clocked_in.rs
use crate::dept_translate::DeptTranslate;
use crate::labor_model::{NotClockedInRecord, NotClockedInRow, OprSeq};
use tracing::debug;

/// `"First L."`, or just the first name when there is no last name.
pub fn first_name_last_initial(first: &str, last: &str) -> String {
    match last.chars().next() {
        Some(initial) => format!("{} {}.", first, initial),
        None => first.to_string(),
    }
}

/// Tags employees that hold an open labor header but no labor detail with the
/// operation sequence of their department.
pub fn audit_not_clocked_in(rows: &[NotClockedInRow], depts: &DeptTranslate) -> Vec<NotClockedInRecord> {
    rows.iter()
        .filter(|row| {
            if row.labor_count > 0 {
                debug!(
                    "Employee {} has {} labor rows, not listed as unclocked",
                    row.employee_num, row.labor_count
                );
                return false;
            }
            true
        })
        .map(|row| {
            let first_name = row.first_name.trim().to_string();
            let last_name = row.last_name.trim().to_string();
            NotClockedInRecord {
                employee_num: row.employee_num.trim().to_string(),
                name: first_name_last_initial(&first_name, &last_name),
                opr_seq: depts.opr_seq_for_dept(&row.jc_dept),
                jc_dept: row.jc_dept.trim().to_string(),
                labor_count: row.labor_count,
                first_name,
                last_name,
            }
        })
        .collect()
}

pub fn filter_by_opr_seq(records: &[NotClockedInRecord], opr_seq: OprSeq) -> Vec<NotClockedInRecord> {
    records
        .iter()
        .filter(|record| record.opr_seq == Some(opr_seq))
        .cloned()
        .collect()
}
