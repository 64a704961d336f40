// src/labor_model.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type EmployeeId = String;
pub type JobNum = String;
pub type OprSeq = i32;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

// ERP clock-out values that mean "still clocked in".
const CLOCK_OUT_ACTIVE: Decimal = dec!(24);
const CLOCK_OUT_UNSET: Decimal = dec!(0);

// --- Time of day ---

/// Time of day with whole-second resolution, stored as seconds since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

impl ClockTime {
    pub fn from_seconds(seconds: u32) -> Self {
        Self(seconds.min(SECONDS_PER_DAY - 1))
    }

    pub fn hms(hour: u32, minute: u32, second: u32) -> Self {
        Self::from_seconds(hour * 3600 + minute * 60 + second)
    }

    /// Converts ERP decimal hours (e.g. `13.75`) to a clock time, truncating to whole seconds.
    /// Negative and non-representable values clamp into the day.
    pub fn from_decimal_hours(hours: Decimal) -> Self {
        let seconds = (hours * dec!(3600)).floor();
        if seconds <= Decimal::ZERO {
            return Self(0);
        }
        Self::from_seconds(seconds.to_u32().unwrap_or(SECONDS_PER_DAY - 1))
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self::from_seconds(time.num_seconds_from_midnight())
    }

    pub fn checked_add_seconds(self, seconds: u32) -> Option<Self> {
        let next = self.0.checked_add(seconds)?;
        (next < SECONDS_PER_DAY).then_some(Self(next))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 % 3600) / 60,
            self.0 % 60
        )
    }
}

// --- Core domain types ---

/// End of a labor interval. `Open` rows are still clocked in and are closed
/// with the pass's current time when the grid is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOut {
    Closed(ClockTime),
    Open,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaborInterval {
    pub employee: EmployeeId,
    pub job: JobNum,
    pub clock_in: ClockTime,
    pub clock_out: ClockOut,
    pub active: bool,
}

impl LaborInterval {
    pub fn from_row(row: &LaborDtlRow) -> Self {
        let clock_out = if row.clock_out_time == CLOCK_OUT_ACTIVE
            || row.clock_out_time == CLOCK_OUT_UNSET
        {
            ClockOut::Open
        } else {
            ClockOut::Closed(ClockTime::from_decimal_hours(row.clock_out_time))
        };

        Self {
            employee: row.employee_num.trim().to_string(),
            job: row.job_num.trim().to_string(),
            clock_in: ClockTime::from_decimal_hours(row.clock_in_time),
            clock_out,
            active: row.active_trans,
        }
    }

    /// Concrete `[clock_in, clock_out]` bounds, closing open rows at `now`.
    pub fn resolve(&self, now: ClockTime) -> (ClockTime, ClockTime) {
        match self.clock_out {
            ClockOut::Closed(out) => (self.clock_in, out),
            ClockOut::Open => (self.clock_in, now),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStandard {
    pub opr_seq: OprSeq,
    pub job: JobNum,
    pub part_num: String,
    pub standard_hours: Decimal,
    pub previous_hours: Decimal,
}

impl From<&JobStandardRow> for JobStandard {
    fn from(row: &JobStandardRow) -> Self {
        Self {
            opr_seq: row.opr_seq,
            job: row.job_num.trim().to_string(),
            part_num: row.part_num.trim().to_string(),
            standard_hours: row.standard,
            previous_hours: row.act_prod_hours,
        }
    }
}

// --- Rows delivered by the ERP query layer ---
//
// Field names follow the BAQ column naming (`Table_Column`); the bare column
// names are accepted as aliases so hand-written fixtures stay short.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaborDtlRow {
    #[serde(rename = "LaborDtl_EmployeeNum", alias = "EmployeeNum")]
    pub employee_num: String,
    #[serde(rename = "LaborDtl_JobNum", alias = "JobNum")]
    pub job_num: String,
    #[serde(rename = "LaborDtl_OprSeq", alias = "OprSeq")]
    pub opr_seq: OprSeq,
    #[serde(
        rename = "LaborDtl_ClockInDate",
        alias = "ClockInDate",
        with = "erp_date"
    )]
    pub clock_in_date: NaiveDate,
    #[serde(rename = "LaborDtl_ClockInTime", alias = "ClockInTime")]
    pub clock_in_time: Decimal,
    #[serde(rename = "LaborDtl_ClockOutTime", alias = "ClockOutTime")]
    pub clock_out_time: Decimal,
    #[serde(
        rename = "LaborDtl_ActiveTrans",
        alias = "ActiveTrans",
        deserialize_with = "erp_flag::deserialize"
    )]
    pub active_trans: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftRow {
    #[serde(rename = "EmpBasic_EmpID", alias = "Empid")]
    pub emp_id: String,
    #[serde(rename = "EmpBasic_FirstName", alias = "FirstName", default)]
    pub first_name: String,
    #[serde(rename = "EmpBasic_LastName", alias = "LastName", default)]
    pub last_name: String,
    #[serde(rename = "EmpBasic_JCDept", alias = "JCDept", default)]
    pub jc_dept: String,
    #[serde(rename = "JCShift_Shift", alias = "Shift", default)]
    pub shift: i32,
    #[serde(rename = "JCShift_StartTime", alias = "StartTime", default)]
    pub start_time: Option<Decimal>,
    #[serde(rename = "JCShift_EndTime", alias = "EndTime", default)]
    pub end_time: Option<Decimal>,
    #[serde(rename = "JCShift_LunchStart", alias = "LunchStart", default)]
    pub lunch_start: Option<Decimal>,
    #[serde(rename = "JCShift_LunchEnd", alias = "LunchEnd", default)]
    pub lunch_end: Option<Decimal>,
    #[serde(rename = "ShiftBrk_BreakStart", alias = "BreakStart", default)]
    pub break_start: Option<Decimal>,
    #[serde(rename = "ShiftBrk_BreakEnd", alias = "BreakEnd", default)]
    pub break_end: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStandardRow {
    #[serde(rename = "LaborDtl_OprSeq", alias = "OprSeq")]
    pub opr_seq: OprSeq,
    #[serde(rename = "LaborDtl_JobNum", alias = "JobNum")]
    pub job_num: String,
    #[serde(rename = "JobHead_PartNum", alias = "PartNum", default)]
    pub part_num: String,
    #[serde(rename = "JobOper_EstProdHours", alias = "Standard", default)]
    pub standard: Decimal,
    #[serde(rename = "JobOper_ActProdHours", alias = "ActProdHours", default)]
    pub act_prod_hours: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAssignmentRow {
    #[serde(rename = "LaborDtl_EmployeeNum", alias = "EmployeeNum")]
    pub employee_num: String,
    #[serde(rename = "LaborDtl_JobNum", alias = "JobNum", alias = "Jobnum")]
    pub job_num: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotClockedInRow {
    #[serde(rename = "LaborHed_EmployeeNum", alias = "employeenum")]
    pub employee_num: String,
    #[serde(rename = "EmpBasic_FirstName", alias = "FirstName", default)]
    pub first_name: String,
    #[serde(rename = "EmpBasic_LastName", alias = "LastName", default)]
    pub last_name: String,
    #[serde(rename = "EmpBasic_JCDept", alias = "jcdept", default)]
    pub jc_dept: String,
    #[serde(rename = "Calculated_LaborCount", alias = "Laborcount", default)]
    pub labor_count: i64,
}

// --- Published records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EfficiencyRecord {
    pub opr_seq: OprSeq,
    pub job_num: JobNum,
    pub part_num: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub standard: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub prev_hrs: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub active_labor: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub efficiency: Decimal,
    pub emps: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotClockedInRecord {
    #[serde(rename = "employeenum")]
    pub employee_num: EmployeeId,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "jcdept")]
    pub jc_dept: String,
    #[serde(rename = "Laborcount")]
    pub labor_count: i64,
    #[serde(rename = "OprSeq")]
    pub opr_seq: Option<OprSeq>,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Result of one refresh pass. `active_labor` and `not_clocked_in` are `None`
/// when the pass found nothing to report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub active_labor: Option<Vec<EfficiencyRecord>>,
    #[serde(rename = "empsnotclocked")]
    pub not_clocked_in: Option<Vec<NotClockedInRecord>>,
    pub timestamp: NaiveDateTime,
    #[serde(rename = "executiontime")]
    pub execution_time_secs: f64,
}

// --- serde helpers for ERP value formats ---

/// ERP dates arrive either as `2024-05-06` or `2024-05-06T00:00:00`.
pub mod erp_date {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                    .ok()
                    .map(|dt| dt.date())
            })
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid ERP date '{}'", raw)))
    }
}

/// Flags arrive as JSON booleans from the REST service and as 0/1 from SQL exports.
mod erp_flag {
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Int(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match RawFlag::deserialize(deserializer) {
            Ok(RawFlag::Bool(flag)) => Ok(flag),
            Ok(RawFlag::Int(value)) => Ok(value != 0),
            Err(_) => Err(D::Error::custom("expected boolean or 0/1 flag")),
        }
    }
}
