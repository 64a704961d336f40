// src/routes_tests.rs

#[cfg(test)]
mod tests {
    use crate::dept_translate::DeptTranslate;
    use crate::erp_client::{ErpError, FixtureSource, LaborSource};
    use crate::labor_model::*;
    use crate::labor_pipeline::LaborInputs;
    use crate::refresh_scheduler::{PassClock, RefreshDriver};
    use crate::routes::{build_router, AppState};
    use crate::snapshot_store::SnapshotStore;
    use crate::stats::{StatsManager, GET_LABOR_EFFICIENCY, GET_SETTINGS};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use chrono::{NaiveDate, NaiveDateTime};
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn labor_row(emp: &str, job: &str, opr: OprSeq) -> LaborDtlRow {
        LaborDtlRow {
            employee_num: emp.to_string(),
            job_num: job.to_string(),
            opr_seq: opr,
            clock_in_date: noon().date(),
            clock_in_time: dec!(9),
            clock_out_time: dec!(10),
            active_trans: true,
        }
    }

    fn standard(job: &str, opr: OprSeq) -> JobStandardRow {
        JobStandardRow {
            opr_seq: opr,
            job_num: job.to_string(),
            part_num: format!("P-{}", job),
            standard: dec!(2),
            act_prod_hours: dec!(0),
        }
    }

    fn unclocked(emp: &str, dept: &str) -> NotClockedInRow {
        NotClockedInRow {
            employee_num: emp.to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            jc_dept: dept.to_string(),
            labor_count: 0,
        }
    }

    fn two_departments() -> LaborInputs {
        LaborInputs {
            labor_rows: vec![labor_row("101", "J1", 220), labor_row("102", "J2", 520)],
            shift_rows: vec![],
            job_standards: vec![standard("J1", 220), standard("J2", 520)],
            active_assignments: vec![
                ActiveAssignmentRow {
                    employee_num: "101".to_string(),
                    job_num: "J1".to_string(),
                },
                ActiveAssignmentRow {
                    employee_num: "102".to_string(),
                    job_num: "J2".to_string(),
                },
            ],
            not_clocked_in: vec![unclocked("1234", "LU"), unclocked("5678", "PAINT")],
        }
    }

    fn app_with(source: Arc<dyn LaborSource>) -> (Router, AppState) {
        let stats = Arc::new(StatsManager::new(None, noon()));
        let driver = Arc::new(RefreshDriver::new(
            source,
            Arc::new(SnapshotStore::in_memory()),
            stats.clone(),
            DeptTranslate::default(),
            PassClock::fixed(noon(), chrono_tz::US::Pacific),
            None,
            5,
            Duration::from_secs(300),
        ));
        let state = AppState { driver, stats };
        (build_router(state.clone()), state)
    }

    fn app() -> (Router, AppState) {
        app_with(Arc::new(FixtureSource::from_inputs(two_departments())))
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = get(app, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn root_reports_version() {
        let (app, _) = app();
        let (status, body) = get_json(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn efficiency_before_first_pass_is_empty() {
        let (app, _) = app();
        let (status, body) = get_json(&app, "/Epicor/Labor/ActiveLaborEfficiency?OprSeq=220").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_labor"], serde_json::json!([]));
        assert_eq!(body["empsnotclocked"], serde_json::json!([]));
        assert_eq!(body["oprseq"], 220);
        assert!(body["timestamp"].is_null());
        assert!(body["executiontime"].is_null());
    }

    #[tokio::test]
    async fn efficiency_is_filtered_by_operation() {
        let (app, state) = app();
        state.driver.run_pass().await;

        let (status, body) = get_json(&app, "/Epicor/Labor/ActiveLaborEfficiency?OprSeq=520").await;
        assert_eq!(status, StatusCode::OK);
        let labor = body["active_labor"].as_array().unwrap();
        assert_eq!(labor.len(), 1);
        assert_eq!(labor[0]["JobNum"], "J2");
        assert_eq!(labor[0]["ActiveLabor"], 1.08);
        assert_eq!(labor[0]["Efficiency"], 0.54);
        let unclocked = body["empsnotclocked"].as_array().unwrap();
        assert_eq!(unclocked.len(), 1);
        assert_eq!(unclocked[0]["employeenum"], "5678");
        assert_eq!(unclocked[0]["Name"], "John D.");
        assert_eq!(body["timestamp"], "2024-05-06T12:00:00");

        let (_, all) = get_json(&app, "/Epicor/Labor/ActiveLaborEfficiency").await;
        assert_eq!(all["active_labor"].as_array().unwrap().len(), 2);
        assert_eq!(state.stats.get(GET_LABOR_EFFICIENCY).unwrap().count, 2);
    }

    #[tokio::test]
    async fn efficiency_exports_csv() {
        let (app, state) = app();
        state.driver.run_pass().await;

        let (status, headers, body) =
            get(&app, "/Epicor/Labor/ActiveLaborEfficiency?OprSeq=220&format=csv").await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
        let text = String::from_utf8(body).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("OprSeq,JobNum,PartNum,Standard,PrevHrs,ActiveLabor,Efficiency,Emps")
        );
        assert!(lines.next().unwrap().starts_with("220,J1,P-J1,"));
        assert_eq!(lines.next(), None);

        let (status, _) = get_json(&app, "/Epicor/Labor/ActiveLaborEfficiency?format=xml").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn not_clocked_in_list_is_filterable() {
        let (app, state) = app();
        state.driver.run_pass().await;

        let (_, all) = get_json(&app, "/Epicor/Labor/EmployeesNotClockedIntoJobs").await;
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (_, lu) = get_json(&app, "/Epicor/Labor/EmployeesNotClockedIntoJobs?oprseq=220").await;
        let lu = lu.as_array().unwrap();
        assert_eq!(lu.len(), 1);
        assert_eq!(lu[0]["jcdept"], "LU");
        assert_eq!(lu[0]["OprSeq"], 220);
    }

    #[tokio::test]
    async fn forced_update_runs_a_pass() {
        let (app, state) = app();
        let (status, body) = get_json(&app, "/Epicor/Labor/ForceActiveLaborUpdate").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Forced Labor Update");
        assert_eq!(body["status"], "Data Processed.");
        assert!(body["executiontime"].as_f64().unwrap() >= 0.0);
        assert!(state.driver.store().current().await.is_some());

        let (_, times) = get_json(&app, "/Epicor/Labor/ExecutionTimes").await;
        assert!(times.get("Last_Exec_Time").is_some());
        assert!(times.get("Min_Exect_Time").is_some());
    }

    struct BlockingSource {
        inner: FixtureSource,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl LaborSource for BlockingSource {
        async fn fetch_labor_intervals(&self, date: NaiveDate) -> Result<Vec<LaborDtlRow>, ErpError> {
            self.inner.fetch_labor_intervals(date).await
        }
        async fn fetch_shift_windows(&self) -> Result<Vec<ShiftRow>, ErpError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.fetch_shift_windows().await
        }
        async fn fetch_active_job_standards(&self) -> Result<Vec<JobStandardRow>, ErpError> {
            self.inner.fetch_active_job_standards().await
        }
        async fn fetch_active_labor_assignments(&self) -> Result<Vec<ActiveAssignmentRow>, ErpError> {
            self.inner.fetch_active_labor_assignments().await
        }
        async fn fetch_not_clocked_in(&self, date: NaiveDate) -> Result<Vec<NotClockedInRow>, ErpError> {
            self.inner.fetch_not_clocked_in(date).await
        }
        fn describe(&self) -> String {
            "blocking".to_string()
        }
    }

    #[tokio::test]
    async fn forced_update_conflicts_with_a_running_pass() {
        let source = Arc::new(BlockingSource {
            inner: FixtureSource::from_inputs(two_departments()),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let (app, state) = app_with(source.clone());

        let scheduled = {
            let driver = state.driver.clone();
            tokio::spawn(async move { driver.run_pass().await })
        };
        source.entered.notified().await;

        let (status, body) = get_json(&app, "/Epicor/Labor/ForceActiveLaborUpdate").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "Refresh already running.");

        source.release.notify_one();
        scheduled.await.unwrap();
    }

    #[tokio::test]
    async fn health_follows_the_refresh_task() {
        let (app, state) = app();
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "ERROR");

        state.driver.spawn();
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn scheduler_status_lists_the_refresh_job() {
        let (app, _) = app();
        let (status, body) = get_json(&app, "/scheduler/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ERROR");
        assert_eq!(body["jobs"][0]["id"], "labor_refresh");
        assert_eq!(body["jobs"][0]["name"], "process_live_labor");
    }

    #[tokio::test]
    async fn settings_and_stats_views() {
        let (app, _) = app();
        let (status, settings) = get_json(&app, "/Config/Settings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settings["refresh_interval"], 300);
        assert_eq!(settings["dept_translate"]["220"], serde_json::json!(["LU"]));

        let (status, stats) = get_json(&app, "/actfast/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["start_date"], "2024-05-06T12:00:00");
        assert_eq!(stats["stats"][GET_SETTINGS]["count"], 1);
    }
}
