// src/main.rs

use reqwest::Client;
use serde::Deserialize;
use std::error::Error;

// Response types
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct EfficiencyRow {
    #[serde(rename = "JobNum")]
    job_num: String,
    #[serde(rename = "ActiveLabor")]
    active_labor: f64,
    #[serde(rename = "Efficiency")]
    efficiency: f64,
    #[serde(rename = "Emps")]
    emps: String,
}

#[derive(Debug, Deserialize)]
struct EfficiencyResponse {
    active_labor: Vec<EfficiencyRow>,
    empsnotclocked: Vec<serde_json::Value>,
    timestamp: Option<String>,
    executiontime: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForcedUpdate {
    message: String,
    executiontime: f64,
    status: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url =
        std::env::var("LABORPULSE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let opr_seq = std::env::args().nth(1).unwrap_or_else(|| "220".to_string());
    let client = Client::new();

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health_response = client
        .get(format!("{}/health", base_url))
        .send()
        .await?;
    println!("Health status: {}", health_response.status());
    let health = health_response.json::<HealthResponse>().await?;
    println!("Health: {}", health.status);

    // Test 2: Version
    println!("\n🔍 Testing root endpoint...");
    let root_response = client.get(&base_url).send().await?;
    println!("Root body: {}", root_response.text().await?);

    // Test 3: Forced refresh
    println!("\n🔍 Forcing a labor refresh...");
    let forced = client
        .get(format!("{}/Epicor/Labor/ForceActiveLaborUpdate", base_url))
        .send()
        .await?;
    let forced_status = forced.status();
    let forced = forced.json::<ForcedUpdate>().await?;
    println!(
        "{} ({}): {} in {:.2}s",
        forced.message, forced_status, forced.status, forced.executiontime
    );

    // Test 4: Efficiency for one operation
    println!("\n🔍 Fetching labor efficiency for OprSeq {}...", opr_seq);
    let efficiency = client
        .get(format!("{}/Epicor/Labor/ActiveLaborEfficiency", base_url))
        .query(&[("OprSeq", opr_seq.as_str())])
        .send()
        .await?
        .json::<EfficiencyResponse>()
        .await?;
    println!(
        "Snapshot taken {:?} in {:?}s",
        efficiency.timestamp, efficiency.executiontime
    );
    for row in &efficiency.active_labor {
        println!(
            "  {:<12} {:>6.2} h  {:>5.0}%  {}",
            row.job_num,
            row.active_labor,
            row.efficiency * 100.0,
            row.emps
        );
    }
    println!("  {} employees not clocked into jobs", efficiency.empsnotclocked.len());

    // Test 5: CSV export
    println!("\n🔍 Fetching CSV export...");
    let csv = client
        .get(format!("{}/Epicor/Labor/ActiveLaborEfficiency", base_url))
        .query(&[("OprSeq", opr_seq.as_str()), ("format", "csv")])
        .send()
        .await?
        .text()
        .await?;
    println!("{}", csv);

    // Test 6: Scheduler and stats
    for path in ["/scheduler/status", "/Epicor/Labor/ExecutionTimes", "/actfast/stats"] {
        println!("\n🔍 Testing {}...", path);
        let body = client
            .get(format!("{}{}", base_url, path))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    println!("\n✅ Testing complete!");

    Ok(())
}
