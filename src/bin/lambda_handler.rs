//! AWS Lambda handler for charge and reserve runs
//!
//! Accepts a run request as JSON (smoothed parameter rows or raw paired
//! estimates, plus config overrides) and returns charge and reserve rows.
//!
//! Works both as a direct invocation and behind a Lambda Function URL; for the
//! latter the request arrives in `body` and the response is wrapped with a
//! status code and CORS headers.

use std::time::Instant;

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use heritor_reserve::assumptions::PairedEstimateSet;
use heritor_reserve::demographics::{PairedEstimate, SmoothedPoint};
use heritor_reserve::output::{ChargeRow, SmoothedRow};
use heritor_reserve::{
    Assumptions, HeritorConfig, HeritorError, Parameter, ParameterTable, ReserveResult,
    ScenarioRunner, Sex,
};

/// Raw paired estimate as sent in a request
#[derive(Debug, Deserialize)]
pub struct EstimateInput {
    pub age: u32,
    pub sex: Sex,
    pub parameter: Parameter,
    #[serde(default)]
    pub group_value: Option<f64>,
    #[serde(default)]
    pub group_n: f64,
    pub reference_value: f64,
    #[serde(default)]
    pub reference_n: f64,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Config overrides; omitted fields keep their defaults
    #[serde(default)]
    pub config: HeritorConfig,

    /// Pre-smoothed parameter rows
    #[serde(default)]
    pub parameters: Vec<SmoothedRow>,

    /// Raw paired estimates, smoothed before the run when `parameters` is empty
    #[serde(default)]
    pub estimates: Vec<EstimateInput>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub charges: Vec<ChargeRow>,
    pub reserves: Vec<ReserveResult>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn parameter_table(request: &RunRequest) -> Result<ParameterTable, HeritorError> {
    let config = &request.config.credibility;

    if !request.parameters.is_empty() {
        let points = request.parameters.iter().map(|row| {
            (
                row.parameter,
                row.sex,
                SmoothedPoint {
                    age: row.age,
                    value: row.value,
                    raw_group: row.raw_group,
                    raw_reference: row.raw_reference,
                    delta: row.delta,
                    z: row.z,
                    n: row.n,
                },
            )
        });
        return ParameterTable::from_points(points, config.sd_floor);
    }

    if request.estimates.is_empty() {
        return Err(HeritorError::InvalidConfig(
            "request needs either parameters or estimates".into(),
        ));
    }

    let mut set = PairedEstimateSet::new();
    for e in &request.estimates {
        set.entry((e.parameter, e.sex)).or_default().push(PairedEstimate {
            age: e.age,
            group_value: e.group_value,
            group_n: e.group_n,
            reference_value: e.reference_value,
            reference_n: e.reference_n,
        });
    }
    ParameterTable::smooth(&set, config)
}

fn execute(request: RunRequest, start: Instant) -> Result<RunResponse, HeritorError> {
    request.config.validate_remote()?;
    let parameters = parameter_table(&request)?;
    let mortality = request.config.mortality.load()?;

    let mut runner = ScenarioRunner::new(Assumptions::new(mortality, parameters), request.config)?;
    let output = runner.run()?;

    Ok(RunResponse {
        charges: output.charge_rows(),
        reserves: output.reserves,
        cache_hits: runner.cache().cache_hits,
        cache_misses: runner.cache().cache_misses,
        execution_time_ms: start.elapsed().as_millis() as u64,
        error: None,
    })
}

fn error_body(message: String, start: Instant) -> RunResponse {
    RunResponse {
        charges: Vec::new(),
        reserves: Vec::new(),
        cache_hits: 0,
        cache_misses: 0,
        execution_time_ms: start.elapsed().as_millis() as u64,
        error: Some(message),
    }
}

fn url_response(status: u16, body: &RunResponse) -> Result<Value, Error> {
    Ok(json!({
        "statusCode": status,
        "headers": {
            "Content-Type": "application/json",
            "Access-Control-Allow-Origin": "*",
            "Access-Control-Allow-Methods": "POST, OPTIONS",
            "Access-Control-Allow-Headers": "Content-Type",
        },
        "body": serde_json::to_string(body)?,
    }))
}

/// Lambda handler function
async fn handler(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let start = Instant::now();
    let payload = event.payload;

    // Direct invocation: the payload is the request itself
    if payload.get("requestContext").is_none() {
        let request: RunRequest = serde_json::from_value(payload)?;
        let response = execute(request, start)?;
        return Ok(serde_json::to_value(response)?);
    }

    // Function URL: handle CORS preflight, then parse the body
    let method = payload
        .pointer("/requestContext/http/method")
        .and_then(Value::as_str)
        .unwrap_or("POST");
    if method == "OPTIONS" {
        return Ok(json!({
            "statusCode": 200,
            "headers": {
                "Access-Control-Allow-Origin": "*",
                "Access-Control-Allow-Methods": "POST, OPTIONS",
                "Access-Control-Allow-Headers": "Content-Type",
            },
            "body": "",
        }));
    }
    if payload.get("isBase64Encoded").and_then(Value::as_bool).unwrap_or(false) {
        return url_response(400, &error_body("Binary bodies are not supported".into(), start));
    }

    let body = payload.get("body").and_then(Value::as_str).unwrap_or("{}");
    let request: RunRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return url_response(400, &error_body(format!("Invalid JSON: {}", e), start)),
    };

    match execute(request, start) {
        Ok(response) => url_response(200, &response),
        Err(e) if e.is_validation() => url_response(400, &error_body(e.to_string(), start)),
        Err(e) => url_response(500, &error_body(e.to_string(), start)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    run(service_fn(handler)).await
}
