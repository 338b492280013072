use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use utoipa::OpenApi;

use super::dto::{
    ActuatorStatusDto, AlertDto, CommandDto, DispatchOutcomeDto, ManualCommandDto,
    SensorReadingDto, SensorStatsDto, StatsDto,
};
use super::errors::AppError;
use crate::control::dispatch::{CommandDispatcher, CommandRequest};
use crate::control::service::{ActuatorOutcome, OutcomeKind, SiteControlOutcome};
use crate::control::ControlEngine;
use crate::db::models::{
    ActuatorKind, ActuatorLevel, ActuatorState, Alert, AlertSeverity, Command, CommandSource,
    SensorKind, SensorReading,
};
use crate::ingest::{IngestOutcome, IngestionService, ReadingSubmission, SensorValue};
use crate::thresholds::{FanThresholds, PumpThresholds, ThresholdConfig, ThresholdStore};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ingest: IngestionService,
    pub control: ControlEngine,
    pub dispatcher: CommandDispatcher,
    pub thresholds: ThresholdStore,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TimeRangeParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Ingest one sensor reading snapshot. Redelivering an already-stored
/// snapshot returns `200 OK` with an empty body instead of `201`.
#[utoipa::path(
    post,
    path = "/readings",
    request_body = ReadingSubmission,
    responses(
        (status = 201, description = "Reading stored", body = Vec<SensorReadingDto>),
        (status = 200, description = "Duplicate delivery; already stored"),
        (status = 400, description = "Malformed or out-of-range reading"),
    ),
    tag = "sensors"
)]
pub async fn post_reading(
    State(state): State<AppState>,
    Json(submission): Json<ReadingSubmission>,
) -> Result<(StatusCode, Json<Vec<SensorReadingDto>>), AppError> {
    match state.ingest.ingest(submission).await? {
        IngestOutcome::Stored { readings, .. } => Ok((
            StatusCode::CREATED,
            Json(readings.into_iter().map(Into::into).collect()),
        )),
        IngestOutcome::Duplicate => Ok((StatusCode::OK, Json(Vec::new()))),
    }
}

/// List every site id that has at least one stored reading.
#[utoipa::path(
    get,
    path = "/sites",
    responses(
        (status = 200, description = "Known site ids", body = Vec<String>),
    ),
    tag = "sensors"
)]
pub async fn get_sites(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let sites = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT site_id FROM sensor_readings ORDER BY site_id",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(sites))
}

/// Fetch the latest reading per sensor kind for a site.
#[utoipa::path(
    get,
    path = "/sites/{site_id}/readings/latest",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
    ),
    responses(
        (status = 200, description = "Latest reading per sensor kind", body = Vec<SensorReadingDto>),
    ),
    tag = "sensors"
)]
pub async fn get_latest_readings(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<Vec<SensorReadingDto>>, AppError> {
    let rows = sqlx::query_as::<_, SensorReading>(
        "SELECT DISTINCT ON (sensor_kind) \
             id, site_id, sensor_kind, recorded_at, value, unit \
         FROM sensor_readings \
         WHERE site_id = $1 \
         ORDER BY sensor_kind, recorded_at DESC",
    )
    .bind(&site_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Fetch time-series readings for a site. Optionally filter by time range
/// with `?from=<RFC3339>&to=<RFC3339>`. Results are ordered by
/// `recorded_at ASC`.
#[utoipa::path(
    get,
    path = "/sites/{site_id}/readings",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
        ("from" = Option<DateTime<Utc>>, Query, description = "Start of time range (RFC3339)"),
        ("to"   = Option<DateTime<Utc>>, Query, description = "End of time range (RFC3339)"),
    ),
    responses(
        (status = 200, description = "Sensor readings", body = Vec<SensorReadingDto>),
    ),
    tag = "sensors"
)]
pub async fn get_reading_history(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Query(params): Query<TimeRangeParams>,
) -> Result<Json<Vec<SensorReadingDto>>, AppError> {
    let rows = sqlx::query_as::<_, SensorReading>(
        "SELECT id, site_id, sensor_kind, recorded_at, value, unit \
         FROM sensor_readings \
         WHERE site_id = $1 \
           AND ($2::timestamptz IS NULL OR recorded_at >= $2) \
           AND ($3::timestamptz IS NULL OR recorded_at <= $3) \
         ORDER BY recorded_at ASC",
    )
    .bind(&site_id)
    .bind(params.from)
    .bind(params.to)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[derive(Debug, FromRow)]
struct AggRow {
    sensor_kind: SensorKind,
    min: f64,
    max: f64,
    avg: f64,
}

#[derive(Debug, FromRow)]
struct CurrentRow {
    sensor_kind: SensorKind,
    value: f64,
}

/// Min/max/avg/current per sensor kind over a trailing window
/// (`?hours=`, default 24, capped at 168), plus reading and alert totals.
#[utoipa::path(
    get,
    path = "/sites/{site_id}/stats",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
        ("hours" = Option<i64>, Query, description = "Window size in hours (default 24, max 168)"),
    ),
    responses(
        (status = 200, description = "Statistical summary", body = StatsDto),
    ),
    tag = "sensors"
)]
pub async fn get_stats(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Query(params): Query<WindowParams>,
) -> Result<Json<StatsDto>, AppError> {
    let hours = params.hours.unwrap_or(24).clamp(1, 168);
    let since = Utc::now() - chrono::Duration::hours(hours);

    let aggregates = sqlx::query_as::<_, AggRow>(
        "SELECT sensor_kind, \
                MIN(value) AS min, MAX(value) AS max, AVG(value) AS avg \
         FROM sensor_readings \
         WHERE site_id = $1 AND recorded_at >= $2 \
         GROUP BY sensor_kind",
    )
    .bind(&site_id)
    .bind(since)
    .fetch_all(&state.pool)
    .await?;

    let currents = sqlx::query_as::<_, CurrentRow>(
        "SELECT DISTINCT ON (sensor_kind) sensor_kind, value \
         FROM sensor_readings \
         WHERE site_id = $1 AND recorded_at >= $2 \
         ORDER BY sensor_kind, recorded_at DESC",
    )
    .bind(&site_id)
    .bind(since)
    .fetch_all(&state.pool)
    .await?;

    let total_readings = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sensor_readings WHERE site_id = $1 AND recorded_at >= $2",
    )
    .bind(&site_id)
    .bind(since)
    .fetch_one(&state.pool)
    .await?;

    let total_alerts = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM alerts WHERE site_id = $1 AND created_at >= $2",
    )
    .bind(&site_id)
    .bind(since)
    .fetch_one(&state.pool)
    .await?;

    let mut sensors = std::collections::BTreeMap::new();
    for agg in aggregates {
        let current = currents
            .iter()
            .find(|c| c.sensor_kind == agg.sensor_kind)
            .map(|c| c.value)
            .unwrap_or(agg.max);
        sensors.insert(
            agg.sensor_kind,
            SensorStatsDto {
                min: agg.min,
                max: agg.max,
                avg: agg.avg,
                current,
            },
        );
    }

    Ok(Json(StatsDto {
        site_id,
        sensors,
        total_readings,
        total_alerts,
        period_hours: hours,
    }))
}

/// Recent alerts for a site, newest first (`?limit=`, default 10, max 100).
#[utoipa::path(
    get,
    path = "/sites/{site_id}/alerts",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
        ("limit" = Option<i64>, Query, description = "Maximum alerts to return (default 10, max 100)"),
    ),
    responses(
        (status = 200, description = "Recent alerts", body = Vec<AlertDto>),
    ),
    tag = "alerts"
)]
pub async fn get_alerts(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<AlertDto>>, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let rows = sqlx::query_as::<_, Alert>(
        "SELECT id, site_id, sensor_kind, value, threshold, severity, message, created_at \
         FROM alerts \
         WHERE site_id = $1 \
         ORDER BY created_at DESC \
         LIMIT $2",
    )
    .bind(&site_id)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

/// Current state of every actuator for a site, plus the active thresholds.
#[utoipa::path(
    get,
    path = "/sites/{site_id}/actuators",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
    ),
    responses(
        (status = 200, description = "Actuator states and thresholds", body = ActuatorStatusDto),
    ),
    tag = "actuators"
)]
pub async fn get_actuator_status(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<ActuatorStatusDto>, AppError> {
    let rows = sqlx::query_as::<_, ActuatorState>(
        "SELECT site_id, actuator, level, reason, source, changed_at, version \
         FROM actuator_state \
         WHERE site_id = $1 \
         ORDER BY actuator",
    )
    .bind(&site_id)
    .fetch_all(&state.pool)
    .await?;

    let thresholds = state.thresholds.get(&site_id).await?;

    Ok(Json(ActuatorStatusDto {
        site_id,
        actuators: rows.into_iter().map(Into::into).collect(),
        thresholds,
    }))
}

/// Applied command history for a site, newest first
/// (`?hours=`, default 24, capped at 168).
#[utoipa::path(
    get,
    path = "/sites/{site_id}/actuators/history",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
        ("hours" = Option<i64>, Query, description = "Window size in hours (default 24, max 168)"),
    ),
    responses(
        (status = 200, description = "Command history", body = Vec<CommandDto>),
    ),
    tag = "actuators"
)]
pub async fn get_actuator_history(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<CommandDto>>, AppError> {
    let hours = params.hours.unwrap_or(24).clamp(1, 168);
    let since = Utc::now() - chrono::Duration::hours(hours);

    let rows = sqlx::query_as::<_, Command>(
        "SELECT id, site_id, actuator, level, reason, source, sensor_values, created_at \
         FROM actuator_commands \
         WHERE site_id = $1 AND created_at >= $2 \
         ORDER BY created_at DESC",
    )
    .bind(&site_id)
    .bind(since)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Run the decision cycle for one site right now instead of waiting for the
/// next scheduled tick.
#[utoipa::path(
    post,
    path = "/sites/{site_id}/actuators/control",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
    ),
    responses(
        (status = 200, description = "Decision outcome per actuator", body = SiteControlOutcome),
        (status = 409, description = "Concurrent actuator-state modification; retry"),
    ),
    tag = "actuators"
)]
pub async fn post_control(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<SiteControlOutcome>, AppError> {
    let outcome = state.control.run_site(&site_id).await?;
    Ok(Json(outcome))
}

/// Manually command an actuator, bypassing the decision engine but not the
/// idempotent dispatch path: a command matching the current state is a
/// no-op.
#[utoipa::path(
    post,
    path = "/sites/{site_id}/actuators/manual",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
    ),
    request_body = ManualCommandDto,
    responses(
        (status = 200, description = "Dispatch outcome", body = DispatchOutcomeDto),
        (status = 400, description = "Level not valid for this actuator"),
        (status = 409, description = "Concurrent actuator-state modification; retry"),
    ),
    tag = "actuators"
)]
pub async fn post_manual(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Json(body): Json<ManualCommandDto>,
) -> Result<Json<DispatchOutcomeDto>, AppError> {
    let reason = body
        .reason
        .unwrap_or_else(|| format!("manual control: {}", body.level));

    let outcome = state
        .dispatcher
        .dispatch(CommandRequest {
            site_id,
            actuator: body.actuator,
            target: body.level,
            reason,
            source: CommandSource::Manual,
            sensor_values: serde_json::json!({}),
        })
        .await?;

    Ok(Json(outcome.into()))
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Active thresholds for a site (defaults when never configured).
#[utoipa::path(
    get,
    path = "/sites/{site_id}/thresholds",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
    ),
    responses(
        (status = 200, description = "Current thresholds", body = ThresholdConfig),
    ),
    tag = "thresholds"
)]
pub async fn get_thresholds(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<ThresholdConfig>, AppError> {
    Ok(Json(state.thresholds.get(&site_id).await?))
}

/// Replace a site's thresholds. Candidates violating the band-ordering
/// invariants are rejected and the stored config is left unchanged.
#[utoipa::path(
    put,
    path = "/sites/{site_id}/thresholds",
    params(
        ("site_id" = String, Path, description = "Site identifier"),
    ),
    request_body = ThresholdConfig,
    responses(
        (status = 200, description = "Thresholds updated", body = ThresholdConfig),
        (status = 422, description = "Band ordering invariant violated"),
    ),
    tag = "thresholds"
)]
pub async fn put_thresholds(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Json(body): Json<ThresholdConfig>,
) -> Result<Json<ThresholdConfig>, AppError> {
    Ok(Json(state.thresholds.update(&site_id, body).await?))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        post_reading,
        get_sites,
        get_latest_readings,
        get_reading_history,
        get_stats,
        get_alerts,
        get_actuator_status,
        get_actuator_history,
        post_control,
        post_manual,
        get_thresholds,
        put_thresholds,
        health,
    ),
    components(schemas(
        SensorReadingDto,
        ReadingSubmission,
        SensorValue,
        SensorKind,
        AlertDto,
        AlertSeverity,
        ActuatorKind,
        ActuatorLevel,
        CommandSource,
        ActuatorStatusDto,
        CommandDto,
        ManualCommandDto,
        DispatchOutcomeDto,
        ThresholdConfig,
        PumpThresholds,
        FanThresholds,
        StatsDto,
        SensorStatsDto,
        SiteControlOutcome,
        ActuatorOutcome,
        OutcomeKind,
    )),
    tags(
        (name = "sensors",    description = "Sensor reading ingestion and queries"),
        (name = "alerts",     description = "Monitoring alerts"),
        (name = "actuators",  description = "Actuator state, history and control"),
        (name = "thresholds", description = "Hysteresis threshold configuration"),
        (name = "system",     description = "System endpoints"),
    ),
    info(
        title = "Greenhouse Control API",
        version = "0.1.0",
        description = "REST API for greenhouse sensor data and actuator control"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::{json, Value};
    use sqlx::PgPool;

    use super::AppState;
    use crate::alerts::{AlertPublisher, MonitoringLimits};
    use crate::api::router;
    use crate::control::dispatch::CommandDispatcher;
    use crate::control::ControlEngine;
    use crate::ingest::IngestionService;
    use crate::reading_cache::ReadingCache;
    use crate::thresholds::ThresholdStore;

    fn test_state(pool: PgPool) -> AppState {
        let cache = ReadingCache::new();
        let alerts = AlertPublisher::new(pool.clone(), 300);
        let ingest = IngestionService::new(
            pool.clone(),
            cache.clone(),
            alerts,
            MonitoringLimits::default(),
        );
        let dispatcher = CommandDispatcher::new(pool.clone());
        let thresholds = ThresholdStore::new(pool.clone());
        let control = ControlEngine::new(dispatcher.clone(), thresholds.clone(), cache);
        AppState {
            pool,
            ingest,
            control,
            dispatcher,
            thresholds,
        }
    }

    fn test_server(pool: PgPool) -> TestServer {
        TestServer::new(router(test_state(pool))).unwrap()
    }

    fn reading_body(
        site_id: &str,
        recorded_at: DateTime<Utc>,
        temp: f64,
        hum: f64,
        soil: f64,
        light: f64,
    ) -> Value {
        json!({
            "site_id": site_id,
            "recorded_at": recorded_at,
            "sensors": {
                "temperature":     { "value": temp },
                "humidity":        { "value": hum },
                "soil_moisture":   { "value": soil },
                "light_intensity": { "value": light },
            }
        })
    }

    async fn submit(
        server: &TestServer,
        site_id: &str,
        recorded_at: DateTime<Utc>,
        temp: f64,
        hum: f64,
        soil: f64,
        light: f64,
    ) {
        server
            .post("/readings")
            .json(&reading_body(site_id, recorded_at, temp, hum, soil, light))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    // -----------------------------------------------------------------------
    // POST /readings
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn post_reading_stores_one_row_per_kind(pool: PgPool) {
        let server = test_server(pool);
        let resp = server
            .post("/readings")
            .json(&reading_body("site-1", Utc::now(), 22.0, 60.0, 45.0, 12_000.0))
            .await;
        resp.assert_status(axum::http::StatusCode::CREATED);

        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 4);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn post_reading_duplicate_is_accepted_but_not_stored_again(pool: PgPool) {
        let server = test_server(pool);
        let ts = Utc::now();
        let body = reading_body("site-1", ts, 22.0, 60.0, 45.0, 12_000.0);

        server
            .post("/readings")
            .json(&body)
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let resp = server.post("/readings").json(&body).await;
        resp.assert_status_ok();
        let stored: Vec<Value> = resp.json();
        assert!(stored.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn post_reading_rejects_missing_kind(pool: PgPool) {
        let server = test_server(pool);
        let resp = server
            .post("/readings")
            .json(&json!({
                "site_id": "site-1",
                "recorded_at": Utc::now(),
                "sensors": {
                    "temperature": { "value": 22.0 },
                }
            }))
            .await;
        resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn post_reading_rejects_negative_humidity(pool: PgPool) {
        let server = test_server(pool);
        let resp = server
            .post("/readings")
            .json(&reading_body("site-1", Utc::now(), 22.0, -5.0, 45.0, 12_000.0))
            .await;
        resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].as_str().unwrap().contains("humidity"));
    }

    // -----------------------------------------------------------------------
    // Read endpoints
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn sites_lists_each_site_once(pool: PgPool) {
        let server = test_server(pool);
        let now = Utc::now();
        submit(&server, "site-b", now, 22.0, 60.0, 45.0, 12_000.0).await;
        submit(&server, "site-a", now, 22.0, 60.0, 45.0, 12_000.0).await;
        submit(&server, "site-a", now + Duration::minutes(5), 23.0, 61.0, 44.0, 12_100.0).await;

        let resp = server.get("/sites").await;
        resp.assert_status_ok();
        let body: Vec<String> = resp.json();
        assert_eq!(body, vec!["site-a", "site-b"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn latest_returns_most_recent_value_per_kind(pool: PgPool) {
        let server = test_server(pool);
        let now = Utc::now();
        submit(&server, "site-1", now, 22.0, 60.0, 45.0, 12_000.0).await;
        submit(&server, "site-1", now + Duration::minutes(5), 25.0, 58.0, 40.0, 13_000.0).await;

        let resp = server.get("/sites/site-1/readings/latest").await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 4);
        let temp = body
            .iter()
            .find(|r| r["sensor_kind"] == "temperature")
            .unwrap();
        assert_eq!(temp["value"], 25.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn history_is_ascending_and_range_filtered(pool: PgPool) {
        let server = test_server(pool);
        let now = Utc::now();
        submit(&server, "site-1", now - Duration::hours(2), 20.0, 60.0, 45.0, 12_000.0).await;
        submit(&server, "site-1", now - Duration::hours(1), 21.0, 60.0, 45.0, 12_000.0).await;
        submit(&server, "site-1", now, 22.0, 60.0, 45.0, 12_000.0).await;

        // `true` keeps the offset as a literal `Z`, which survives URL query
        // parsing (a `+00:00` offset would decode as a space).
        let from =
            (now - Duration::minutes(90)).to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let resp = server
            .get(&format!("/sites/site-1/readings?from={from}"))
            .await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        // Two snapshots of four kinds each fall inside the range.
        assert_eq!(body.len(), 8);
        for pair in body.windows(2) {
            assert!(
                pair[0]["recorded_at"].as_str().unwrap()
                    <= pair[1]["recorded_at"].as_str().unwrap()
            );
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn stats_aggregates_the_window(pool: PgPool) {
        let server = test_server(pool);
        let now = Utc::now();
        submit(&server, "site-1", now - Duration::minutes(10), 20.0, 60.0, 45.0, 12_000.0).await;
        submit(&server, "site-1", now, 30.0, 60.0, 45.0, 12_000.0).await;

        let resp = server.get("/sites/site-1/stats").await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["total_readings"], 8);
        assert_eq!(body["period_hours"], 24);
        let temp = &body["sensors"]["temperature"];
        assert_eq!(temp["min"], 20.0);
        assert_eq!(temp["max"], 30.0);
        assert_eq!(temp["avg"], 25.0);
        assert_eq!(temp["current"], 30.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn alerts_endpoint_returns_breaches_newest_first(pool: PgPool) {
        let server = test_server(pool);
        // Soil 2% breaches the critical monitoring band.
        submit(&server, "site-1", Utc::now(), 22.0, 60.0, 2.0, 12_000.0).await;

        let resp = server.get("/sites/site-1/alerts").await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["sensor_kind"], "soil_moisture");
        assert_eq!(body[0]["severity"], "critical");
    }

    // -----------------------------------------------------------------------
    // Thresholds
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn thresholds_default_and_update_roundtrip(pool: PgPool) {
        let server = test_server(pool);

        let resp = server.get("/sites/site-1/thresholds").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["soil_moisture"]["turn_on"], 30.0);
        assert_eq!(body["soil_moisture"]["turn_off"], 65.0);

        let update = json!({
            "soil_moisture": { "turn_on": 25.0, "turn_off": 60.0 },
            "temperature": { "turn_off": 24.0, "turn_on_low": 29.0, "turn_on_high": 34.0 },
        });
        server
            .put("/sites/site-1/thresholds")
            .json(&update)
            .await
            .assert_status_ok();

        let body: Value = server.get("/sites/site-1/thresholds").await.json();
        assert_eq!(body["soil_moisture"]["turn_on"], 25.0);
        assert_eq!(body["temperature"]["turn_on_high"], 34.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn invalid_threshold_update_is_rejected_and_ignored(pool: PgPool) {
        let server = test_server(pool);

        let update = json!({
            "soil_moisture": { "turn_on": 70.0, "turn_off": 65.0 },
            "temperature": { "turn_off": 25.0, "turn_on_low": 30.0, "turn_on_high": 35.0 },
        });
        let resp = server.put("/sites/site-1/thresholds").json(&update).await;
        resp.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

        // The visible config is unchanged.
        let body: Value = server.get("/sites/site-1/thresholds").await.json();
        assert_eq!(body["soil_moisture"]["turn_on"], 30.0);
    }

    // -----------------------------------------------------------------------
    // Actuators
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn manual_command_applies_then_noops(pool: PgPool) {
        let server = test_server(pool);

        let body = json!({ "actuator": "water_pump", "level": "on" });
        let resp = server
            .post("/sites/site-1/actuators/manual")
            .json(&body)
            .await;
        resp.assert_status_ok();
        let first: Value = resp.json();
        assert_eq!(first["applied"], true);
        assert_eq!(first["level"], "on");

        // Same state again: no-op, no second history entry.
        let second: Value = server
            .post("/sites/site-1/actuators/manual")
            .json(&body)
            .await
            .json();
        assert_eq!(second["applied"], false);

        let history: Vec<Value> = server
            .get("/sites/site-1/actuators/history")
            .await
            .json();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["source"], "manual");

        let status: Value = server.get("/sites/site-1/actuators").await.json();
        assert_eq!(status["actuators"][0]["actuator"], "water_pump");
        assert_eq!(status["actuators"][0]["level"], "on");
        assert_eq!(status["actuators"][0]["source"], "manual");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn manual_command_with_invalid_level_is_rejected(pool: PgPool) {
        let server = test_server(pool);

        let resp = server
            .post("/sites/site-1/actuators/manual")
            .json(&json!({ "actuator": "water_pump", "level": "high" }))
            .await;
        resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn control_run_applies_pump_decision_idempotently(pool: PgPool) {
        let server = test_server(pool);
        // Soil 20% triggers the pump; 26°C keeps the fan in its hold band.
        submit(&server, "site-1", Utc::now(), 26.0, 60.0, 20.0, 12_000.0).await;

        let resp = server.post("/sites/site-1/actuators/control").await;
        resp.assert_status_ok();
        let body: Value = resp.json();

        let pump = body["actuators"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["actuator"] == "water_pump")
            .unwrap()
            .clone();
        assert_eq!(pump["outcome"], "applied");
        assert_eq!(pump["target"], "on");
        assert!(pump["reason"].as_str().unwrap().starts_with("soil moisture low"));

        let fan = body["actuators"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["actuator"] == "cooling_fan")
            .unwrap()
            .clone();
        assert_eq!(fan["outcome"], "held");

        // Re-running with identical inputs stores no second command.
        let rerun: Value = server
            .post("/sites/site-1/actuators/control")
            .await
            .json();
        let pump = rerun["actuators"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["actuator"] == "water_pump")
            .unwrap()
            .clone();
        assert_eq!(pump["outcome"], "no_op");

        let history: Vec<Value> = server
            .get("/sites/site-1/actuators/history")
            .await
            .json();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["source"], "automatic");
        assert_eq!(history[0]["sensor_values"]["soil_moisture"], 20.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn control_run_sends_fan_high_on_critical_temperature(pool: PgPool) {
        let server = test_server(pool);
        submit(&server, "site-1", Utc::now(), 36.0, 60.0, 50.0, 12_000.0).await;

        let body: Value = server
            .post("/sites/site-1/actuators/control")
            .await
            .json();
        let fan = body["actuators"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["actuator"] == "cooling_fan")
            .unwrap()
            .clone();
        assert_eq!(fan["outcome"], "applied");
        assert_eq!(fan["target"], "high");
        assert!(fan["reason"].as_str().unwrap().starts_with("temperature critical"));
    }

    // -----------------------------------------------------------------------
    // System endpoints
    // -----------------------------------------------------------------------

    #[sqlx::test(migrations = "./migrations")]
    async fn health_returns_ok(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn openapi_spec_is_served(pool: PgPool) {
        let server = test_server(pool);
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Greenhouse Control API");
    }
}
