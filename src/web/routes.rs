//! REST handlers
//!
//! Every response is wrapped in the [`ApiResponse`] envelope. The rig
//! trait is synchronous, so each handler runs it on the blocking pool.

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use log::{info, warn};
use serde::Serialize;

use crate::domain::SensorKind;
use crate::ports::{RigError, RigPort};
use crate::protocol::ApiResponse;
use crate::web::AppState;

/// Register every REST route. `/ws` is added separately by the binary.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/scan", web::post().to(scan))
        .route("/api/sensors", web::get().to(sensors))
        .route("/api/sensors/{kind}", web::get().to(sensor_by_kind))
        .route("/api/sensors/{kind}/reading", web::get().to(reading_by_kind))
        .route("/api/reset", web::post().to(reset))
        .route("/api/health", web::get().to(health));
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    uptime_s: u64,
    connected_clients: usize,
    sensor_count: usize,
}

fn rig_error_response(err: RigError) -> HttpResponse {
    let body = ApiResponse::<()>::err(&err);
    match err {
        RigError::NoSuchSensor(_) => HttpResponse::NotFound().json(body),
        RigError::Sensor(_) => HttpResponse::ServiceUnavailable().json(body),
        RigError::Scan(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Runs a blocking rig call on the thread pool, mapping pool failures
/// onto the envelope.
async fn on_rig<T, F>(rig: Arc<dyn RigPort>, op: F) -> Result<T, HttpResponse>
where
    T: Send + 'static,
    F: FnOnce(&dyn RigPort) -> T + Send + 'static,
{
    web::block(move || op(rig.as_ref())).await.map_err(|e| {
        warn!("blocking rig call failed: {e}");
        HttpResponse::InternalServerError().json(ApiResponse::<()>::err("internal error"))
    })
}

async fn scan(state: web::Data<AppState>) -> HttpResponse {
    let result = match on_rig(state.rig.clone(), |rig| rig.scan()).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match result {
        Ok(summary) => {
            info!(
                "scan: {} sensor(s) on {} bus(es), {} mux(es)",
                summary.sensors.len(),
                summary.buses_scanned.len(),
                summary.muxes_found.len()
            );
            HttpResponse::Ok().json(ApiResponse::ok(summary))
        }
        Err(e) => rig_error_response(e),
    }
}

async fn sensors(state: web::Data<AppState>) -> HttpResponse {
    match on_rig(state.rig.clone(), |rig| rig.sensors()).await {
        Ok(list) => HttpResponse::Ok().json(ApiResponse::ok(list)),
        Err(resp) => resp,
    }
}

fn parse_kind(raw: &str) -> Result<SensorKind, HttpResponse> {
    raw.parse().map_err(|e| {
        HttpResponse::BadRequest().json(ApiResponse::<()>::err(format!("{e}")))
    })
}

async fn sensor_by_kind(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let kind = match parse_kind(&path) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match on_rig(state.rig.clone(), |rig| rig.sensors()).await {
        Ok(list) => {
            let matching: Vec<_> = list.into_iter().filter(|d| d.kind == kind).collect();
            if matching.is_empty() {
                rig_error_response(RigError::NoSuchSensor(kind))
            } else {
                HttpResponse::Ok().json(ApiResponse::ok(matching))
            }
        }
        Err(resp) => resp,
    }
}

async fn reading_by_kind(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let kind = match parse_kind(&path) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match on_rig(state.rig.clone(), move |rig| rig.read_kind(kind)).await {
        Ok(Ok(snapshot)) => HttpResponse::Ok().json(ApiResponse::ok(snapshot)),
        Ok(Err(e)) => rig_error_response(e),
        Err(resp) => resp,
    }
}

async fn reset(state: web::Data<AppState>) -> HttpResponse {
    match on_rig(state.rig.clone(), |rig| rig.reset()).await {
        Ok(()) => {
            info!("rig reset");
            HttpResponse::Ok().json(ApiResponse::ok("reset"))
        }
        Err(resp) => resp,
    }
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let sensor_count = match on_rig(state.rig.clone(), |rig| rig.sensors()).await {
        Ok(list) => list.len(),
        Err(resp) => return resp,
    };
    HttpResponse::Ok().json(ApiResponse::ok(Health {
        status: "ok",
        uptime_s: state.uptime_s(),
        connected_clients: state.connected_clients(),
        sensor_count,
    }))
}
