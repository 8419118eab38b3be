use axum::{extract::State as AxumState, routing::get, Json, Router};
use std::sync::Arc;

use crate::{MetricsSnapshot, Simulator};

mod ws;

pub struct Api {
    simulator: Arc<Simulator>,
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws::game_ws))
            .route("/healthz", get(healthz))
            .route("/metrics", get(metrics))
            .with_state(self.simulator.clone())
    }
}

async fn healthz() -> &'static str {
    "OK"
}

async fn metrics(AxumState(simulator): AxumState<Arc<Simulator>>) -> Json<MetricsSnapshot> {
    Json(simulator.metrics())
}
