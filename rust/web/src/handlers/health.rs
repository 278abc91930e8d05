use crate::hub::Hub;
use serde::Serialize;
use warp::reply::Json;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    active_sessions: usize,
    waiting: usize,
}

pub fn health(hub: &Hub) -> Json {
    warp::reply::json(&HealthBody {
        status: "ok",
        active_sessions: hub.active_sessions().len(),
        waiting: hub.waiting_count(),
    })
}
