use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

use crate::live_status::TripSnapshot;
use crate::runtime::SharedSnapshot;

const PUSH_INTERVAL: Duration = Duration::from_millis(500);

pub fn router(snapshot: SharedSnapshot) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .with_state(snapshot)
}

pub async fn start_dashboard(snapshot: SharedSnapshot, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    log::info!("[DASHBOARD] Serving trip status at http://{}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding dashboard to {}", addr))?;
    axum::serve(listener, router(snapshot))
        .await
        .context("dashboard server failed")?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(
        "<!doctype html><title>Ride Range</title><pre id=s>connecting...</pre>\
         <script>const ws=new WebSocket(`ws://${location.host}/ws`);\
         ws.onmessage=e=>{document.getElementById('s').textContent=\
         JSON.stringify(JSON.parse(e.data),null,2)};</script>",
    )
}

async fn status_handler(State(snapshot): State<SharedSnapshot>) -> Json<TripSnapshot> {
    Json(snapshot.read().await.clone())
}

async fn ws_handler(ws: WebSocketUpgrade, State(snapshot): State<SharedSnapshot>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, snapshot))
}

async fn handle_socket(mut socket: WebSocket, snapshot: SharedSnapshot) {
    loop {
        let current = snapshot.read().await.clone();
        let json = match serde_json::to_string(&current) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("[DASHBOARD] snapshot encode failed: {}", e);
                break;
            }
        };
        if socket.send(Message::Text(json)).await.is_err() {
            // Client disconnected
            break;
        }

        sleep(PUSH_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_status_endpoint_serves_snapshot() {
        let mut initial = TripSnapshot::new();
        initial.distance_km = 42.0;
        let shared: SharedSnapshot = Arc::new(RwLock::new(initial));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(shared.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let body: TripSnapshot = reqwest::get(format!("http://{}/status", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.distance_km, 42.0);

        shared.write().await.distance_km = 43.5;
        let body: TripSnapshot = reqwest::get(format!("http://{}/status", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.distance_km, 43.5);
    }
}
