//! Minimal HTTP surface exercising §4.7's WS upgrade handler and §6's
//! neuron start/stop control plane (scenario S6): everything that isn't
//! `/ws` or `/svc` falls through to a static file root (§4.9's
//! `StaticHandler`, multiplexing Upgrade vs. static without axum needing to
//! know the difference — the router does that split).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use fabric_core::{stop_channel, tcp_forward, EndpointParams, EventTrigger, FabricConfig, WsHub};

use crate::http_helpers::{code_response, error_response};

struct ServiceState {
    neuron_id: String,
    demo_local: String,
    demo_remote: String,
    params: EndpointParams,
    stop: Mutex<Option<tokio::sync::watch::Sender<bool>>>,
    running: Arc<AtomicBool>,
}

struct AppState {
    hub: Arc<WsHub>,
    run_env: i32,
    static_path: String,
    service: ServiceState,
}

/// Serves `/ws` (upgrade handler), `/svc` (start/stop control plane), and a
/// static file fallback, all under one `FabricConfig` (§6).
pub async fn serve(addr: &str, config: FabricConfig, demo_local: String, demo_remote: String) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        hub: Arc::new(WsHub::init("wsHub")),
        run_env: config.run_env,
        static_path: config.http.static_path.clone(),
        service: ServiceState {
            neuron_id: config.neuron_id.clone(),
            demo_local,
            demo_remote,
            params: config.endpoint,
            stop: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        },
    });

    let app = Router::new()
        .route("/ws", get(ws_route))
        .route("/svc", get(svc_route))
        .fallback(static_handler)
        .with_state(state);

    tracing::info!(%addr, "fabric_demo http surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn ws_route(ws: WebSocketUpgrade, ConnectInfo(peer): ConnectInfo<SocketAddr>, State(state): State<Arc<AppState>>) -> Response {
    let hub = state.hub.clone();
    let run_env = state.run_env;
    ws.on_upgrade(move |socket| async move {
        let trigger = EventTrigger::new();
        fabric_core::ws_upgrade_handler(socket, peer, hub, trigger, run_env).await;
    })
}

/// Everything that isn't `/ws` or `/svc` falls through here and is served
/// out of `static_path` (§4.9).
async fn static_handler(uri: Uri, State(state): State<Arc<AppState>>) -> Response {
    let trimmed = uri.path().trim_start_matches('/');
    let relative = if trimmed.is_empty() { "index.html" } else { trimmed };
    let full = format!("{}/{}", state.static_path.trim_end_matches('/'), relative);
    match tokio::fs::read(&full).await {
        Ok(bytes) => bytes.into_response(),
        Err(_) => error_response(StatusCode::NOT_FOUND, &format!("not found: {relative}")),
    }
}

fn redirect_302(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// The `?{neuronId}-start` / `?{neuronId}-stop` control plane (§6, S6):
/// starting an already-running service, or stopping an already-stopped one,
/// answers with a 302 back to `/svc` rather than repeating the JSON code.
async fn svc_route(Query(params): Query<HashMap<String, String>>, State(state): State<Arc<AppState>>) -> Response {
    let svc = &state.service;
    let start_key = format!("{}-start", svc.neuron_id);
    let stop_key = format!("{}-stop", svc.neuron_id);

    if params.contains_key(&start_key) {
        let already_running = svc.running.swap(true, Ordering::SeqCst);
        if already_running {
            return redirect_302("/svc");
        }
        let (stop_tx, stop_rx) = stop_channel();
        *svc.stop.lock().expect("service lock poisoned") = Some(stop_tx);
        let local = svc.demo_local.clone();
        let remote = svc.demo_remote.clone();
        let params_cfg = svc.params;
        let running = svc.running.clone();
        tokio::spawn(async move {
            let _ = tcp_forward(&local, &remote, stop_rx, "svc", params_cfg).await;
            running.store(false, Ordering::SeqCst);
        });
        return code_response(101, "started");
    }

    if params.contains_key(&stop_key) {
        let sender = svc.stop.lock().expect("service lock poisoned").take();
        return match sender {
            Some(tx) => {
                let _ = tx.send(true);
                svc.running.store(false, Ordering::SeqCst);
                code_response(102, "stopped")
            }
            None => redirect_302("/svc"),
        };
    }

    if svc.running.load(Ordering::SeqCst) {
        code_response(101, "running")
    } else {
        code_response(201, "not started")
    }
}
