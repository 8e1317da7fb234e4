//! WebSocket surface, spec.md §6/§4.8: `GET /ws?tenant=...` upgrades to the
//! Event Fan-out subscriber protocol. `tenant` is taken directly from the
//! query string, standing in for the out-of-scope JWT/bearer-token step.

use crate::services::fanout::Subscription;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use m360_common::{SampleEvent, SensorBatchItem, WsClientMessage, WsServerMessage};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub tenant: String,
}

pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(state, q.tenant, socket))
}

async fn run_session(state: Arc<AppState>, tenant: String, socket: WebSocket) {
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<WsServerMessage>(256);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    state.fanout.attach(conn_id, tenant.clone(), out_tx.clone());
    let _ = out_tx.send(WsServerMessage::Welcome).await;
    send_ready_and_batch(&state, &tenant, conn_id, &out_tx, Subscription::Empty).await;

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else {
            if matches!(msg, Message::Close(_)) {
                break;
            }
            continue;
        };

        let Ok(client_msg) = serde_json::from_str::<WsClientMessage>(&text) else {
            let _ = out_tx
                .send(WsServerMessage::Error { message: "unrecognized message".to_string() })
                .await;
            continue;
        };

        match client_msg {
            WsClientMessage::Ping => {
                let _ = out_tx.send(WsServerMessage::Pong).await;
            }
            WsClientMessage::SubscribeSensors { sensor_ids } => {
                state.fanout.subscribe(conn_id, Subscription::Sensors(sensor_ids.clone()));
                send_ready_and_batch(&state, &tenant, conn_id, &out_tx, Subscription::Sensors(sensor_ids)).await;
            }
            WsClientMessage::SubscribeAll => {
                state.fanout.subscribe(conn_id, Subscription::All);
                send_ready_and_batch(&state, &tenant, conn_id, &out_tx, Subscription::All).await;
            }
            WsClientMessage::SyncRequest { resource: _ } => {
                send_ready_and_batch(&state, &tenant, conn_id, &out_tx, Subscription::All).await;
            }
        }
    }

    state.fanout.detach(conn_id);
    writer.abort();
}

/// Re-issues `ready` plus the initial batch (spec.md §4.9): every tenant
/// sensor whose id matches `subscription`, each with its most recent sample
/// or a pending placeholder when none has been recorded yet.
async fn send_ready_and_batch(
    state: &AppState,
    tenant: &str,
    _conn_id: u64,
    out_tx: &mpsc::Sender<WsServerMessage>,
    subscription: Subscription,
) {
    let _ = out_tx.send(WsServerMessage::Ready).await;

    let Ok(sensors) = state.db.list_sensors(tenant).await else { return };
    let mut items = Vec::with_capacity(sensors.len());

    for sensor in sensors {
        let included = match &subscription {
            Subscription::All | Subscription::Empty => true,
            Subscription::Sensors(ids) => ids.contains(&sensor.id),
        };
        if !included {
            continue;
        }

        let Some(kind) = sensor.kind() else { continue };
        let sample = match kind {
            m360_common::SensorKind::Ping => match state.db.latest_ping_sample(sensor.id).await {
                Ok(Some(s)) => SampleEvent::Ping(m360_common::PingSamplePayload::new(s.sensor_id, s.status(), s.latency_ms)),
                _ => SampleEvent::pending(sensor.id, kind),
            },
            m360_common::SensorKind::Ethernet => match state.db.latest_ethernet_sample(sensor.id).await {
                Ok(Some(s)) => SampleEvent::Ethernet(m360_common::EthernetSamplePayload::new(
                    s.sensor_id,
                    s.status(),
                    s.speed,
                    s.rx_bitrate,
                    s.tx_bitrate,
                )),
                _ => SampleEvent::pending(sensor.id, kind),
            },
        };

        items.push(SensorBatchItem {
            sensor_id: sensor.id,
            name: sensor.name,
            kind,
            sample,
        });
    }

    let _ = out_tx
        .send(WsServerMessage::SensorBatch { items, ts: chrono::Utc::now() })
        .await;
}
