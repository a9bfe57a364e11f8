use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::{ConnectionRole, ServerEvent};
use crate::AppState;

/// Сообщения клиент -> сервер.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Authenticate {
        role: String,
        #[serde(default)]
        password: Option<String>,
    },
    RequestSeatData,
    ReleaseAllSeats,
    #[serde(rename_all = "camelCase")]
    PrebookSeats {
        #[serde(default)]
        seat_ids: Option<Vec<String>>,
        #[serde(default)]
        count: Option<usize>,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).expect("server event serializes");
    sink.send(Message::Text(payload.into())).await
}

async fn client_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let mut events = state.broadcast.subscribe();
    let mut role = ConnectionRole::Unauthenticated;

    debug!("ws client connected");

    // Бутстрап при (пере)подключении: сразу полный снапшот
    match state.service.seat_statuses().await {
        Ok(seat_statuses) => {
            if send_event(&mut sink, &ServerEvent::SeatUpdate { seat_statuses })
                .await
                .is_err()
            {
                return;
            }
        }
        Err(e) => warn!("bootstrap snapshot failed: {:?}", e),
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(text.as_str(), &mut role, &mut sink, &state)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("ws receive error: {:?}", e);
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(ev) => {
                        if ev.admin_only() && !role.is_admin() {
                            continue;
                        }
                        if send_event(&mut sink, &ev).await.is_err() {
                            break;
                        }
                    }
                    // Отставший клиент пропустил события; следующий полный
                    // снапшот сам выправит его картину.
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("ws client lagged, {} events dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    debug!("ws client disconnected ({})", role.label());
}

async fn handle_client_message(
    text: &str,
    role: &mut ConnectionRole,
    sink: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
) -> Result<(), axum::Error> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return send_event(
                sink,
                &ServerEvent::ErrorSignal {
                    message: format!("malformed message: {}", e),
                },
            )
            .await;
        }
    };

    match message {
        ClientMessage::Authenticate { role: wanted, password } => {
            let (next, event) = apply_authentication(
                *role,
                &wanted,
                password.as_deref(),
                &state.config.admin.password,
            );
            if next.is_admin() && !role.is_admin() {
                info!("ws client authenticated as admin");
            }
            if wanted == "admin" && !next.is_admin() {
                warn!("ws admin authentication failed");
            }
            *role = next;
            send_event(sink, &event).await
        }

        ClientMessage::RequestSeatData => match state.service.seat_statuses().await {
            Ok(seat_statuses) => {
                send_event(sink, &ServerEvent::SeatUpdate { seat_statuses }).await
            }
            Err(e) => {
                warn!("requestSeatData failed: {:?}", e);
                send_event(
                    sink,
                    &ServerEvent::ErrorSignal {
                        message: "failed to compute seat statuses".into(),
                    },
                )
                .await
            }
        },

        ClientMessage::ReleaseAllSeats => {
            if let Err(denied) = authorize_admin_action(*role) {
                return send_event(sink, &denied).await;
            }
            match state.service.release_all_seats().await {
                Ok(released) => {
                    state.publish_seat_snapshot();
                    send_event(sink, &ServerEvent::ReleaseResult { released }).await
                }
                Err(e) => {
                    warn!("releaseAllSeats failed: {:?}", e);
                    send_event(
                        sink,
                        &ServerEvent::ErrorSignal {
                            message: "bulk release failed".into(),
                        },
                    )
                    .await
                }
            }
        }

        ClientMessage::PrebookSeats { seat_ids, count } => {
            if let Err(denied) = authorize_admin_action(*role) {
                return send_event(sink, &denied).await;
            }
            let result = match (seat_ids, count) {
                (Some(ids), _) => state.service.prebook_seats(ids).await,
                (None, Some(n)) => state.service.prebook_count(n).await,
                (None, None) => {
                    return send_event(
                        sink,
                        &ServerEvent::ErrorSignal {
                            message: "prebookSeats requires seatIds or count".into(),
                        },
                    )
                    .await;
                }
            };
            match result {
                Ok(outcome) => {
                    state.publish_seat_snapshot();
                    send_event(sink, &ServerEvent::prebook_result(outcome)).await
                }
                Err(e) => {
                    warn!("prebookSeats failed: {:?}", e);
                    send_event(
                        sink,
                        &ServerEvent::ErrorSignal {
                            message: "prebook failed".into(),
                        },
                    )
                    .await
                }
            }
        }
    }
}

/// Переход ролей при `authenticate`. Неудачная попытка текущую роль
/// не меняет: без секрета нет ни повышения, ни понижения.
fn apply_authentication(
    current: ConnectionRole,
    wanted: &str,
    password: Option<&str>,
    admin_password: &str,
) -> (ConnectionRole, ServerEvent) {
    match wanted {
        "admin" => {
            if password == Some(admin_password) {
                (
                    ConnectionRole::Admin,
                    ServerEvent::AuthResult {
                        ok: true,
                        role: ConnectionRole::Admin.label().to_string(),
                        message: None,
                    },
                )
            } else {
                (
                    current,
                    ServerEvent::AuthResult {
                        ok: false,
                        role: current.label().to_string(),
                        message: Some("invalid admin password".into()),
                    },
                )
            }
        }
        "student" => (
            ConnectionRole::Student,
            ServerEvent::AuthResult {
                ok: true,
                role: ConnectionRole::Student.label().to_string(),
                message: None,
            },
        ),
        other => (
            current,
            ServerEvent::AuthResult {
                ok: false,
                role: current.label().to_string(),
                message: Some(format!("unknown role: {}", other)),
            },
        ),
    }
}

fn authorize_admin_action(role: ConnectionRole) -> Result<(), ServerEvent> {
    if role.is_admin() {
        Ok(())
    } else {
        Err(ServerEvent::ErrorSignal {
            message: "admin authorization required".into(),
        })
    }
}
