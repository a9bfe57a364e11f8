pub mod ws;

use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::models::Booking;
use crate::services::booking::PrebookOutcome;

const CHANNEL_CAPACITY: usize = 256;

/// Роль подключения. После рукопожатия клиент не аутентифицирован и
/// получает права студента; админом становится только по общему секрету.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Unauthenticated,
    Student,
    Admin,
}

impl ConnectionRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, ConnectionRole::Admin)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionRole::Unauthenticated => "unauthenticated",
            ConnectionRole::Student => "student",
            ConnectionRole::Admin => "admin",
        }
    }
}

/// События сервер -> клиент. seatUpdate несёт полный снапшот всех 504
/// мест, не дельту: каждый push самовосстанавливает картину клиента,
/// сколько бы обновлений тот ни пропустил.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    SeatUpdate {
        seat_statuses: BTreeMap<String, String>,
    },
    #[serde(rename = "booking:created")]
    BookingCreated { booking: Booking },
    #[serde(rename = "booking:updated")]
    BookingUpdated { booking: Booking },
    #[serde(rename = "booking:deleted", rename_all = "camelCase")]
    BookingDeleted { booking_id: String },
    #[serde(rename_all = "camelCase")]
    AuthResult {
        ok: bool,
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "error")]
    ErrorSignal { message: String },
    #[serde(rename_all = "camelCase")]
    PrebookResult { booked: Vec<String>, skipped: Vec<String> },
    #[serde(rename_all = "camelCase")]
    ReleaseResult { released: usize },
}

impl ServerEvent {
    pub fn prebook_result(outcome: PrebookOutcome) -> Self {
        ServerEvent::PrebookResult {
            booked: outcome.booked,
            skipped: outcome.skipped,
        }
    }

    /// booking:* уходят только в админскую группу; снапшоты мест - всем.
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            ServerEvent::BookingCreated { .. }
                | ServerEvent::BookingUpdated { .. }
                | ServerEvent::BookingDeleted { .. }
        )
    }
}

/// Транслятор проекций. Состояния мест не хранит - это реле поверх
/// tokio broadcast-канала, подписку держит каждая ws-сессия.
#[derive(Clone)]
pub struct SeatBroadcast {
    sender: broadcast::Sender<ServerEvent>,
}

impl SeatBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        SeatBroadcast { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Отправка без получателей - не ошибка: клиенты на поллинге
    /// доберут состояние через /seat-statuses.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for SeatBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_events_are_admin_only() {
        let ev = ServerEvent::BookingDeleted {
            booking_id: "b1".into(),
        };
        assert!(ev.admin_only());
        let snapshot = ServerEvent::SeatUpdate {
            seat_statuses: BTreeMap::new(),
        };
        assert!(!snapshot.admin_only());
    }

    #[test]
    fn events_use_wire_names() {
        let ev = ServerEvent::BookingDeleted {
            booking_id: "b1".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "booking:deleted");
        assert_eq!(json["bookingId"], "b1");

        let snapshot = ServerEvent::SeatUpdate {
            seat_statuses: BTreeMap::new(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["type"], "seatUpdate");
    }

    #[test]
    fn subscribers_receive_sent_events() {
        let hub = SeatBroadcast::new();
        let mut rx = hub.subscribe();
        hub.send(ServerEvent::ReleaseResult { released: 3 });
        match rx.try_recv().unwrap() {
            ServerEvent::ReleaseResult { released } => assert_eq!(released, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
