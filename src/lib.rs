pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod services;
pub mod store;

use std::sync::Arc;

use realtime::{SeatBroadcast, ServerEvent};
use services::{BookingService, TicketingClient};

// Shared state для всего приложения
pub struct AppState {
    pub config: config::Config,
    pub service: BookingService,
    pub broadcast: SeatBroadcast,
    pub ticketing: TicketingClient,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let store = store::connect(&config.store).await?;
        let service = BookingService::new(store);
        let broadcast = SeatBroadcast::new();
        let ticketing = TicketingClient::from_config(&config.ticketing);

        Ok(Arc::new(Self {
            config,
            service,
            broadcast,
            ticketing,
        }))
    }

    /// После каждой записи: пересчитать полную проекцию мест и разослать
    /// всем подключённым клиентам. Fire-and-forget - HTTP-ответ не ждёт
    /// доставки push-а, только локальной записи.
    pub fn publish_seat_snapshot(self: &Arc<Self>) {
        let state = self.clone();
        tokio::spawn(async move {
            match state.service.seat_statuses().await {
                Ok(seat_statuses) => {
                    state.broadcast.send(ServerEvent::SeatUpdate { seat_statuses });
                }
                Err(e) => {
                    tracing::warn!("seat snapshot recompute for broadcast failed: {:?}", e);
                }
            }
        });
    }
}
