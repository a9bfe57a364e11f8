use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, info, warn};

use crate::config::TicketingConfig;
use crate::models::Booking;

/// Итог выпуска и доставки билета. Сбой доставки никогда не откатывает
/// подтверждение брони - оплата первична, билет best-effort.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketOutcome {
    pub ticket_id: Option<String>,
    pub artifact_path: Option<String>,
    pub delivery_status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Клиент внешнего коллаборатора: рендер билета в файл-артефакт и
/// доставка на телефон пользователя через HTTP-провайдера с
/// ограниченным экспоненциальным повтором.
#[derive(Clone)]
pub struct TicketingClient {
    http: reqwest::Client,
    config: TicketingConfig,
}

#[derive(Debug, Serialize)]
struct DeliveryRequest<'a> {
    phone: &'a str,
    message: String,
    #[serde(rename = "ticketId")]
    ticket_id: &'a str,
}

impl TicketingClient {
    pub fn from_config(config: &TicketingConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client must build");
        TicketingClient {
            http,
            config: config.clone(),
        }
    }

    pub async fn issue_and_deliver(&self, booking: &Booking) -> TicketOutcome {
        let ticket_id = format!(
            "TKT-{}",
            booking.id.chars().take(8).collect::<String>().to_uppercase()
        );

        let artifact_path = match self.render_artifact(&ticket_id, booking).await {
            Ok(path) => path,
            Err(e) => {
                error!("Ticket render failed for booking {}: {:?}", booking.id, e);
                return TicketOutcome {
                    ticket_id: Some(ticket_id),
                    artifact_path: None,
                    delivery_status: DeliveryStatus::Failed,
                    error: Some(format!("render failed: {}", e)),
                };
            }
        };

        let total_cap = Duration::from_secs(self.config.total_timeout_secs);
        let delivery = match timeout(total_cap, self.deliver(&ticket_id, booking)).await {
            Ok(Ok(())) => {
                info!("Ticket {} delivered to {}", ticket_id, booking.user.phone);
                (DeliveryStatus::Delivered, None)
            }
            Ok(Err(e)) => {
                warn!("Ticket {} delivery failed: {}", ticket_id, e);
                (DeliveryStatus::Failed, Some(e))
            }
            Err(_) => {
                warn!(
                    "Ticket {} delivery timed out after {:?}",
                    ticket_id, total_cap
                );
                (DeliveryStatus::Failed, Some("delivery timed out".to_string()))
            }
        };

        TicketOutcome {
            ticket_id: Some(ticket_id),
            artifact_path: Some(artifact_path.to_string_lossy().into_owned()),
            delivery_status: delivery.0,
            error: delivery.1,
        }
    }

    async fn render_artifact(
        &self,
        ticket_id: &str,
        booking: &Booking,
    ) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.config.artifact_dir).await?;
        let path = PathBuf::from(&self.config.artifact_dir).join(format!("{}.json", ticket_id));

        let artifact = json!({
            "ticketId": ticket_id,
            "bookingId": booking.id,
            "seatId": booking.seat_id,
            "guest": format!("{} {}", booking.user.first_name, booking.user.last_name),
            "issuedAt": chrono::Utc::now().to_rfc3339(),
        });
        tokio::fs::write(&path, serde_json::to_vec_pretty(&artifact)?).await?;
        Ok(path)
    }

    async fn deliver(&self, ticket_id: &str, booking: &Booking) -> Result<(), String> {
        let payload = DeliveryRequest {
            phone: &booking.user.phone,
            message: format!(
                "Ваш билет {}: стол {}, место {}",
                ticket_id,
                booking.seat_id.table(),
                booking.seat_id.seat()
            ),
            ticket_id,
        };

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            let mut request = self.http.post(&self.config.provider_url).json(&payload);
            if !self.config.api_token.is_empty() {
                request = request.bearer_auth(&self.config.api_token);
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    last_error = format!("provider returned {}", resp.status());
                }
                Err(e) => {
                    last_error = format!("provider request failed: {}", e);
                }
            }

            warn!(
                "Ticket {} delivery attempt {}/{} failed: {}",
                ticket_id, attempt, self.config.max_attempts, last_error
            );
            if attempt < self.config.max_attempts {
                let backoff = self.config.base_delay_ms * 2u64.pow(attempt - 1);
                sleep(Duration::from_millis(backoff)).await;
            }
        }
        Err(last_error)
    }
}
