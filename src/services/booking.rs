use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{DomainError, FieldViolation, StoreError};
use crate::models::{Booking, BookingStatus, BookingUpdate, SeatId, UserInfo};
use crate::store::BookingStore;

/// Сервисный слой броней: валидация входа, инвариант "одно место -
/// одна активная бронь", проекция статусов мест. Транспорта здесь нет -
/// рассылку после записи делает вызывающий HTTP/WS-слой.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
}

#[derive(Debug, Clone, Default)]
pub struct NewBooking {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub seat_id: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBookingInput {
    pub status: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// Запись, пришедшая из клиентского sync-а (офлайн-сессия, миграция).
#[derive(Debug, Clone, Default)]
pub struct SyncRecord {
    pub seat_id: String,
    pub status: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemError {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub synced_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<SyncItemError>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebookOutcome {
    pub booked: Vec<String>,
    pub skipped: Vec<String>,
}

fn valid_phone(phone: &str) -> bool {
    phone.strip_prefix('+').is_some_and(|digits| {
        (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
    })
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn infra(op: &str, context: &str, e: StoreError) -> DomainError {
    match e {
        StoreError::SeatConflict { seat_id } => DomainError::SeatUnavailable { seat_id },
        StoreError::Backend(e) => {
            error!("store failure in {} ({}): {:?}", op, context, e);
            DomainError::Infrastructure(e)
        }
    }
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        BookingService { store }
    }

    pub async fn create_booking(&self, input: NewBooking) -> Result<Booking, DomainError> {
        let mut violations = Vec::new();

        if input.first_name.trim().is_empty() {
            violations.push(FieldViolation {
                field: "firstName",
                message: "first name is required".into(),
            });
        }
        if input.last_name.trim().is_empty() {
            violations.push(FieldViolation {
                field: "lastName",
                message: "last name is required".into(),
            });
        }
        if !valid_phone(&input.phone) {
            violations.push(FieldViolation {
                field: "phone",
                message: "phone must be + followed by 10-15 digits".into(),
            });
        }
        if let Some(ref email) = input.email {
            if !valid_email(email) {
                violations.push(FieldViolation {
                    field: "email",
                    message: "email address is malformed".into(),
                });
            }
        }
        let seat_id = match input.seat_id.parse::<SeatId>() {
            Ok(seat) => Some(seat),
            Err(e) => {
                violations.push(FieldViolation {
                    field: "seatId",
                    message: e.to_string(),
                });
                None
            }
        };

        if !violations.is_empty() {
            return Err(DomainError::Validation(violations));
        }
        let seat_id = seat_id.expect("seat id validated above");

        let available = self
            .store
            .is_seat_available(seat_id)
            .await
            .map_err(|e| infra("create_booking", &seat_id.to_string(), e))?;
        if !available {
            return Err(DomainError::SeatUnavailable {
                seat_id: seat_id.to_string(),
            });
        }

        let mut metadata = input.metadata;
        metadata
            .entry("source".to_string())
            .or_insert_with(|| Value::from("web"));

        let booking = Booking::new(
            seat_id,
            UserInfo {
                first_name: input.first_name.trim().to_string(),
                last_name: input.last_name.trim().to_string(),
                phone: input.phone,
                email: input.email,
            },
            metadata,
        );

        // Проигрыш гонки в store выглядит для клиента так же, как
        // занятое место на предпроверке; автоповтора быть не должно.
        let created = self
            .store
            .create(booking)
            .await
            .map_err(|e| infra("create_booking", &seat_id.to_string(), e))?;

        info!("Booking {} created for seat {}", created.id, created.seat_id);
        Ok(created)
    }

    pub async fn get_booking(&self, id: &str) -> Result<Booking, DomainError> {
        self.store
            .get(id)
            .await
            .map_err(|e| infra("get_booking", id, e))?
            .ok_or_else(|| DomainError::NotFound { id: id.to_string() })
    }

    pub async fn list_bookings(
        &self,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, DomainError> {
        self.store
            .list(status)
            .await
            .map_err(|e| infra("list_bookings", "all", e))
    }

    pub async fn confirm_booking(
        &self,
        id: &str,
        confirmed_by: &str,
    ) -> Result<Booking, DomainError> {
        let mut metadata = Map::new();
        metadata.insert("confirmedAt".into(), Value::from(Utc::now().to_rfc3339()));
        metadata.insert("confirmedBy".into(), Value::from(confirmed_by));

        let updated = self
            .store
            .update(
                id,
                &BookingUpdate {
                    status: Some(BookingStatus::Confirmed),
                    metadata: Some(metadata),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| infra("confirm_booking", id, e))?
            .ok_or_else(|| DomainError::NotFound { id: id.to_string() })?;

        info!("Booking {} confirmed by {}", id, confirmed_by);
        Ok(updated)
    }

    pub async fn cancel_booking(&self, id: &str, reason: &str) -> Result<Booking, DomainError> {
        let mut metadata = Map::new();
        metadata.insert("cancelledAt".into(), Value::from(Utc::now().to_rfc3339()));
        metadata.insert("cancelReason".into(), Value::from(reason));

        let updated = self
            .store
            .update(
                id,
                &BookingUpdate {
                    status: Some(BookingStatus::Cancelled),
                    metadata: Some(metadata),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| infra("cancel_booking", id, e))?
            .ok_or_else(|| DomainError::NotFound { id: id.to_string() })?;

        info!("Booking {} cancelled: {}", id, reason);
        Ok(updated)
    }

    pub async fn update_booking(
        &self,
        id: &str,
        input: UpdateBookingInput,
    ) -> Result<Booking, DomainError> {
        let mut violations = Vec::new();

        let status = match input.status.as_deref() {
            Some(raw) => match BookingStatus::normalize(raw) {
                Ok(s) => Some(s),
                Err(e) => {
                    violations.push(FieldViolation {
                        field: "status",
                        message: e.to_string(),
                    });
                    None
                }
            },
            None => None,
        };
        if let Some(ref phone) = input.phone {
            if !valid_phone(phone) {
                violations.push(FieldViolation {
                    field: "phone",
                    message: "phone must be + followed by 10-15 digits".into(),
                });
            }
        }
        if let Some(ref email) = input.email {
            if !valid_email(email) {
                violations.push(FieldViolation {
                    field: "email",
                    message: "email address is malformed".into(),
                });
            }
        }
        if !violations.is_empty() {
            return Err(DomainError::Validation(violations));
        }

        self.store
            .update(
                id,
                &BookingUpdate {
                    status,
                    first_name: input.first_name,
                    last_name: input.last_name,
                    phone: input.phone,
                    email: input.email,
                    metadata: input.metadata,
                },
            )
            .await
            .map_err(|e| infra("update_booking", id, e))?
            .ok_or_else(|| DomainError::NotFound { id: id.to_string() })
    }

    pub async fn delete_booking(&self, id: &str) -> Result<Booking, DomainError> {
        let deleted = self
            .store
            .delete(id)
            .await
            .map_err(|e| infra("delete_booking", id, e))?
            .ok_or_else(|| DomainError::NotFound { id: id.to_string() })?;

        info!("Booking {} deleted, seat {} released", id, deleted.seat_id);
        Ok(deleted)
    }

    /// Полная проекция статусов: все 504 места, свёртка по активным
    /// броням. Не кешируется - пересчитывается на каждый вызов.
    pub async fn seat_statuses(&self) -> Result<BTreeMap<String, String>, DomainError> {
        let mut statuses: BTreeMap<String, String> = SeatId::all()
            .map(|seat| (seat.to_string(), "available".to_string()))
            .collect();

        let bookings = self
            .store
            .list(None)
            .await
            .map_err(|e| infra("seat_statuses", "all", e))?;

        for booking in bookings.iter().filter(|b| b.status.is_active()) {
            statuses.insert(
                booking.seat_id.to_string(),
                booking.display_status().to_string(),
            );
        }
        Ok(statuses)
    }

    /// Идемпотентный bulk-импорт клиентских броней. Существующий id
    /// пропускается; новые записи идут напрямую в store без предпроверки
    /// доступности (путь выверки, а не свежая бронь), но атомарный
    /// create всё равно отводит конфликтующие претензии на место.
    pub async fn sync_local_bookings(
        &self,
        batch: HashMap<String, SyncRecord>,
    ) -> Result<SyncOutcome, DomainError> {
        let mut outcome = SyncOutcome::default();

        for (id, record) in batch {
            let exists = self
                .store
                .get(&id)
                .await
                .map_err(|e| infra("sync_local_bookings", &id, e))?
                .is_some();
            if exists {
                outcome.skipped_count += 1;
                continue;
            }

            let seat_id = match record.seat_id.parse::<SeatId>() {
                Ok(seat) => seat,
                Err(e) => {
                    outcome.errors.push(SyncItemError {
                        id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let status = match record.status.as_deref() {
                Some(raw) => match BookingStatus::normalize(raw) {
                    Ok(s) => s,
                    Err(e) => {
                        outcome.errors.push(SyncItemError {
                            id,
                            error: e.to_string(),
                        });
                        continue;
                    }
                },
                None => BookingStatus::Pending,
            };

            let mut metadata = record.metadata.unwrap_or_default();
            metadata
                .entry("source".to_string())
                .or_insert_with(|| Value::from("migration"));

            let created_at = record.created_at.unwrap_or_else(Utc::now);
            let booking = Booking {
                id: id.clone(),
                seat_id,
                user: UserInfo {
                    first_name: record.first_name.unwrap_or_default(),
                    last_name: record.last_name.unwrap_or_default(),
                    phone: record.phone.unwrap_or_default(),
                    email: record.email,
                },
                status,
                metadata,
                created_at,
                updated_at: Utc::now(),
            };

            match self.store.create(booking).await {
                Ok(_) => outcome.synced_count += 1,
                Err(StoreError::SeatConflict { seat_id }) => {
                    warn!("sync: booking {} lost seat {} to an existing claim", id, seat_id);
                    outcome.errors.push(SyncItemError {
                        id,
                        error: format!("seat {} already has an active booking", seat_id),
                    });
                }
                Err(e) => return Err(infra("sync_local_bookings", &id, e)),
            }
        }

        info!(
            "Sync finished: {} synced, {} skipped, {} errors",
            outcome.synced_count,
            outcome.skipped_count,
            outcome.errors.len()
        );
        Ok(outcome)
    }

    /// Админская преброня: занимает перечисленные места служебными
    /// pending-бронями; занятые места попадают в skipped.
    pub async fn prebook_seats(&self, seat_ids: Vec<String>) -> Result<PrebookOutcome, DomainError> {
        let mut outcome = PrebookOutcome::default();

        for raw in seat_ids {
            let seat_id = match raw.parse::<SeatId>() {
                Ok(seat) => seat,
                Err(_) => {
                    outcome.skipped.push(raw);
                    continue;
                }
            };

            let mut metadata = Map::new();
            metadata.insert("source".into(), Value::from("prebook"));
            let booking = Booking::new(
                seat_id,
                UserInfo {
                    first_name: "Prebook".into(),
                    last_name: "Admin".into(),
                    phone: "+000000000000".into(),
                    email: None,
                },
                metadata,
            );

            match self.store.create(booking).await {
                Ok(b) => outcome.booked.push(b.seat_id.to_string()),
                Err(StoreError::SeatConflict { seat_id }) => outcome.skipped.push(seat_id),
                Err(e) => return Err(infra("prebook_seats", &seat_id.to_string(), e)),
            }
        }
        Ok(outcome)
    }

    /// Преброня первых N свободных мест в порядке обхода зала.
    pub async fn prebook_count(&self, count: usize) -> Result<PrebookOutcome, DomainError> {
        let statuses = self.seat_statuses().await?;
        let free: Vec<String> = SeatId::all()
            .map(|seat| seat.to_string())
            .filter(|id| statuses.get(id).map(String::as_str) == Some("available"))
            .take(count)
            .collect();
        self.prebook_seats(free).await
    }

    /// Массовый сброс: отменяет все активные брони. Возвращает число
    /// освобождённых мест.
    pub async fn release_all_seats(&self) -> Result<usize, DomainError> {
        let bookings = self
            .store
            .list(None)
            .await
            .map_err(|e| infra("release_all_seats", "all", e))?;

        let mut released = 0usize;
        for booking in bookings.into_iter().filter(|b| b.status.is_active()) {
            let mut metadata = Map::new();
            metadata.insert("cancelledAt".into(), Value::from(Utc::now().to_rfc3339()));
            metadata.insert("cancelReason".into(), Value::from("bulk release"));
            self.store
                .update(
                    &booking.id,
                    &BookingUpdate {
                        status: Some(BookingStatus::Cancelled),
                        metadata: Some(metadata),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| infra("release_all_seats", &booking.id, e))?;
            released += 1;
        }

        warn!("Bulk release: {} active bookings cancelled", released);
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TOTAL_SEATS;
    use crate::store::json_file::JsonFileStore;
    use futures::future::join_all;

    async fn service() -> BookingService {
        let path =
            std::env::temp_dir().join(format!("stolovka-svc-{}.json", uuid::Uuid::new_v4()));
        BookingService::new(Arc::new(JsonFileStore::new(path).await.unwrap()))
    }

    fn input_for(seat: &str) -> NewBooking {
        NewBooking {
            first_name: "Ivan".into(),
            last_name: "Petrov".into(),
            phone: "+996555123456".into(),
            email: None,
            seat_id: seat.into(),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn validation_collects_every_violation() {
        let svc = service().await;
        let err = svc
            .create_booking(NewBooking {
                first_name: "".into(),
                last_name: "Petrov".into(),
                phone: "123".into(),
                email: Some("not-an-email".into()),
                seat_id: "40-1".into(),
                metadata: Map::new(),
            })
            .await
            .unwrap_err();

        let DomainError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        let named: Vec<&str> = fields.iter().map(|f| f.field).collect();
        assert!(named.contains(&"firstName"));
        assert!(named.contains(&"phone"));
        assert!(named.contains(&"email"));
        assert!(named.contains(&"seatId"));
        assert!(!named.contains(&"lastName"));
    }

    #[tokio::test]
    async fn second_booking_for_same_seat_is_rejected() {
        let svc = service().await;
        svc.create_booking(input_for("12-7")).await.unwrap();

        let err = svc.create_booking(input_for("12-7")).await.unwrap_err();
        assert!(matches!(err, DomainError::SeatUnavailable { .. }));
    }

    #[tokio::test]
    async fn concurrent_creates_have_exactly_one_winner() {
        let svc = service().await;
        let attempts = 16;

        let results = join_all(
            (0..attempts).map(|_| {
                let svc = svc.clone();
                async move { svc.create_booking(input_for("7-7")).await }
            }),
        )
        .await;

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(DomainError::SeatUnavailable { .. })))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, attempts - 1);
    }

    #[tokio::test]
    async fn projection_covers_the_whole_universe() {
        let svc = service().await;
        svc.create_booking(input_for("12-7")).await.unwrap();
        let confirmed = svc.create_booking(input_for("1-1")).await.unwrap();
        svc.confirm_booking(&confirmed.id, "admin").await.unwrap();
        let cancelled = svc.create_booking(input_for("2-2")).await.unwrap();
        svc.cancel_booking(&cancelled.id, "changed mind").await.unwrap();

        let statuses = svc.seat_statuses().await.unwrap();
        assert_eq!(statuses.len(), TOTAL_SEATS);
        assert_eq!(statuses["12-7"], "pending");
        assert_eq!(statuses["1-1"], "reserved");
        assert_eq!(statuses["2-2"], "available");
        assert_eq!(statuses["36-14"], "available");
    }

    #[tokio::test]
    async fn confirm_then_delete_releases_the_seat() {
        let svc = service().await;
        let booking = svc.create_booking(input_for("12-7")).await.unwrap();

        let confirmed = svc.confirm_booking(&booking.id, "admin").await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(
            confirmed.metadata.get("confirmedBy"),
            Some(&Value::from("admin"))
        );
        assert_eq!(svc.seat_statuses().await.unwrap()["12-7"], "reserved");

        svc.delete_booking(&booking.id).await.unwrap();
        assert_eq!(svc.seat_statuses().await.unwrap()["12-7"], "available");
        assert!(matches!(
            svc.get_booking(&booking.id).await.unwrap_err(),
            DomainError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn cancel_then_rebook_succeeds_immediately() {
        let svc = service().await;
        let booking = svc.create_booking(input_for("5-3")).await.unwrap();
        svc.confirm_booking(&booking.id, "admin").await.unwrap();

        svc.cancel_booking(&booking.id, "refund").await.unwrap();
        svc.create_booking(input_for("5-3")).await.unwrap();
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let svc = service().await;
        let mut batch = HashMap::new();
        batch.insert(
            "legacy-1".to_string(),
            SyncRecord {
                seat_id: "3-3".into(),
                status: Some("Оплачен".into()),
                first_name: Some("Aida".into()),
                ..Default::default()
            },
        );
        batch.insert(
            "legacy-2".to_string(),
            SyncRecord {
                seat_id: "3-4".into(),
                status: None,
                ..Default::default()
            },
        );

        let first = svc.sync_local_bookings(batch.clone()).await.unwrap();
        assert_eq!(first.synced_count, 2);
        assert_eq!(first.skipped_count, 0);
        assert!(first.errors.is_empty());

        let second = svc.sync_local_bookings(batch).await.unwrap();
        assert_eq!(second.synced_count, 0);
        assert_eq!(second.skipped_count, 2);

        // легаси-статус нормализован, не продублирован
        let synced = svc.get_booking("legacy-1").await.unwrap();
        assert_eq!(synced.status, BookingStatus::Confirmed);
        assert_eq!(svc.list_bookings(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sync_reports_conflicting_seat_claims() {
        let svc = service().await;
        svc.create_booking(input_for("9-9")).await.unwrap();

        let mut batch = HashMap::new();
        batch.insert(
            "offline-1".to_string(),
            SyncRecord {
                seat_id: "9-9".into(),
                ..Default::default()
            },
        );
        let outcome = svc.sync_local_bookings(batch).await.unwrap();
        assert_eq!(outcome.synced_count, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].id, "offline-1");
    }

    #[tokio::test]
    async fn prebook_count_takes_first_free_seats() {
        let svc = service().await;
        svc.create_booking(input_for("1-1")).await.unwrap();

        let outcome = svc.prebook_count(3).await.unwrap();
        assert_eq!(outcome.booked, vec!["1-2", "1-3", "1-4"]);
        assert!(outcome.skipped.is_empty());
        assert_eq!(svc.seat_statuses().await.unwrap()["1-2"], "prebooked");
    }

    #[tokio::test]
    async fn release_all_frees_every_active_seat() {
        let svc = service().await;
        svc.create_booking(input_for("4-4")).await.unwrap();
        let confirmed = svc.create_booking(input_for("4-5")).await.unwrap();
        svc.confirm_booking(&confirmed.id, "admin").await.unwrap();

        let released = svc.release_all_seats().await.unwrap();
        assert_eq!(released, 2);
        let statuses = svc.seat_statuses().await.unwrap();
        assert_eq!(statuses["4-4"], "available");
        assert_eq!(statuses["4-5"], "available");
    }
}
