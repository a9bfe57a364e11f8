use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use super::BookingStore;
use crate::error::StoreError;
use crate::models::{Booking, BookingStatus, BookingUpdate, SeatId};

/// Плоский JSON-файл с бронями. Один серверный процесс, поэтому
/// атомарность check-then-insert обеспечивает процесс-локальный Mutex
/// вокруг read-modify-write; на диск пишем через временный файл и rename.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, Booking>>,
}

impl JsonFileStore {
    pub async fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bookings: HashMap<String, Booking> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} bookings from {}", bookings.len(), path.display());
        Ok(JsonFileStore {
            path,
            state: Mutex::new(bookings),
        })
    }

    async fn persist(&self, bookings: &HashMap<String, Booking>) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(bookings)
            .map_err(|e| StoreError::Backend(e.into()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for JsonFileStore {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError> {
        let mut bookings = self.state.lock().await;

        let seat_taken = bookings
            .values()
            .any(|b| b.seat_id == booking.seat_id && b.status.is_active());
        if seat_taken {
            return Err(StoreError::SeatConflict {
                seat_id: booking.seat_id.to_string(),
            });
        }
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "booking id {} already exists",
                booking.id
            )));
        }

        bookings.insert(booking.id.clone(), booking.clone());
        // Клиент увидел ошибку - записи остаться не должно
        if let Err(e) = self.persist(&bookings).await {
            bookings.remove(&booking.id);
            return Err(e);
        }
        Ok(booking)
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.state.lock().await.get(id).cloned())
    }

    async fn list(&self, status: Option<BookingStatus>) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.state.lock().await;
        let mut out: Vec<Booking> = bookings
            .values()
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update(
        &self,
        id: &str,
        changes: &BookingUpdate,
    ) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.state.lock().await;
        let Some(current) = bookings.get(id) else {
            return Ok(None);
        };
        let previous = current.clone();

        let mut updated = current.clone();
        updated.apply(changes);

        // Возврат в активный статус не должен обходить инвариант места
        if updated.status.is_active() && !previous.status.is_active() {
            let seat_taken = bookings
                .values()
                .any(|b| b.id != updated.id && b.seat_id == updated.seat_id && b.status.is_active());
            if seat_taken {
                return Err(StoreError::SeatConflict {
                    seat_id: updated.seat_id.to_string(),
                });
            }
        }

        bookings.insert(id.to_string(), updated.clone());
        if let Err(e) = self.persist(&bookings).await {
            bookings.insert(id.to_string(), previous);
            return Err(e);
        }
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let mut bookings = self.state.lock().await;
        let Some(removed) = bookings.remove(id) else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&bookings).await {
            bookings.insert(removed.id.clone(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    async fn is_seat_available(&self, seat: SeatId) -> Result<bool, StoreError> {
        let bookings = self.state.lock().await;
        Ok(!bookings
            .values()
            .any(|b| b.seat_id == seat && b.status.is_active()))
    }
}
