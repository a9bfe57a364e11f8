pub mod json_file;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{Booking, BookingStatus, BookingUpdate, SeatId, UserInfo};

/// Хранилище броней. Три взаимозаменяемых бэкенда (Postgres, SQLite,
/// JSON-файл) с одинаковой семантикой; ключевое требование - атомарный
/// check-then-insert в `create`: из двух конкурентных броней на одно
/// место выигрывает ровно одна.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError>;

    /// Все брони, новые сверху; опционально по статусу.
    async fn list(&self, status: Option<BookingStatus>) -> Result<Vec<Booking>, StoreError>;

    async fn update(&self, id: &str, changes: &BookingUpdate)
        -> Result<Option<Booking>, StoreError>;

    /// Жёсткое удаление; возвращает удалённую запись.
    async fn delete(&self, id: &str) -> Result<Option<Booking>, StoreError>;

    /// true, если на месте нет брони в статусе pending/confirmed.
    async fn is_seat_available(&self, seat: SeatId) -> Result<bool, StoreError>;
}

pub async fn connect(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn BookingStore>> {
    match cfg.backend.as_str() {
        "postgres" => {
            let url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL required for postgres backend"))?;
            Ok(Arc::new(postgres::PostgresStore::new(url, cfg.pool_size).await?))
        }
        "sqlite" => {
            let url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL required for sqlite backend"))?;
            Ok(Arc::new(sqlite::SqliteStore::new(url).await?))
        }
        "json" => Ok(Arc::new(json_file::JsonFileStore::new(&cfg.json_path).await?)),
        other => anyhow::bail!("unknown store backend: {}", other),
    }
}

// Общая сборка Booking из колонок SQL-бэкендов
#[allow(clippy::too_many_arguments)]
pub(crate) fn booking_from_columns(
    id: String,
    seat_id: String,
    first_name: String,
    last_name: String,
    phone: String,
    email: Option<String>,
    status: String,
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Result<Booking, StoreError> {
    let seat_id: SeatId = seat_id
        .parse()
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("corrupt seat id in booking {}: {}", id, e)))?;
    let status: BookingStatus = status
        .parse()
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("corrupt status in booking {}: {}", id, e)))?;
    let metadata = match metadata {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    Ok(Booking {
        id,
        seat_id,
        user: UserInfo {
            first_name,
            last_name,
            phone,
            email,
        },
        status,
        metadata,
        created_at,
        updated_at,
    })
}
