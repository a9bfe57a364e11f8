use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

use super::{booking_from_columns, BookingStore};
use crate::error::StoreError;
use crate::models::{Booking, BookingStatus, BookingUpdate, SeatId};

// Метаданные лежат в TEXT-колонке как JSON-строка
type BookingRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SELECT_COLUMNS: &str =
    "id, seat_id, first_name, last_name, phone, email, status, metadata, created_at, updated_at";

/// Встраиваемый бэкенд на SQLite; та же схема и тот же частичный
/// уникальный индекс, что и у Postgres-бэкенда.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = SqliteStore { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        info!("Initializing bookings schema (sqlite)");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id         TEXT PRIMARY KEY,
                seat_id    TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name  TEXT NOT NULL,
                phone      TEXT NOT NULL,
                email      TEXT,
                status     TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS bookings_active_seat
            ON bookings (seat_id)
            WHERE status IN ('pending', 'confirmed')
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn map_write_error(e: sqlx::Error, seat_id: SeatId) -> StoreError {
        match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::SeatConflict {
                seat_id: seat_id.to_string(),
            },
            e => StoreError::Backend(e.into()),
        }
    }

    fn decode_row(r: BookingRow) -> Result<Booking, StoreError> {
        let metadata: Value = serde_json::from_str(&r.7)
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("corrupt metadata in booking {}: {}", r.0, e)))?;
        booking_from_columns(r.0, r.1, r.2, r.3, r.4, r.5, r.6, metadata, r.8, r.9)
    }

    fn encode_metadata(booking: &Booking) -> Result<String, StoreError> {
        serde_json::to_string(&booking.metadata)
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("metadata serialization: {}", e)))
    }
}

#[async_trait]
impl BookingStore for SqliteStore {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError> {
        let metadata = Self::encode_metadata(&booking)?;
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, seat_id, first_name, last_name, phone, email, status, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&booking.id)
        .bind(booking.seat_id.to_string())
        .bind(&booking.user.first_name)
        .bind(&booking.user.last_name)
        .bind(&booking.user.phone)
        .bind(&booking.user.email)
        .bind(booking.status.as_str())
        .bind(metadata)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, booking.seat_id))?;

        Ok(booking)
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::decode_row).transpose()
    }

    async fn list(&self, status: Option<BookingStatus>) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = match status {
            Some(s) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM bookings WHERE status = ? ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))
                .bind(s.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM bookings ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Self::decode_row).collect()
    }

    async fn update(
        &self,
        id: &str,
        changes: &BookingUpdate,
    ) -> Result<Option<Booking>, StoreError> {
        let Some(mut booking) = self.get(id).await? else {
            return Ok(None);
        };
        booking.apply(changes);
        let metadata = Self::encode_metadata(&booking)?;

        sqlx::query(
            r#"
            UPDATE bookings
            SET first_name = ?, last_name = ?, phone = ?, email = ?,
                status = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&booking.user.first_name)
        .bind(&booking.user.last_name)
        .bind(&booking.user.phone)
        .bind(&booking.user.email)
        .bind(booking.status.as_str())
        .bind(metadata)
        .bind(booking.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, booking.seat_id))?;

        Ok(Some(booking))
    }

    async fn delete(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let Some(booking) = self.get(id).await? else {
            return Ok(None);
        };

        let res = sqlx::query("DELETE FROM bookings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(booking))
    }

    async fn is_seat_available(&self, seat: SeatId) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bookings
                WHERE seat_id = ? AND status IN ('pending', 'confirmed')
            )
            "#,
        )
        .bind(seat.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(!taken)
    }
}
