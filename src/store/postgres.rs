use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use super::{booking_from_columns, BookingStore};
use crate::error::StoreError;
use crate::models::{Booking, BookingStatus, BookingUpdate, SeatId};

type BookingRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Value,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SELECT_COLUMNS: &str =
    "id, seat_id, first_name, last_name, phone, email, status, metadata, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    pub async fn new(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        let store = PostgresStore { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        info!("Initializing bookings schema (postgres)");
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
                metadata   JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Инвариант "одно место - одна активная бронь" держит частичный
        // уникальный индекс; гонки create разрешает сама БД.
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
}

#[async_trait]
impl BookingStore for PostgresStore {
    async fn create(&self, booking: Booking) -> Result<Booking, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, seat_id, first_name, last_name, phone, email, status, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&booking.id)
        .bind(booking.seat_id.to_string())
        .bind(&booking.user.first_name)
        .bind(&booking.user.last_name)
        .bind(&booking.user.phone)
        .bind(&booking.user.email)
        .bind(booking.status.as_str())
        .bind(Value::Object(booking.metadata.clone()))
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, booking.seat_id))?;

        Ok(booking)
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| booking_from_columns(r.0, r.1, r.2, r.3, r.4, r.5, r.6, r.7, r.8, r.9))
            .transpose()
    }

    async fn list(&self, status: Option<BookingStatus>) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = match status {
            Some(s) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM bookings WHERE status = $1 ORDER BY created_at DESC",
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

        rows.into_iter()
            .map(|r| booking_from_columns(r.0, r.1, r.2, r.3, r.4, r.5, r.6, r.7, r.8, r.9))
            .collect()
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

        sqlx::query(
            r#"
            UPDATE bookings
            SET first_name = $1, last_name = $2, phone = $3, email = $4,
                status = $5, metadata = $6, updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(&booking.user.first_name)
        .bind(&booking.user.last_name)
        .bind(&booking.user.phone)
        .bind(&booking.user.email)
        .bind(booking.status.as_str())
        .bind(Value::Object(booking.metadata.clone()))
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

        let res = sqlx::query("DELETE FROM bookings WHERE id = $1")
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
                WHERE seat_id = $1 AND status IN ('pending', 'confirmed')
            )
            "#,
        )
        .bind(seat.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(!taken)
    }
}
