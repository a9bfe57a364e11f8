use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::seat::SeatId;

/// Жизненный цикл брони: pending -> confirmed, из обоих -> cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown booking status: {0:?}")]
pub struct StatusParseError(String);

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Бронь в этом статусе держит место за собой.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Приводит легаси-синонимы ("paid", "Оплачен", "reserved", "prebooked"...)
    /// к каноническому статусу. Неизвестные строки не принимаются.
    pub fn normalize(raw: &str) -> Result<BookingStatus, StatusParseError> {
        match raw.trim().to_lowercase().as_str() {
            "pending" | "prebooked" => Ok(BookingStatus::Pending),
            "confirmed" | "paid" | "reserved" | "оплачен" => Ok(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            _ => Err(StatusParseError(raw.to_string())),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Строгий разбор для значений из хранилища
impl FromStr for BookingStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub seat_id: SeatId,
    #[serde(rename = "userInfo")]
    pub user: UserInfo,
    pub status: BookingStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Частичное обновление брони: метаданные сливаются поверхностно,
/// остальные поля перезаписываются, если заданы.
#[derive(Debug, Clone, Default)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl Booking {
    pub fn new(seat_id: SeatId, user: UserInfo, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Booking {
            id: uuid::Uuid::new_v4().to_string(),
            seat_id,
            user,
            status: BookingStatus::Pending,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: &BookingUpdate) {
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(ref v) = changes.first_name {
            self.user.first_name = v.clone();
        }
        if let Some(ref v) = changes.last_name {
            self.user.last_name = v.clone();
        }
        if let Some(ref v) = changes.phone {
            self.user.phone = v.clone();
        }
        if let Some(ref v) = changes.email {
            self.user.email = Some(v.clone());
        }
        if let Some(ref extra) = changes.metadata {
            for (k, v) in extra {
                self.metadata.insert(k.clone(), v.clone());
            }
        }
        self.updated_at = Utc::now();
    }

    /// Статус места для клиентской раскраски. Канонический статус брони
    /// и подписи на сетке - разные словари, отображение держим в одном месте.
    pub fn display_status(&self) -> &'static str {
        match self.status {
            BookingStatus::Pending => {
                if self.metadata.get("source").and_then(Value::as_str) == Some("prebook") {
                    "prebooked"
                } else {
                    "pending"
                }
            }
            BookingStatus::Confirmed => "reserved",
            BookingStatus::Cancelled => "available",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_booking() -> Booking {
        Booking::new(
            "5-3".parse().unwrap(),
            UserInfo {
                first_name: "Ivan".into(),
                last_name: "Petrov".into(),
                phone: "+996555123456".into(),
                email: None,
            },
            Map::new(),
        )
    }

    #[test]
    fn normalize_accepts_legacy_synonyms() {
        assert_eq!(BookingStatus::normalize("paid").unwrap(), BookingStatus::Confirmed);
        assert_eq!(BookingStatus::normalize("Оплачен").unwrap(), BookingStatus::Confirmed);
        assert_eq!(BookingStatus::normalize("reserved").unwrap(), BookingStatus::Confirmed);
        assert_eq!(BookingStatus::normalize("prebooked").unwrap(), BookingStatus::Pending);
        assert_eq!(BookingStatus::normalize("canceled").unwrap(), BookingStatus::Cancelled);
        assert!(BookingStatus::normalize("на рассмотрении").is_err());
        assert!(BookingStatus::normalize("free").is_err());
    }

    #[test]
    fn strict_parse_rejects_synonyms() {
        assert!("paid".parse::<BookingStatus>().is_err());
        assert_eq!("pending".parse::<BookingStatus>().unwrap(), BookingStatus::Pending);
    }

    #[test]
    fn display_status_mapping() {
        let mut b = sample_booking();
        assert_eq!(b.display_status(), "pending");
        b.status = BookingStatus::Confirmed;
        assert_eq!(b.display_status(), "reserved");
        b.status = BookingStatus::Pending;
        b.metadata.insert("source".into(), Value::from("prebook"));
        assert_eq!(b.display_status(), "prebooked");
    }

    #[test]
    fn apply_merges_metadata_shallow() {
        let mut b = sample_booking();
        b.metadata.insert("price".into(), Value::from(1500));
        b.metadata.insert("source".into(), Value::from("web"));

        let mut extra = Map::new();
        extra.insert("source".into(), Value::from("migration"));
        extra.insert("note".into(), Value::from("moved"));
        b.apply(&BookingUpdate {
            metadata: Some(extra),
            ..Default::default()
        });

        assert_eq!(b.metadata.get("price"), Some(&Value::from(1500)));
        assert_eq!(b.metadata.get("source"), Some(&Value::from("migration")));
        assert_eq!(b.metadata.get("note"), Some(&Value::from("moved")));
    }
}
