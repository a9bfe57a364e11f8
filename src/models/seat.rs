use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// Зал: 36 столов по 14 мест, всего 504
pub const TABLE_COUNT: u8 = 36;
pub const SEATS_PER_TABLE: u8 = 14;
pub const TOTAL_SEATS: usize = (TABLE_COUNT as usize) * (SEATS_PER_TABLE as usize);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid seat id: {0}")]
pub struct SeatIdError(String);

/// Идентификатор места: пара (стол, место) с канонической записью "{table}-{seat}".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatId {
    table: u8,
    seat: u8,
}

impl SeatId {
    pub fn new(table: u8, seat: u8) -> Result<Self, SeatIdError> {
        if table < 1 || table > TABLE_COUNT {
            return Err(SeatIdError(format!(
                "table {} out of range 1..={}",
                table, TABLE_COUNT
            )));
        }
        if seat < 1 || seat > SEATS_PER_TABLE {
            return Err(SeatIdError(format!(
                "seat {} out of range 1..={}",
                seat, SEATS_PER_TABLE
            )));
        }
        Ok(SeatId { table, seat })
    }

    pub fn table(&self) -> u8 {
        self.table
    }

    pub fn seat(&self) -> u8 {
        self.seat
    }

    /// Все 504 места в порядке (стол, место).
    pub fn all() -> impl Iterator<Item = SeatId> {
        (1..=TABLE_COUNT)
            .flat_map(|table| (1..=SEATS_PER_TABLE).map(move |seat| SeatId { table, seat }))
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.table, self.seat)
    }
}

impl FromStr for SeatId {
    type Err = SeatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (table, seat) = s
            .split_once('-')
            .ok_or_else(|| SeatIdError(format!("expected \"table-seat\", got {:?}", s)))?;
        let table: u8 = table
            .parse()
            .map_err(|_| SeatIdError(format!("bad table number in {:?}", s)))?;
        let seat: u8 = seat
            .parse()
            .map_err(|_| SeatIdError(format!("bad seat number in {:?}", s)))?;
        SeatId::new(table, seat)
    }
}

// Во всех JSON-структурах место сериализуется канонической строкой
impl Serialize for SeatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeatId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn universe_has_504_seats() {
        assert_eq!(SeatId::all().count(), TOTAL_SEATS);
        assert_eq!(TOTAL_SEATS, 504);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(SeatId::new(0, 1).is_err());
        assert!(SeatId::new(37, 1).is_err());
        assert!(SeatId::new(1, 0).is_err());
        assert!(SeatId::new(1, 15).is_err());
        assert!("37-1".parse::<SeatId>().is_err());
        assert!("12-15".parse::<SeatId>().is_err());
        assert!("12".parse::<SeatId>().is_err());
        assert!("a-b".parse::<SeatId>().is_err());
    }

    #[test]
    fn serde_uses_canonical_string() {
        let seat: SeatId = "12-7".parse().unwrap();
        assert_eq!(serde_json::to_string(&seat).unwrap(), "\"12-7\"");
        let back: SeatId = serde_json::from_str("\"12-7\"").unwrap();
        assert_eq!(back, seat);
    }

    proptest! {
        #[test]
        fn format_parse_round_trip(table in 1u8..=36, seat in 1u8..=14) {
            let id = SeatId::new(table, seat).unwrap();
            let parsed: SeatId = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed.table(), table);
            prop_assert_eq!(parsed.seat(), seat);
        }
    }
}
