pub mod booking;
pub mod seat;

pub use booking::{Booking, BookingStatus, BookingUpdate, UserInfo};
pub use seat::{SeatId, SEATS_PER_TABLE, TABLE_COUNT, TOTAL_SEATS};
