pub mod booking;
pub mod ticketing;

pub use booking::BookingService;
pub use ticketing::TicketingClient;
