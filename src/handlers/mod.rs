pub mod admin;
pub mod bookings;
pub mod checkout;
pub mod health;
pub mod payments;
pub mod prices;
