pub mod booking;
pub mod draft;
pub mod payment;
pub mod price;
pub mod reference;

pub use booking::{BookingRecord, BookingStatus};
pub use draft::{BookingDraft, ContactDetails, ScheduleChoice};
pub use payment::{GatewayOrder, GatewayPayment, PaymentRecord};
pub use price::{PackagePrice, PriceEntry, PriceQuote};
