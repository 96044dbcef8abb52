use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Durable booking record. One row per reference id; every write is an
/// upsert keyed on `reference_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecord {
    pub reference_id: String,
    pub client_name: String,
    pub email: String,
    pub phone: String,
    pub message: Option<String>,
    pub category: String,
    pub services: Vec<String>,
    pub schedule_date: Option<String>,
    pub schedule_slot: Option<String>,
    pub timeframe: Option<String>,
    pub status: BookingStatus,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: String,
    pub email_sent: bool,
    pub source: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    Confirmed,
    PaymentFailed,
    PaymentReceivedNeedsDetails,
    PaymentReceivedNeedsEmail,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PaymentFailed => "payment_failed",
            BookingStatus::PaymentReceivedNeedsDetails => "payment_received_needs_details",
            BookingStatus::PaymentReceivedNeedsEmail => "payment_received_needs_email",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "payment_failed" => BookingStatus::PaymentFailed,
            "payment_received_needs_details" => BookingStatus::PaymentReceivedNeedsDetails,
            "payment_received_needs_email" => BookingStatus::PaymentReceivedNeedsEmail,
            _ => BookingStatus::Scheduled,
        }
    }

    /// Statuses meaning money has been received. Such a record must never be
    /// downgraded by a later failed verification attempt.
    pub fn payment_complete(&self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed
                | BookingStatus::PaymentReceivedNeedsDetails
                | BookingStatus::PaymentReceivedNeedsEmail
        )
    }
}
