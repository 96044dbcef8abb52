use serde::{Deserialize, Serialize};

const MAX_SERVICES: usize = 4;

/// In-progress booking selection. Ephemeral: lives in request bodies and in
/// short-lived checkout snapshots, never in the bookings table as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDraft {
    pub category: String,
    pub services: Vec<String>,
    pub schedule: ScheduleChoice,
    pub contact: ContactDetails,
}

/// A category schedules either a concrete date + time slot or a coarse
/// timeframe bucket, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScheduleChoice {
    Slot { date: String, time: String },
    Timeframe { bucket: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl BookingDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.contact.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        let email = self.contact.email.trim();
        if email.is_empty() || !email.contains('@') || email.starts_with('@') {
            return Err("a valid email is required".to_string());
        }
        if self.contact.phone.trim().is_empty() {
            return Err("phone is required".to_string());
        }
        if self.services.is_empty() {
            return Err("at least one service must be selected".to_string());
        }
        if self.services.len() > MAX_SERVICES {
            return Err(format!("at most {MAX_SERVICES} services may be selected"));
        }
        if self.category.trim().is_empty() {
            return Err("category is required".to_string());
        }
        match &self.schedule {
            ScheduleChoice::Slot { date, time } => {
                if date.trim().is_empty() || time.trim().is_empty() {
                    return Err("date and time slot are required".to_string());
                }
                if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    return Err("date must be YYYY-MM-DD".to_string());
                }
            }
            ScheduleChoice::Timeframe { bucket } => {
                if bucket.trim().is_empty() {
                    return Err("timeframe is required".to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> BookingDraft {
        BookingDraft {
            category: "counselling".to_string(),
            services: vec!["individual-counselling".to_string()],
            schedule: ScheduleChoice::Slot {
                date: "2026-09-01".to_string(),
                time: "10:00 AM".to_string(),
            },
            contact: ContactDetails {
                name: "Asha".to_string(),
                email: "asha@example.com".to_string(),
                phone: "+919800000000".to_string(),
                message: None,
            },
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_rejects_missing_email() {
        let mut d = draft();
        d.contact.email = "not-an-email".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_too_many_services() {
        let mut d = draft();
        d.services = (0..5).map(|i| format!("svc-{i}")).collect();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_services() {
        let mut d = draft();
        d.services.clear();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_date() {
        let mut d = draft();
        d.schedule = ScheduleChoice::Slot {
            date: "01/09/2026".to_string(),
            time: "10:00 AM".to_string(),
        };
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_timeframe_variant_ok() {
        let mut d = draft();
        d.schedule = ScheduleChoice::Timeframe {
            bucket: "within-a-week".to_string(),
        };
        assert!(d.validate().is_ok());
    }
}
