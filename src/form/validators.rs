use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures_timer::Delay;
use serde_json::Value;

use super::validation::{AsyncFieldValidator, BoxedValidationFuture, FormValues, ValidationError};

/// Accepts only dates later than now, after waiting `latency` to stand in
/// for an external lookup.
#[derive(Clone, Copy, Debug)]
pub struct FutureDate {
    latency: Duration,
}

pub fn future_date(latency: Duration) -> FutureDate {
    FutureDate { latency }
}

impl AsyncFieldValidator for FutureDate {
    type Fut<'a> = BoxedValidationFuture<'a>;

    fn validate<'a>(&'a self, _values: &'a FormValues, value: &'a Value) -> Self::Fut<'a> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                Delay::new(self.latency).await;
            }
            match value.as_str().and_then(parse_date) {
                Some(date) if date > Utc::now() => Ok(()),
                _ => Err(ValidationError::new("can't be in the past")),
            }
        })
    }
}

// Date inputs send `YYYY-MM-DD`; anything else must be RFC 3339.
fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
    }
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
