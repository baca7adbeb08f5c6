//! Booking allocations: per-client container quotas consumed by gate-outs.

use super::container::{ContainerNo, SizeClass};
use crate::error::GateError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Status written once a booking has nothing left to release.
pub const STATUS_CONSUMED: &str = "CONSUMED";
/// Status of a freshly created booking.
pub const STATUS_OPEN: &str = "OPEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingAllocation {
    pub id: i64,
    pub booking_no: String,
    pub client_id: i64,
    pub shipper: String,
    pub twenty: i32,
    pub forty: i32,
    pub forty_five: i32,
    pub twenty_rem: i32,
    pub forty_rem: i32,
    pub forty_five_rem: i32,
    pub cont_list: Vec<String>,
    pub cont_list_rem: Vec<String>,
    pub expiration_date: NaiveDate,
    pub status: String,
}

/// The unit a gate-out asks a booking to release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingUnit {
    pub container_no: String,
    pub size: Option<SizeClass>,
}

/// What a successful consumption took from the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    ListedContainer,
    Size(SizeClass),
}

impl BookingAllocation {
    pub fn has_remaining_capacity(&self) -> bool {
        self.twenty_rem > 0
            || self.forty_rem > 0
            || self.forty_five_rem > 0
            || !self.cont_list_rem.is_empty()
    }

    /// Active: not expired and something left to release.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.expiration_date >= today && self.has_remaining_capacity()
    }

    pub fn remaining(&self, size: SizeClass) -> i32 {
        match size {
            SizeClass::Twenty => self.twenty_rem,
            SizeClass::Forty => self.forty_rem,
            SizeClass::FortyFive => self.forty_five_rem,
        }
    }

    fn remaining_mut(&mut self, size: SizeClass) -> &mut i32 {
        match size {
            SizeClass::Twenty => &mut self.twenty_rem,
            SizeClass::Forty => &mut self.forty_rem,
            SizeClass::FortyFive => &mut self.forty_five_rem,
        }
    }

    /// Take one unit for `unit` from this (freshly locked) booking row.
    ///
    /// A container named on the remaining list consumes its token. Otherwise the size counter
    /// for the container's size class is decremented. A container that was listed but already
    /// released does not fall back to the size counters.
    pub fn consume(&mut self, unit: &BookingUnit, today: NaiveDate) -> Result<Consumed, GateError> {
        if self.expiration_date < today {
            return Err(self.exceeded(format!("booking expired on {}", self.expiration_date)));
        }

        if let Some(pos) = self.cont_list_rem.iter().position(|c| c == &unit.container_no) {
            self.cont_list_rem.remove(pos);
            self.refresh_status();
            return Ok(Consumed::ListedContainer);
        }
        if self.cont_list.iter().any(|c| c == &unit.container_no) {
            return Err(self.exceeded(format!(
                "container {} was already released against this booking",
                unit.container_no
            )));
        }

        let size = unit.size.ok_or_else(|| {
            self.exceeded(format!(
                "container {} has no recognised size and is not on the booking list",
                unit.container_no
            ))
        })?;
        if self.remaining(size) <= 0 {
            return Err(self.exceeded(format!("no {} units remaining", size.label())));
        }
        *self.remaining_mut(size) -= 1;
        self.refresh_status();
        Ok(Consumed::Size(size))
    }

    fn refresh_status(&mut self) {
        if !self.has_remaining_capacity() {
            self.status = STATUS_CONSUMED.to_string();
        }
    }

    fn exceeded(&self, reason: String) -> GateError {
        GateError::BookingCapacityExceeded {
            booking_no: self.booking_no.clone(),
            reason,
        }
    }
}

/// Input for a new booking; remainders start equal to the requested values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub booking_no: String,
    pub client_id: i64,
    pub shipper: String,
    pub twenty: i32,
    pub forty: i32,
    pub forty_five: i32,
    /// Comma-joined container numbers, may be empty.
    pub cont_list: String,
    pub expiration_date: NaiveDate,
}

impl NewBooking {
    /// Validate counts and the container list, producing a row with `id = 0`.
    pub fn validate(self) -> Result<BookingAllocation, GateError> {
        let booking_no = self.booking_no.trim().to_ascii_uppercase();
        if booking_no.is_empty() {
            return Err(GateError::ValidationError("booking number is required".to_string()));
        }
        if self.twenty < 0 || self.forty < 0 || self.forty_five < 0 {
            return Err(GateError::ValidationError(
                "requested container counts cannot be negative".to_string(),
            ));
        }

        let mut cont_list = Vec::new();
        for token in split_list(&self.cont_list) {
            let container_no = ContainerNo::parse(&token)?;
            if cont_list.iter().any(|c: &String| c == container_no.as_str()) {
                return Err(GateError::ValidationError(format!(
                    "container {container_no} is listed twice"
                )));
            }
            cont_list.push(container_no.to_string());
        }

        let booking = BookingAllocation {
            id: 0,
            booking_no,
            client_id: self.client_id,
            shipper: self.shipper.trim().to_string(),
            twenty: self.twenty,
            forty: self.forty,
            forty_five: self.forty_five,
            twenty_rem: self.twenty,
            forty_rem: self.forty,
            forty_five_rem: self.forty_five,
            cont_list_rem: cont_list.clone(),
            cont_list,
            expiration_date: self.expiration_date,
            status: STATUS_OPEN.to_string(),
        };
        if !booking.has_remaining_capacity() {
            return Err(GateError::ValidationError(
                "booking must reserve at least one container".to_string(),
            ));
        }
        Ok(booking)
    }
}

/// Split a comma-joined container list into trimmed, upper-cased tokens.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Inverse of [`split_list`].
pub fn join_list(tokens: &[String]) -> String {
    tokens.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn booking(twenty_rem: i32, list: &[&str]) -> BookingAllocation {
        let cont_list: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        BookingAllocation {
            id: 1,
            booking_no: "BK-100".into(),
            client_id: 5,
            shipper: "Oceanic".into(),
            twenty: twenty_rem,
            forty: 0,
            forty_five: 0,
            twenty_rem,
            forty_rem: 0,
            forty_five_rem: 0,
            cont_list_rem: cont_list.clone(),
            cont_list,
            expiration_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            status: STATUS_OPEN.into(),
        }
    }

    fn unit(no: &str, size: Option<SizeClass>) -> BookingUnit {
        BookingUnit {
            container_no: no.into(),
            size,
        }
    }

    #[test]
    fn test_consume_decrements_size_counter() {
        let mut b = booking(2, &[]);
        let got = b.consume(&unit("ABCD1234567", Some(SizeClass::Twenty)), today()).unwrap();
        assert_eq!(got, Consumed::Size(SizeClass::Twenty));
        assert_eq!(b.twenty_rem, 1);
        assert_eq!(b.status, STATUS_OPEN);
    }

    #[test]
    fn test_consume_last_unit_marks_consumed() {
        let mut b = booking(1, &[]);
        b.consume(&unit("ABCD1234567", Some(SizeClass::Twenty)), today()).unwrap();
        assert_eq!(b.twenty_rem, 0);
        assert_eq!(b.status, STATUS_CONSUMED);
        assert!(!b.is_active(today()));

        let err = b
            .consume(&unit("ABCD7654321", Some(SizeClass::Twenty)), today())
            .unwrap_err();
        assert!(matches!(err, GateError::BookingCapacityExceeded { .. }));
        assert_eq!(b.twenty_rem, 0);
    }

    #[test]
    fn test_consume_wrong_size_is_rejected() {
        let mut b = booking(3, &[]);
        let err = b
            .consume(&unit("ABCD1234567", Some(SizeClass::Forty)), today())
            .unwrap_err();
        assert!(err.to_string().contains("40'"));
        assert_eq!(b.twenty_rem, 3);
    }

    #[test]
    fn test_consume_listed_container_removes_token() {
        let mut b = booking(0, &["ABCD1234567", "EFGH7654321"]);
        let got = b.consume(&unit("EFGH7654321", None), today()).unwrap();
        assert_eq!(got, Consumed::ListedContainer);
        assert_eq!(b.cont_list_rem, vec!["ABCD1234567".to_string()]);
        assert_eq!(b.cont_list.len(), 2);

        let err = b.consume(&unit("EFGH7654321", Some(SizeClass::Twenty)), today());
        assert!(matches!(err, Err(GateError::BookingCapacityExceeded { .. })));
    }

    #[test]
    fn test_consume_expired_booking() {
        let mut b = booking(5, &[]);
        let later = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let err = b.consume(&unit("ABCD1234567", Some(SizeClass::Twenty)), later).unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert_eq!(b.twenty_rem, 5);
    }

    #[test]
    fn test_active_on_expiration_day() {
        let b = booking(1, &[]);
        assert!(b.is_active(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()));
        assert!(!b.is_active(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()));
    }

    #[test]
    fn test_new_booking_validation() {
        let input = NewBooking {
            booking_no: " bk-7 ".into(),
            client_id: 5,
            shipper: "Oceanic".into(),
            twenty: 1,
            forty: 0,
            forty_five: 0,
            cont_list: "abcd1234567, EFGH7654321,".into(),
            expiration_date: today(),
        };
        let b = input.clone().validate().unwrap();
        assert_eq!(b.booking_no, "BK-7");
        assert_eq!(b.twenty_rem, 1);
        assert_eq!(b.cont_list_rem, vec!["ABCD1234567".to_string(), "EFGH7654321".to_string()]);

        let mut dup = input.clone();
        dup.cont_list = "ABCD1234567,abcd1234567".into();
        assert!(dup.validate().is_err());

        let mut empty = input;
        empty.twenty = 0;
        empty.cont_list = String::new();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_list_split_and_join() {
        let tokens = split_list(" a1, ,B2 ,");
        assert_eq!(tokens, vec!["A1".to_string(), "B2".to_string()]);
        assert_eq!(join_list(&tokens), "A1,B2");
        assert!(split_list("").is_empty());
    }
}
