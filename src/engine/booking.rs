//! Booking allocations.

use super::{map_constraint, GateContext, GateEngine};
use crate::audit::ACTION_BOOKING;
use crate::error::GateError;
use crate::model::{BookingAllocation, BookingUnit, NewBooking};
use crate::store::{YardStore, YardTx};
use chrono::NaiveDate;

const MODULE: &str = "booking";

/// Consume one unit of a booking inside the caller's unit of work.
///
/// The booking row is locked and the remainders are read from the locked row, never from an
/// earlier snapshot. `container_client` is the client recorded on the container's IN record;
/// a booking for a different client cannot release it.
pub(crate) fn consume_booking_unit(
    tx: &mut dyn YardTx,
    booking_id: i64,
    unit: &BookingUnit,
    container_client: Option<i64>,
    today: NaiveDate,
) -> Result<BookingAllocation, GateError> {
    let mut booking = tx.lock_booking(booking_id)?.ok_or(GateError::NotFound {
        entity: "booking",
        id: booking_id,
    })?;
    if let Some(client_id) = container_client {
        if client_id != booking.client_id {
            return Err(GateError::ValidationError(format!(
                "booking {} belongs to another client than container {}",
                booking.booking_no, unit.container_no
            )));
        }
    }
    let consumed = booking.consume(unit, today)?;
    tx.update_booking_remaining(&booking)?;
    log::debug!(
        "Booking {} consumed {consumed:?} for {}",
        booking.booking_no,
        unit.container_no
    );
    Ok(booking)
}

impl<S: YardStore> GateEngine<S> {
    /// Validate and insert a booking. Remainders start at the requested counts.
    pub fn create_booking(
        &self,
        ctx: &GateContext,
        input: NewBooking,
    ) -> Result<BookingAllocation, GateError> {
        let result = self.try_create_booking(ctx, input);
        self.observe("create_booking", Some(ctx), result)
    }

    fn try_create_booking(
        &self,
        ctx: &GateContext,
        input: NewBooking,
    ) -> Result<BookingAllocation, GateError> {
        let draft = input.validate()?;
        let mut tx = self.store.begin()?;
        let booking = tx
            .insert_booking(&draft)
            .map_err(|e| map_constraint(e, &draft.booking_no))?;
        tx.commit()?;

        self.committed(
            ctx,
            ACTION_BOOKING,
            MODULE,
            Some(booking.id),
            format!(
                "Booking {} for client {}: {}x20, {}x40, {}x45, {} listed",
                booking.booking_no,
                booking.client_id,
                booking.twenty,
                booking.forty,
                booking.forty_five,
                booking.cont_list.len()
            ),
        );
        Ok(booking)
    }

    /// Bookings not expired at `today` that still have something to release.
    pub fn active_bookings(
        &self,
        client_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<Vec<BookingAllocation>, GateError> {
        let result = self.try_active_bookings(client_id, today);
        self.observe("active_bookings", None, result)
    }

    fn try_active_bookings(
        &self,
        client_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<Vec<BookingAllocation>, GateError> {
        let mut tx = self.store.begin()?;
        let bookings = tx.list_bookings(client_id, today)?;
        tx.rollback()?;
        Ok(bookings
            .into_iter()
            .filter(|b| b.is_active(today))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::engine::now;
    use crate::model::booking::STATUS_CONSUMED;
    use crate::model::SizeClass;
    use crate::store::MemoryYardStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn engine() -> GateEngine<MemoryYardStore> {
        GateEngine::new(MemoryYardStore::new(), Arc::new(MemoryAuditSink::new()))
    }

    fn booking(booking_no: &str, twenty: i32, cont_list: &str) -> NewBooking {
        NewBooking {
            booking_no: booking_no.to_string(),
            client_id: 7,
            shipper: "Blue Ocean Exports".to_string(),
            twenty,
            forty: 0,
            forty_five: 0,
            cont_list: cont_list.to_string(),
            expiration_date: now().date_naive() + Duration::days(30),
        }
    }

    fn unit(container_no: &str, size: Option<SizeClass>) -> BookingUnit {
        BookingUnit {
            container_no: container_no.to_string(),
            size,
        }
    }

    #[test]
    fn test_create_booking_sets_remainders() {
        let engine = engine();
        let created = engine
            .create_booking(&GateContext::new(1), booking("bk-1001", 2, "MSCU1234567"))
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.booking_no, "BK-1001");
        assert_eq!(created.twenty_rem, 2);
        assert_eq!(created.cont_list_rem, vec!["MSCU1234567".to_string()]);
    }

    #[test]
    fn test_duplicate_booking_number_rejected() {
        let engine = engine();
        let ctx = GateContext::new(1);
        engine.create_booking(&ctx, booking("BK-1001", 1, "")).unwrap();
        let err = engine.create_booking(&ctx, booking("BK-1001", 1, "")).unwrap_err();
        assert!(matches!(err, GateError::ValidationError(_)));
    }

    #[test]
    fn test_consume_listed_then_size() {
        let engine = engine();
        let created = engine
            .create_booking(&GateContext::new(1), booking("BK-1002", 1, "MSCU1234567"))
            .unwrap();
        let today = now().date_naive();

        let mut tx = engine.store().begin().unwrap();
        let after = consume_booking_unit(
            tx.as_mut(),
            created.id,
            &unit("MSCU1234567", Some(SizeClass::Forty)),
            Some(7),
            today,
        )
        .unwrap();
        assert!(after.cont_list_rem.is_empty());
        assert_eq!(after.twenty_rem, 1);

        let after = consume_booking_unit(
            tx.as_mut(),
            created.id,
            &unit("TGHU7654321", Some(SizeClass::Twenty)),
            None,
            today,
        )
        .unwrap();
        assert_eq!(after.twenty_rem, 0);
        assert_eq!(after.status, STATUS_CONSUMED);
        tx.commit().unwrap();

        assert!(engine.active_bookings(Some(7), today).unwrap().is_empty());
    }

    #[test]
    fn test_consume_rejects_other_client() {
        let engine = engine();
        let created = engine
            .create_booking(&GateContext::new(1), booking("BK-1003", 1, ""))
            .unwrap();
        let mut tx = engine.store().begin().unwrap();
        let err = consume_booking_unit(
            tx.as_mut(),
            created.id,
            &unit("TGHU7654321", Some(SizeClass::Twenty)),
            Some(99),
            now().date_naive(),
        )
        .unwrap_err();
        assert!(matches!(err, GateError::ValidationError(_)));
    }

    #[test]
    fn test_consume_unknown_booking() {
        let engine = engine();
        let mut tx = engine.store().begin().unwrap();
        let err = consume_booking_unit(
            tx.as_mut(),
            404,
            &unit("TGHU7654321", Some(SizeClass::Twenty)),
            None,
            now().date_naive(),
        )
        .unwrap_err();
        assert!(matches!(err, GateError::NotFound { entity: "booking", id: 404 }));
    }

    #[test]
    fn test_active_bookings_filters_client() {
        let engine = engine();
        let ctx = GateContext::new(1);
        engine.create_booking(&ctx, booking("BK-2001", 1, "")).unwrap();
        let mut other = booking("BK-2002", 1, "");
        other.client_id = 8;
        engine.create_booking(&ctx, other).unwrap();

        assert_eq!(engine.active_bookings(None, now().date_naive()).unwrap().len(), 2);
        let mine = engine.active_bookings(Some(8), now().date_naive()).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].booking_no, "BK-2002");
    }
}
