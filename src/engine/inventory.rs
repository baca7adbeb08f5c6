//! Read-side inventory queries.

use super::GateEngine;
use crate::error::GateError;
use crate::model::InventoryRecord;
use crate::store::YardStore;

impl<S: YardStore> GateEngine<S> {
    /// Containers currently in the yard, oldest arrival first.
    pub fn in_yard(&self, client_id: Option<i64>) -> Result<Vec<InventoryRecord>, GateError> {
        let result = self.store.begin().map_err(GateError::from).and_then(|mut tx| {
            let rows = tx.list_in_yard(client_id)?;
            tx.rollback()?;
            Ok(rows)
        });
        self.observe("in_yard", None, result)
    }

    /// The OUT record that closed IN record `in_id`, if it has left.
    ///
    /// Fails with `NotFound` if `in_id` does not exist, and with `ValidationError` if it names
    /// an OUT record.
    pub fn exit_record_for(&self, in_id: i64) -> Result<Option<InventoryRecord>, GateError> {
        let result = self.try_exit_record_for(in_id);
        self.observe("exit_record_for", None, result)
    }

    fn try_exit_record_for(&self, in_id: i64) -> Result<Option<InventoryRecord>, GateError> {
        let mut tx = self.store.begin()?;
        let record = tx.inventory(in_id)?.ok_or(GateError::NotFound {
            entity: "inventory record",
            id: in_id,
        })?;
        if record.exit_link.is_some() {
            return Err(GateError::ValidationError(format!(
                "inventory record {in_id} is an exit record"
            )));
        }
        let exit = tx.exit_record_for(in_id)?;
        tx.rollback()?;
        Ok(exit)
    }
}
