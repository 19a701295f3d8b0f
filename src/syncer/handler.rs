use alloy::primitives::TxHash;

use crate::{error::BoxError, types::EventFields};

/// Application callback receiving decoded events in chain order.
///
/// Returning an error stops the pass before the event is committed, so the same event is
/// delivered again on the next pass.
pub trait EventHandler {
    type Error: Into<BoxError>;

    fn handle(
        &mut self,
        event_name: &str,
        fields: &EventFields,
        transaction_hash: TxHash,
    ) -> Result<(), Self::Error>;
}

impl<F, E> EventHandler for F
where
    F: FnMut(&str, &EventFields, TxHash) -> Result<(), E>,
    E: Into<BoxError>,
{
    type Error = E;

    fn handle(
        &mut self,
        event_name: &str,
        fields: &EventFields,
        transaction_hash: TxHash,
    ) -> Result<(), E> {
        self(event_name, fields, transaction_hash)
    }
}
