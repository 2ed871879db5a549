//! Background tasks servicing one WebSocket link.

pub(crate) mod read;
pub(crate) mod write;
