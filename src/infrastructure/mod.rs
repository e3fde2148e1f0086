//! Infrastructure layer - store, gateway and ledger adapters

pub mod blockchain;
pub mod gateway;
pub mod store;
