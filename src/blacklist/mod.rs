mod expiry;
mod gate;
mod store;

pub(crate) use expiry::{classify, ExpiryStatus};
pub(crate) use gate::{check_message, GateDecision};
pub(crate) use store::{BlacklistRecord, BlacklistStore, BLACKLIST_DB_FILE};

#[cfg(test)]
pub(crate) use store::tests::temp_store;
