pub mod attempts;
pub mod json_store;
pub mod ledger;
pub mod schema;
