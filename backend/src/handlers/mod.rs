//! HTTP handlers

pub mod catalog;
pub mod health;
pub mod invoice;
pub mod ledger;
pub mod replacement;

pub use catalog::*;
pub use health::*;
pub use invoice::*;
pub use ledger::*;
pub use replacement::*;
