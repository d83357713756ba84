//! Domain models for the Retail Suite back office

mod brand;
mod customer;
mod invoice;
mod ledger;
mod product;
mod replacement;
mod user;

pub use brand::*;
pub use customer::*;
pub use invoice::*;
pub use ledger::*;
pub use product::*;
pub use replacement::*;
pub use user::*;
