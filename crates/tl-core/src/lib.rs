pub mod error;
pub mod events;
pub mod identities;
pub mod store;
pub mod tally;
pub mod validation;

pub mod types;

pub use crate::error::TallyError;
pub use crate::store::Store;
pub use crate::tally::Tally;
