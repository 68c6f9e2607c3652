//! Storage contracts and their payment revisions.
//!
//! A contract pays a host out of renter funds. Every payment is a new
//! revision with a higher revision number, signed by both parties:
//!
//! ```text
//! valid outputs:   [renter, host]     renter -= price, host += price
//! missed outputs:  [renter, host]     renter -= price, host += price
//! revision_number: n                  n + 1
//! ```
//!
//! # Components
//!
//! - [`ContractSet`] - serialised per-contract access
//! - [`RevisionJournal`] - crash fallback for in-flight revisions

mod journal;
mod set;
mod types;

pub use journal::{FallbackRecord, RevisionJournal, RevisionSaver};
pub use set::{ContractHandle, ContractSet};
pub use types::{Contract, ContractId, ContractRevision, Currency, SignedRevision};
