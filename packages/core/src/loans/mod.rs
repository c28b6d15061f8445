//! Loan lifecycle module: records, policy, store contracts, and the
//! engine that ties them together.

pub mod engine;
pub mod error;
pub mod policy;
pub mod store;
pub mod types;


pub use engine::LoanEngine;
pub use error::{Entity, LoanError};
pub use types::{Author, Book, ReturnOutcome, User};
