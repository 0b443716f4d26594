//! IO layer - collaborator ports and the notice channel
//!
//! - `store` - booking persistence (range read, partial update)
//! - `ledger` - append-only credit ledger (in-memory and JSONL file)
//! - `notices` - bounded non-blocking channel of user-facing outcomes
//! - `fixture` - JSON board fixtures for the command-line driver

pub mod fixture;
pub mod ledger;
pub mod notices;
pub mod store;

pub use fixture::BoardFixture;
pub use ledger::{CreditLedger, InMemoryCreditLedger, JsonlCreditLedger};
pub use notices::{create_notice_channel, Notice, NoticeSender};
pub use store::{BookingStore, InMemoryBookingStore};
