//! Storage layer for the dialer.
//!
//! - `CallRepository`: the contract the dispatcher consumes
//! - `SqliteRepository`: rusqlite implementation plus ingestion helpers
//!
//! # Example
//!
//! ```ignore
//! use dialer::store::{CallRepository, SqliteRepository};
//!
//! let repo = SqliteRepository::open_at(Path::new("dialer.db"))?;
//! let campaign = repo.create_campaign("Q3 reminders")?;
//! repo.activate_campaign(campaign.id)?;
//! let debtor = repo.create_debtor("Ada Lovelace", "+4915112345678", None)?;
//! repo.enqueue_call(campaign.id, debtor, 1)?;
//! ```

mod repository;
mod sqlite;

pub use repository::CallRepository;
pub use sqlite::SqliteRepository;
