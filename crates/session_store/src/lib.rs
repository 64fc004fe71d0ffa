//! Durable JSONL rollouts: one file per session, a header line followed by
//! append-only entries linked through `parent_id`.

mod catalog;
mod error;
mod paths;
mod replay;
mod schema;
mod store;

pub use catalog::{SessionPage, SessionSummary};
pub use error::SessionStoreError;
pub use paths::{session_file_name, session_id_from_file_name, session_root};
pub use schema::{
    EntryRecordType, SessionEntry, SessionEntryKind, SessionHeader, SessionRecordType,
};
pub use store::SessionStore;
