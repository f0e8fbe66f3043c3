//! Integration tests for drivemirror-sync
//!
//! Runs the [`SyncEngine`](drivemirror_sync::SyncEngine) against real
//! temporary directories and an in-memory remote store, and checks the
//! resulting remote tree and run summaries end to end.

mod common;

mod test_failures;
