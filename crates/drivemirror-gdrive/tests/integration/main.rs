//! Integration tests for drivemirror-gdrive
//!
//! Uses wiremock to simulate the Drive v3 API and verifies the remote store
//! end to end: queries and pagination, small and resumable uploads, deletion, error
//! classification, and token refresh.

mod common;

mod test_errors;
mod test_listing;
mod test_mutations;
