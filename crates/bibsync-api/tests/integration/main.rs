//! Integration test entry point for bibsync-api
//!
//! Collects the wiremock-based integration test modules into a single
//! test binary.

mod test_client;
mod test_versions;
mod test_write;
