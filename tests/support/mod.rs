//! Shared helpers for integration tests.

#[allow(dead_code)]
pub mod fake_page_server;
#[allow(dead_code)]
pub mod fake_upload_server;
#[allow(dead_code)]
pub mod socket_guard;
