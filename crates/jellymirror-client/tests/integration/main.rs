//! Integration tests for jellymirror-client
//!
//! Uses wiremock to simulate a Jellyfin server and verifies the
//! IMediaSource adapter end to end: listings, pagination parameters,
//! plugin queries and retry behaviour.

mod common;

mod test_catalog;
mod test_plugin;
mod test_retry;
