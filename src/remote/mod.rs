/// HTTP client for an external judge server, used when fixtures are not
/// available locally.
pub mod client;
pub mod protocol;
