pub mod config;
pub mod constants;
pub mod core;
pub mod native;
pub mod remote;
pub mod storage;
pub mod stubs;
