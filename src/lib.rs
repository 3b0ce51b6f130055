// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod board;
pub mod celebration;
pub mod config;
pub mod dedup;
pub mod display;
pub mod feed;
pub mod poller;
pub mod proxy;
pub mod reveal;
pub mod sim;
pub mod store;
