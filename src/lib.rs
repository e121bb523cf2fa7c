pub mod daemon;
pub mod device;
pub mod engine;
pub mod errors;
pub mod models;
pub mod server;
pub mod storage;
