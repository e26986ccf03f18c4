pub mod common;
pub mod progress;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod ui;
pub mod utils;
