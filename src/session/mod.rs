mod controller;
mod state;

pub use controller::{MountGuard, SessionController};
pub use state::{CompletionLatch, Session};
