pub mod file;
pub mod simulator;
pub mod tracker;

pub use file::UploadFile;
pub use simulator::LocalPhaseSimulator;
pub use tracker::{transfer_percent, ProgressCallback, TransferTracker};
