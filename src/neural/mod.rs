pub mod corrector;
pub mod lstm;
pub mod network;
pub mod scaler;

pub use corrector::{CorrectorConfig, FittedResidualModel};
pub use network::TrainingReport;
