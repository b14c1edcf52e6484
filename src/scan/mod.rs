pub mod in_flight;
pub mod orchestrator;

pub use orchestrator::{PassOutcome, ScanOrchestrator};
