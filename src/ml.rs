pub mod bridge;
pub mod jobs;
pub mod normalize;
pub mod orchestrator;
