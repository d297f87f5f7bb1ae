//! Audio Enhancement Pipeline

pub mod external;
pub mod highpass;
pub mod loudness;
pub mod noise;
pub mod performance;
pub mod pipeline;
pub mod presence;

pub use external::{ExternalCommandStage, ExternalPlacement, ExternalStageConfig};
pub use highpass::HighPassFilter;
pub use loudness::LoudnessNormalizer;
pub use noise::NoiseReducer;
pub use performance::{PerformanceMetrics, StageTiming};
pub use pipeline::{PipelineOutput, SkippedStage, Stage, StageOutput, StagePipeline};
pub use presence::PresenceBoost;
