// ============================================
// Background Jobs Module (後台任務模組)
// ============================================
//
// Offline jobs that run against a full snapshot:
// 1. Training-set construction
// 2. Ranking model training + publication

pub mod training;

pub use training::{TrainingData, TrainingDataBuilder, TrainingJob, TrainingOutcome};
