//! Model registry, ensemble inference and stacking

pub mod combiner;
pub mod inference;
pub mod loader;
pub mod registry;

pub use combiner::StackingCombiner;
pub use inference::{EnsemblePredictor, ProbabilityVector};
pub use loader::{ModelLoader, OnnxClassifier, OnnxMetaLearner};
pub use registry::{MetaLearner, ModelRegistry, ProbabilityClassifier};
