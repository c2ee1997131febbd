//! ONNX model loader for the base classifiers and the meta-learner

use crate::error::StartupError;
use crate::models::registry::{MetaLearner, ProbabilityClassifier};
use anyhow::{anyhow, bail, Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Base classifier backed by an ONNX Runtime session.
///
/// Running a session needs exclusive access, so the session sits behind a
/// mutex owned by this handle. A session holds no state between runs, so a
/// lock poisoned by a panicking caller is still usable.
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    /// Output carrying class probabilities
    output_name: String,
}

impl ProbabilityClassifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        let input = row_tensor(features)?;
        let mut session = lock_session(&self.session);
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;

        extract_positive_probability(&outputs, &self.output_name, &self.name)
    }
}

/// Meta-learner backed by an ONNX Runtime session.
pub struct OnnxMetaLearner {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl MetaLearner for OnnxMetaLearner {
    fn predict(&self, meta_features: &[f32]) -> Result<Vec<f32>> {
        let input = row_tensor(meta_features)?;
        let mut session = lock_session(&self.session);
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;

        let output = outputs
            .get(self.output_name.as_str())
            .with_context(|| format!("missing output {}", self.output_name))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .context("meta-learner output is not a float tensor")?;
        Ok(data.to_vec())
    }
}

fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tensor of shape `[1, n]` for a single row.
fn row_tensor(values: &[f32]) -> Result<Tensor<f32>> {
    let shape = vec![1_i64, values.len() as i64];
    Tensor::from_array((shape, values.to_vec())).context("Failed to create input tensor")
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of intra-op threads per session
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a loader with the given intra-op thread count
    pub fn with_threads(onnx_threads: usize) -> Result<Self, StartupError> {
        ort::init().commit().map_err(|e| StartupError::ModelLoad {
            model: "onnxruntime".to_string(),
            reason: e.to_string(),
        })?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    fn open_session(&self, path: &Path, name: &str) -> Result<Session> {
        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;
        Ok(session)
    }

    /// Load a base classifier. Models without a probability output are rejected.
    pub fn load_classifier<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
    ) -> Result<OnnxClassifier, StartupError> {
        let session = self
            .open_session(path.as_ref(), name)
            .map_err(|e| load_error(name, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| load_error(name, anyhow!("model declares no inputs")))?;

        let output_name =
            probability_output(name, session.outputs.iter().map(|o| o.name.as_str()))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(OnnxClassifier {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// Load the stacking meta-learner (single sigmoid output).
    pub fn load_meta_learner<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<OnnxMetaLearner, StartupError> {
        let name = "meta_learner";
        let session = self
            .open_session(path.as_ref(), name)
            .map_err(|e| load_error(name, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| load_error(name, anyhow!("model declares no inputs")))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| load_error(name, anyhow!("model declares no outputs")))?;

        info!(input = %input_name, output = %output_name, "Meta-learner loaded successfully");

        Ok(OnnxMetaLearner {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

/// Name of the output carrying class probabilities.
fn probability_output<'a>(
    model: &str,
    mut outputs: impl Iterator<Item = &'a str>,
) -> Result<String, StartupError> {
    // skl2onnx / onnxmltools exports name it "probabilities" or "output_probability"
    outputs
        .find(|name| name.contains("prob"))
        .map(str::to_string)
        .ok_or_else(|| StartupError::NotProbabilistic(model.to_string()))
}

fn load_error(model: &str, err: anyhow::Error) -> StartupError {
    StartupError::ModelLoad {
        model: model.to_string(),
        reason: format!("{:#}", err),
    }
}

/// Positive-class probability from classifier outputs.
///
/// Handles plain tensors (`[batch, classes]`, XGBoost / RandomForest / MLP)
/// and `seq(map(int64, float))` (CatBoost / LightGBM zipmap exports).
fn extract_positive_probability(
    outputs: &SessionOutputs,
    output_name: &str,
    model_name: &str,
) -> Result<f64> {
    let output = outputs
        .get(output_name)
        .with_context(|| format!("missing output {}", output_name))?;

    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let prob = positive_from_tensor(&dims, data)?;
        debug!(model = %model_name, prob = prob, "Extracted from tensor");
        return Ok(prob);
    }

    if DynSequenceValueType::can_downcast(output.dtype()) {
        let prob = positive_from_sequence_map(output)?;
        debug!(model = %model_name, prob = prob, "Extracted from seq(map)");
        return Ok(prob);
    }

    bail!("output {} is neither a float tensor nor seq(map)", output_name)
}

fn positive_from_tensor(dims: &[i64], data: &[f32]) -> Result<f64> {
    let classes = match dims {
        [_, classes] => *classes,
        [classes] => *classes,
        _ => bail!("unexpected probability shape {:?}", dims),
    };
    match classes {
        // [batch, 2]: positive class is column 1
        2 => data.get(1).map(|&p| p as f64).context("empty probability tensor"),
        // [batch, 1]: already the positive-class probability
        1 => data.first().map(|&p| p as f64).context("empty probability tensor"),
        n => bail!("expected a binary classifier, got {} classes", n),
    }
}

fn positive_from_sequence_map(output: &DynValue) -> Result<f64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    // batch size is always 1
    let map_value = maps.first().context("Empty sequence")?;
    let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

    kv_pairs
        .iter()
        .find(|(class_id, _)| *class_id == 1)
        .map(|(_, prob)| *prob as f64)
        .context("No positive-class probability in map")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_from_two_class_tensor() {
        assert_eq!(positive_from_tensor(&[1, 2], &[0.25, 0.75]).unwrap(), 0.75);
        assert_eq!(positive_from_tensor(&[2], &[0.6, 0.4]).unwrap() as f32, 0.4);
    }

    #[test]
    fn test_positive_from_single_column_tensor() {
        assert_eq!(positive_from_tensor(&[1, 1], &[0.125]).unwrap(), 0.125);
    }

    #[test]
    fn test_poisoned_session_lock_recovered() {
        let session = std::sync::Arc::new(Mutex::new(7_u32));
        let poisoner = session.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("request panicked mid-run");
        })
        .join();

        assert!(session.is_poisoned());
        assert_eq!(*lock_session(&session), 7);
    }

    #[test]
    fn test_probability_output_selected() {
        let name = probability_output("XGBoost", ["label", "probabilities"].into_iter()).unwrap();
        assert_eq!(name, "probabilities");

        let outputs = ["output_label", "output_probability"];
        let name = probability_output("CatBoost", outputs.into_iter()).unwrap();
        assert_eq!(name, "output_probability");
    }

    #[test]
    fn test_label_only_model_not_probabilistic() {
        let err = probability_output("RandomForest", ["label"].into_iter()).unwrap_err();
        assert!(matches!(err, StartupError::NotProbabilistic(model) if model == "RandomForest"));

        let err = probability_output("MLP", std::iter::empty()).unwrap_err();
        assert!(matches!(err, StartupError::NotProbabilistic(_)));
    }

    #[test]
    fn test_multiclass_tensor_rejected() {
        assert!(positive_from_tensor(&[1, 3], &[0.2, 0.3, 0.5]).is_err());
        assert!(positive_from_tensor(&[1, 2, 1], &[0.2, 0.8]).is_err());
    }
}
