// Local ONNX toxicity classifier using Detoxify's `original` checkpoint.
//
// The checkpoint is a bert-base-uncased model fine-tuned on the Jigsaw toxic
// comment data. Exported to ONNX it takes the three standard BERT inputs and
// returns one logit per Jigsaw label; Detoxify applies a sigmoid to each.
//
// Output: 6 toxicity categories with continuous 0-1 scores.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::download::{TOXICITY_MODEL_FILE, TOXICITY_TOKENIZER_FILE};
use super::traits::{Category, RawScores, ToxicityClassifier};

/// BERT's positional embedding limit.
const MAX_SEQUENCE_LEN: usize = 512;

/// Local ONNX-based toxicity classifier. Holds the model session and tokenizer
/// behind Arc so inference can be offloaded to spawn_blocking.
pub struct OnnxToxicityClassifier {
    // ort::Session::run takes &mut self, hence the Mutex.
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxToxicityClassifier {
    /// Load the ONNX model and tokenizer from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` to exist in `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(TOXICITY_MODEL_FILE);
        let tokenizer_path = model_dir.join(TOXICITY_TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Toxicity model not found: {}\nRun `sentra download-model` or copy the exported Detoxify model there.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Tokenizer file not found: {}\nRun `sentra download-model` or copy it next to the model.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure tokenizer truncation: {}", e))?;
        // Single-text inference never pads.
        tokenizer.with_padding(None);

        debug!("Loaded ONNX toxicity model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl ToxicityClassifier for OnnxToxicityClassifier {
    /// Tokenize, run one forward pass, and apply sigmoid to the logits.
    ///
    /// The CPU-bound work is offloaded to spawn_blocking so it doesn't block
    /// the tokio runtime serving other requests.
    async fn classify(&self, text: &str) -> Result<RawScores> {
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || classify_sync(&session, &tokenizer, &text))
            .await
            .context("spawn_blocking panicked")?
    }
}

fn classify_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    text: &str,
) -> Result<RawScores> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

    let seq_len = encoding.get_ids().len();
    let shape = [1_i64, seq_len as i64];

    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

    let input_ids_tensor =
        Tensor::from_array((shape, input_ids)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
        .context("Failed to create token_type_ids tensor")?;

    let logits = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("ONNX inference failed")?;

        // Output shape: [1, 6], raw logits (pre-sigmoid)
        let (_out_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract output tensor")?;

        data.to_vec()
    };

    if logits.len() < Category::ALL.len() {
        anyhow::bail!(
            "Model returned {} outputs, expected {}",
            logits.len(),
            Category::ALL.len()
        );
    }

    let probabilities: Vec<f64> = logits.iter().map(|&l| sigmoid(l as f64)).collect();
    let scores = RawScores::from_model_row(&probabilities);

    debug!(
        toxic = ?scores.get(Category::Toxic),
        insult = ?scores.get(Category::Insult),
        tokens = seq_len,
        text_preview = %crate::output::truncate_chars(text, 50),
        "ONNX classified text"
    );

    Ok(scores)
}

/// Sigmoid activation: maps any real number to (0, 1).
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_zero() {
        let result = sigmoid(0.0);
        assert!((result - 0.5).abs() < 1e-10, "sigmoid(0) should be 0.5");
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        for x in [0.5, 1.0, 2.0, 5.0] {
            let sum = sigmoid(x) + sigmoid(-x);
            assert!((sum - 1.0).abs() < 1e-10, "sigmoid({x}) + sigmoid(-{x}) should equal 1.0");
        }
    }

    #[test]
    fn test_load_missing_dir_reports_model_path() {
        let dir = std::env::temp_dir().join("sentra-test-no-model");
        let err = OnnxToxicityClassifier::load(&dir).err().expect("load should fail");
        assert!(err.to_string().contains(TOXICITY_MODEL_FILE));
    }
}
