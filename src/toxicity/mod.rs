// Toxicity classification: trait-based abstraction for swappable backends.
//
// The ToxicityClassifier trait defines the interface. OnnxToxicityClassifier
// implements it with a local Detoxify model; handlers and tests only ever see
// the trait.

pub mod download;
pub mod onnx;
pub mod traits;
