// Sentra: toxicity analysis for text, images, and audio
//
// This is the library root. Each module corresponds to one stage of the
// analysis path: extract text from media, classify it, reduce the scores
// to a verdict, and serve or print the result.

pub mod config;
pub mod extract;
pub mod output;
pub mod scoring;
pub mod toxicity;
pub mod web;
