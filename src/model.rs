//! The seam to language-model inference.
//!
//! Inference lives outside this crate. Drafting, repair and forced retries
//! all go through [`RepairModel`], so any backend (local server, hosted API,
//! recorded transcript) can be plugged in.

/// A text-in, text-out generator.
pub trait RepairModel {
    fn generate(&mut self, prompt: &str) -> anyhow::Result<String>;
}

impl<F> RepairModel for F
where
    F: FnMut(&str) -> anyhow::Result<String>,
{
    fn generate(&mut self, prompt: &str) -> anyhow::Result<String> {
        self(prompt)
    }
}
