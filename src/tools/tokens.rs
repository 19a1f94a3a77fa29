//! Token usage estimation for tool results.
//!
//! Estimates are attached to tool outputs when [`TokenTracking`] is enabled,
//! so assistants can see roughly how much context a call consumed. Counts
//! come from a tiktoken BPE encoding, `cl100k_base` unless configured.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Encoding used when none is configured.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Payloads larger than this are estimated at 4 bytes per token without
/// running the tokenizer.
pub const MAX_ESTIMATION_BYTES: usize = 1 << 20;

const BYTES_PER_TOKEN: usize = 4;

/// Counts tokens in a piece of text.
pub trait TokenEstimator: Send + Sync {
    fn model(&self) -> &str;
    fn count(&self, text: &str) -> usize;
}

/// Estimator backed by a tiktoken encoding.
pub struct TiktokenEstimator {
    model: String,
    bpe: CoreBPE,
}

impl std::fmt::Debug for TiktokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenEstimator")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TiktokenEstimator {
    /// Load the encoding named `model`. Encoding names (`cl100k_base`,
    /// `o200k_base`, ...) and OpenAI model names (`gpt-4o`) are accepted;
    /// an empty name selects [`DEFAULT_ENCODING`].
    pub fn new(model: &str) -> DbResult<Self> {
        let model = match model.trim() {
            "" => DEFAULT_ENCODING,
            name => name,
        };

        let bpe = match model {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "p50k_edit" => tiktoken_rs::p50k_edit(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => tiktoken_rs::get_bpe_from_model(other),
        }
        .map_err(|e| DbError::config(format!("unknown token encoding '{}': {}", model, e)))?;

        Ok(Self {
            model: model.to_string(),
            bpe,
        })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn model(&self) -> &str {
        &self.model
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Estimated token counts for one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct TokenUsage {
    pub input_estimated: usize,
    pub output_estimated: usize,
    pub total_estimated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Whether tool outputs carry token estimates, and with which estimator.
#[derive(Clone, Default)]
pub enum TokenTracking {
    #[default]
    Disabled,
    Enabled(Arc<dyn TokenEstimator>),
}

impl std::fmt::Debug for TokenTracking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Enabled(estimator) => write!(f, "Enabled({})", estimator.model()),
        }
    }
}

impl TokenTracking {
    /// Enable tracking with the tiktoken encoding named `model`.
    pub fn tiktoken(model: &str) -> DbResult<Self> {
        Ok(Self::Enabled(Arc::new(TiktokenEstimator::new(model)?)))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Estimate the tokens in the JSON serialization of `value`.
    pub fn estimate<T: Serialize + ?Sized>(&self, value: &T) -> Option<usize> {
        let Self::Enabled(estimator) = self else {
            return None;
        };

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize payload for token estimation");
                return None;
            }
        };

        if json.len() > MAX_ESTIMATION_BYTES {
            return Some(json.len() / BYTES_PER_TOKEN);
        }
        Some(estimator.count(&json))
    }

    /// Usage for a call with the given input and output payloads.
    pub fn usage<I, O>(&self, input: &I, output: &O) -> Option<TokenUsage>
    where
        I: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        let Self::Enabled(estimator) = self else {
            return None;
        };
        let input_estimated = self.estimate(input)?;
        let output_estimated = self.estimate(output)?;

        Some(TokenUsage {
            input_estimated,
            output_estimated,
            total_estimated: input_estimated + output_estimated,
            model: Some(estimator.model().to_string()).filter(|m| !m.is_empty()),
        })
    }
}
