//! Token counter implementation
//!
//! Uses tiktoken-rs to estimate input size before routing. When no BPE
//! encoder can be loaded, falls back to a character heuristic: roughly four
//! characters per token, two for Sinhala/CJK scripts.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tiktoken_rs::{get_bpe_from_model, CoreBPE};

/// Model whose encoder is used for input estimates
pub const ESTIMATION_MODEL: &str = "gpt-4";

/// Token counter over a lazily built gpt-4 encoder
pub struct TokenCounter {
    encoder: OnceCell<Option<CoreBPE>>,
}

impl TokenCounter {
    /// Create a new token counter
    pub fn new() -> Self {
        Self {
            encoder: OnceCell::new(),
        }
    }

    /// Build the encoder on first use; `None` if it cannot be loaded
    fn encoder(&self) -> Option<&CoreBPE> {
        self.encoder
            .get_or_init(|| match get_bpe_from_model(ESTIMATION_MODEL) {
                Ok(encoder) => Some(encoder),
                Err(e) => {
                    tracing::warn!(
                        "Failed to load {} encoder, using character heuristic: {}",
                        ESTIMATION_MODEL,
                        e
                    );
                    None
                }
            })
            .as_ref()
    }

    /// Count tokens in a text string
    pub fn count_tokens(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        match self.encoder() {
            Some(encoder) => encoder.encode_with_special_tokens(text).len() as u64,
            None => heuristic_token_estimate(text),
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate tokens without a tokenizer
pub fn heuristic_token_estimate(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }

    let (dense, other) = text.chars().fold((0u64, 0u64), |(dense, other), c| {
        if is_dense_script(c) {
            (dense + 1, other)
        } else {
            (dense, other + 1)
        }
    });

    // Dense chars weigh double; +1 so short inputs never estimate to zero
    (2 * dense + other) / 4 + 1
}

/// Scripts that average about two characters per token
fn is_dense_script(c: char) -> bool {
    matches!(
        c,
        '\u{0D80}'..='\u{0DFF}' // Sinhala
            | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
            | '\u{3040}'..='\u{30FF}' // Hiragana/Katakana
    )
}

/// Cloneable handle to one shared token counter
#[derive(Clone, Default)]
pub struct SharedTokenCounter {
    inner: Arc<TokenCounter>,
}

impl SharedTokenCounter {
    /// Create a new shared token counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate input tokens for routing
    pub fn estimate_input_tokens(&self, text: &str) -> u64 {
        self.inner.count_tokens(text)
    }
}
