use crate::application_port::DEFAULT_TOKEN_ID_LENGTH;
use crate::domain_model::TokenId;
use chrono::Utc;
use nanoid::nanoid;
use tracing::warn;

/// Mints URL-safe random token ids.
///
/// At 12 characters and ~1000 ids per hour, a 1% chance of one collision
/// takes on the order of a thousand years.
#[derive(Debug, Clone, Copy)]
pub struct TokenIdGenerator {
    length: usize,
}

impl TokenIdGenerator {
    pub fn new(length: usize) -> Self {
        let length = if length == 0 {
            DEFAULT_TOKEN_ID_LENGTH
        } else {
            length
        };
        TokenIdGenerator { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn generate(&self) -> TokenId {
        let length = self.length;
        // nanoid panics when the OS random source fails. The fallback relies on
        // unwinding: under `panic = "abort"` the process still dies, and the
        // panic hook still prints its message before we get here.
        match std::panic::catch_unwind(|| nanoid!(length)) {
            Ok(id) => TokenId(id),
            Err(_) => {
                warn!("random source unavailable, falling back to timestamp token id");
                TokenId(timestamp_id())
            }
        }
    }
}

impl Default for TokenIdGenerator {
    fn default() -> Self {
        TokenIdGenerator::new(DEFAULT_TOKEN_ID_LENGTH)
    }
}

fn timestamp_id() -> String {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros())
        .to_string()
}
