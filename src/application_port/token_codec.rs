use crate::application_port::TokenError;
use crate::domain_model::TokenId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub token_id: TokenId,
    pub subject: Option<String>,
}

/// Signs and verifies the stateless wire credential.
pub trait TokenCodec: Send + Sync {
    /// Same inputs always produce the same token, so stores can re-derive keys from ids.
    fn encode(&self, token_id: &TokenId, subject: Option<&str>) -> Result<String, TokenError>;
    fn decode(&self, token: &str) -> Result<DecodedToken, TokenError>;
}
