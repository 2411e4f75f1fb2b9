use crate::application_port::{DEFAULT_SECRET_KEY, DecodedToken, TokenCodec, TokenConfig, TokenError};
use crate::domain_model::TokenId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CredentialClaims {
    jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
}

/// HS256 credential carrying the token id and, optionally, a subject.
///
/// No `exp` is embedded: expiry lives server-side, so the token string for a
/// given id is stable and can be re-derived by the stores.
pub struct JwtHs256Codec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtHs256Codec {
    pub fn new(secret_key: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        JwtHs256Codec {
            encoding_key: EncodingKey::from_secret(secret_key),
            decoding_key: DecodingKey::from_secret(secret_key),
            validation,
        }
    }

    /// Builds the codec from the configured secret, falling back to
    /// [`DEFAULT_SECRET_KEY`] when none is set.
    pub fn from_config(config: &TokenConfig) -> Self {
        if config.secret_key.is_empty() || config.secret_key == DEFAULT_SECRET_KEY.as_bytes() {
            warn!("no signing secret configured, using the built-in default key; set token.secret_key");
            return JwtHs256Codec::new(DEFAULT_SECRET_KEY.as_bytes());
        }
        JwtHs256Codec::new(&config.secret_key)
    }
}

impl TokenCodec for JwtHs256Codec {
    fn encode(&self, token_id: &TokenId, subject: Option<&str>) -> Result<String, TokenError> {
        let claims = CredentialClaims {
            jti: token_id.0.clone(),
            sub: subject.map(str::to_owned),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            error!(token_id = %token_id, error = %e, "token encode failed");
            TokenError::TokenEncode
        })
    }

    fn decode(&self, token: &str) -> Result<DecodedToken, TokenError> {
        if token.is_empty() {
            return Err(TokenError::TokenEmpty);
        }
        let data = decode::<CredentialClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        TokenError::TokenInvalid
                    }
                    _ => TokenError::TokenDecode,
                };
                error!(error = %e, "token decode failed");
                err
            })?;

        if data.claims.jti.is_empty() {
            return Err(TokenError::TokenDecode);
        }
        Ok(DecodedToken {
            token_id: TokenId(data.claims.jti),
            subject: data.claims.sub,
        })
    }
}
