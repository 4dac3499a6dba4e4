use crate::application_port::*;
use crate::domain_model::*;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// The only algorithm access tokens may be signed with.
pub const PINNED_ALGORITHM: Algorithm = Algorithm::HS512;
const PINNED_ALGORITHM_NAME: &str = "HS512";

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct JwtConfig {
    pub access_ttl: Duration,
    pub signing_key: Vec<u8>,
}

impl JwtConfig {
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        JwtConfig {
            access_ttl: DEFAULT_ACCESS_TTL,
            signing_key: signing_key.into(),
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_ttl", &self.access_ttl)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Reads the `alg` header field without trusting anything else in the token.
fn header_algorithm(token: &str) -> Result<String, AuthError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| AuthError::InvalidToken)?;
    let raw: RawHeader = serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)?;
    Ok(raw.alg)
}

fn encode_access(
    uid: &UserId,
    jti: &str,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.access_ttl;
    let claims = AccessClaims {
        sub: uid.clone(),
        jti: jti.to_owned(),
        iat: iat_dt.timestamp(),
        exp: exp_dt.timestamp(),
    };
    let token = encode(
        &Header::new(PINNED_ALGORITHM),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn decode_access(token: &str, cfg: &JwtConfig, check_exp: bool) -> Result<AccessClaims, AuthError> {
    if header_algorithm(token)? != PINNED_ALGORITHM_NAME {
        return Err(AuthError::UnexpectedHashMethod);
    }

    let mut v = Validation::new(PINNED_ALGORITHM);
    v.validate_exp = check_exp;
    v.leeway = 0;
    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&cfg.signing_key), &v)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidAlgorithm => AuthError::UnexpectedHashMethod,
            _ => AuthError::InvalidToken,
        })?;

    if data.claims.jti.is_empty() || data.claims.sub.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(data.claims)
}

pub struct JwtHs512Codec {
    cfg: JwtConfig,
}

impl JwtHs512Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs512Codec { cfg }
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs512Codec {
    async fn issue_access_token(
        &self,
        user: &UserId,
        jti: &str,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let (token, exp_dt) = encode_access(user, jti, &self.cfg)?;
        Ok((AccessToken(token), exp_dt))
    }

    async fn verify_access_token(&self, token: &AccessToken) -> Result<AccessClaims, AuthError> {
        decode_access(&token.0, &self.cfg, true)
    }

    async fn verify_access_token_signature(
        &self,
        token: &AccessToken,
    ) -> Result<AccessClaims, AuthError> {
        decode_access(&token.0, &self.cfg, false)
    }
}
