use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use chatkeep_types::api::Claims;
use chatkeep_types::models::User;

/// The only algorithm tokens are signed with or accepted under.
pub const ALGORITHM: Algorithm = Algorithm::HS256;
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_ISSUER: &str = "chatkeep";

/// Immutable token configuration, built once at startup.
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub validity: Duration,
    /// Factor applied to `validity` when computing `exp`.
    pub expiry_multiplier: u32,
    pub issuer: String,
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            validity: DEFAULT_VALIDITY,
            expiry_multiplier: 1,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("validity", &self.validity)
            .field("expiry_multiplier", &self.expiry_multiplier)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("signing secret is not configured")]
    MissingSecret,

    #[error("token lifetime is zero or out of range")]
    InvalidLifetime,

    #[error("token is malformed")]
    Malformed,

    #[error("token uses an unexpected signing algorithm")]
    UnexpectedAlgorithm,

    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("token was issued by someone else")]
    InvalidIssuer,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Issues and validates HS256 bearer tokens. Holds only immutable key
/// material, so one instance is shared by every request.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: TimeDelta,
    issuer: String,
}

impl TokenService {
    pub fn new(settings: &TokenSettings) -> Result<Self, TokenError> {
        if settings.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let multiplier =
            i32::try_from(settings.expiry_multiplier).map_err(|_| TokenError::InvalidLifetime)?;
        let lifetime = TimeDelta::from_std(settings.validity)
            .ok()
            .and_then(|validity| validity.checked_mul(multiplier))
            .filter(|lifetime| *lifetime > TimeDelta::zero())
            .ok_or(TokenError::InvalidLifetime)?;

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&settings.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            lifetime,
            issuer: settings.issuer.clone(),
        })
    }

    /// Effective token lifetime (validity times multiplier).
    pub fn lifetime(&self) -> TimeDelta {
        self.lifetime
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let expires_at = now
            .checked_add_signed(self.lifetime)
            .ok_or(TokenError::InvalidLifetime)?;

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::MissingAlgorithm => TokenError::UnexpectedAlgorithm,
                ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
                _ => TokenError::Malformed,
            })
    }
}
