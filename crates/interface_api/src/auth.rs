//! Authentication
//!
//! Bearer tokens are HS256 JWTs carrying the caller's identity. Verifying a
//! token yields a [`VerifiedIdentity`] only; the processor assignment set is
//! never read from the token and is fetched live when the access context is
//! established.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use core_kernel::{OrganizationId, PatientId, ProviderId, UserId};
use domain_tenancy::{AccessError, CredentialVerifier, Role, VerifiedIdentity};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: UserId,
    /// Organization the user belongs to
    pub org: OrganizationId,
    /// Role name, e.g. `claims_processor`
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    pub fn into_identity(self) -> Result<VerifiedIdentity, AccessError> {
        let role: Role = self.role.parse()?;
        Ok(VerifiedIdentity {
            user_id: self.sub,
            organization_id: self.org,
            role,
            provider_id: self.provider_id,
            patient_id: self.patient_id,
        })
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token could not be signed")]
    Signing,
}

impl From<AuthError> for AccessError {
    fn from(err: AuthError) -> Self {
        AccessError::unauthorized(err.to_string())
    }
}

/// Creates a signed token for an identity
pub fn create_token(
    identity: &VerifiedIdentity,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let lifetime = i64::try_from(expiration_secs).unwrap_or(i64::MAX / 1_000);
    let exp = now + Duration::seconds(lifetime);

    let claims = Claims {
        sub: identity.user_id,
        org: identity.organization_id,
        role: identity.role.as_str().to_string(),
        provider_id: identity.provider_id,
        patient_id: identity.patient_id,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::Signing)
}

/// Validates a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode_with(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
}

fn decode_with(token: &str, key: &DecodingKey, validation: &Validation) -> Result<Claims, AuthError> {
    decode::<Claims>(token, key, validation)
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
}

/// [`CredentialVerifier`] for HS256 bearer tokens
#[derive(Clone)]
pub struct JwtCredentialVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtCredentialVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl CredentialVerifier for JwtCredentialVerifier {
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, AccessError> {
        let claims = decode_with(credential, &self.key, &self.validation).map_err(|err| {
            debug!(error = %err, "credential rejected");
            AccessError::from(err)
        })?;
        claims.into_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn provider_identity() -> VerifiedIdentity {
        VerifiedIdentity {
            user_id: UserId::new(),
            organization_id: OrganizationId::new(),
            role: Role::Provider,
            provider_id: Some(ProviderId::new()),
            patient_id: None,
        }
    }

    #[test]
    fn test_verifier_accepts_issued_token() {
        let identity = provider_identity();
        let token = create_token(&identity, SECRET, 60).unwrap();

        let verified = JwtCredentialVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(verified, identity);
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = create_token(&provider_identity(), SECRET, 60).unwrap();
        let err = JwtCredentialVerifier::new("other-secret").verify(&token).unwrap_err();
        assert!(matches!(err, AccessError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token() {
        let identity = provider_identity();
        let claims = Claims {
            sub: identity.user_id,
            org: identity.organization_id,
            role: "provider".to_string(),
            provider_id: identity.provider_id,
            patient_id: None,
            exp: (Utc::now() - Duration::hours(1)).timestamp(),
            iat: (Utc::now() - Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(validate_token(&token, SECRET), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let identity = provider_identity();
        let claims = Claims {
            sub: identity.user_id,
            org: identity.organization_id,
            role: "superuser".to_string(),
            provider_id: None,
            patient_id: None,
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = JwtCredentialVerifier::new(SECRET).verify(&token).unwrap_err();
        assert!(matches!(err, AccessError::UnknownRole(_)));
    }

    #[test]
    fn test_garbage_token() {
        assert!(matches!(validate_token("not.a.jwt", SECRET), Err(AuthError::InvalidToken)));
    }
}
