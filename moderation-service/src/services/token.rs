use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::models::User;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Issues and verifies HS256 session tokens.
///
/// The signing secret is optional at construction; a missing or empty secret
/// surfaces as a configuration error on every issue/verify call.
#[derive(Clone)]
pub struct TokenService {
    secret: Option<SecretString>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: Option<SecretString>, ttl: Duration) -> Self {
        let secret = secret.filter(|s| !s.expose_secret().is_empty());
        if secret.is_none() {
            tracing::warn!("JWT secret is not configured; token issue and verify will fail");
        }
        Self { secret, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn secret(&self) -> Result<&[u8], ServiceError> {
        self.secret
            .as_ref()
            .map(|s| s.expose_secret().as_bytes())
            .ok_or_else(|| ServiceError::Config("JWT secret is not configured".to_string()))
    }

    /// Sign a token for `user`. `role` is the name of the user's
    /// first-assigned role, if any.
    pub fn issue(
        &self,
        user: &User,
        role: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, ServiceError> {
        let secret = self.secret()?;

        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: role.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))?;

        Ok(IssuedToken { token, claims })
    }

    /// Check signature, algorithm and expiry against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, ServiceError> {
        let secret = self.secret()?;

        // Expiry is checked below against the caller's clock, without leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                ServiceError::Unauthorized("invalid token".to_string())
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(ServiceError::Unauthorized("token expired".to_string()));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn service() -> TokenService {
        TokenService::new(
            Some(SecretString::new("test-secret".to_string())),
            Duration::hours(24),
        )
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
            name: "Alice".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            created_at: now,
            updated_at: now,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn verify_returns_issued_claims_within_lifetime() {
        let svc = service();
        let now = at(1_700_000_000);
        let issued = svc.issue(&user(), Some("user"), now).unwrap();

        let claims = svc.verify(&issued.token, now + Duration::seconds(1)).unwrap();
        assert_eq!(claims, issued.claims);
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.role.as_deref(), Some("user"));
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, now.timestamp() + 24 * 3600);
    }

    #[test]
    fn token_is_rejected_after_expiry() {
        let svc = service();
        let now = at(1_700_000_000);
        let issued = svc.issue(&user(), None, now).unwrap();

        let err = svc
            .verify(&issued.token, now + Duration::hours(24) + Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = svc.verify(&issued.token, now + Duration::hours(24)).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn role_is_omitted_when_user_has_none() {
        let svc = service();
        let issued = svc.issue(&user(), None, at(1_700_000_000)).unwrap();

        let json = serde_json::to_value(&issued.claims).unwrap();
        assert!(json.get("role").is_none());
        assert_eq!(json["iat"], 1_700_000_000);

        let claims = svc.verify(&issued.token, at(1_700_000_001)).unwrap();
        assert_eq!(claims.role, None);
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let issued = service().issue(&user(), None, at(1_700_000_000)).unwrap();
        let other = TokenService::new(
            Some(SecretString::new("other-secret".to_string())),
            Duration::hours(24),
        );
        let err = other.verify(&issued.token, at(1_700_000_001)).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn malformed_token_is_unauthorized() {
        let err = service().verify("not-a-token", at(1_700_000_000)).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn non_numeric_user_id_is_unauthorized() {
        #[derive(Serialize)]
        struct Foreign {
            user_id: String,
            username: String,
            email: String,
            name: String,
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Foreign {
                user_id: "42".to_string(),
                username: "alice".to_string(),
                email: "a@x.com".to_string(),
                name: "Alice".to_string(),
                exp: 1_800_000_000,
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = service().verify(&token, at(1_700_000_000)).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let claims = Claims {
            user_id: 42,
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            name: "Alice".to_string(),
            role: None,
            iat: 1_700_000_000,
            exp: 1_800_000_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = service().verify(&token, at(1_700_000_000)).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let svc = TokenService::new(None, Duration::hours(24));
        assert!(matches!(
            svc.issue(&user(), None, at(1_700_000_000)).unwrap_err(),
            ServiceError::Config(_)
        ));
        assert!(matches!(
            svc.verify("a.b.c", at(1_700_000_000)).unwrap_err(),
            ServiceError::Config(_)
        ));

        let empty = TokenService::new(Some(SecretString::new(String::new())), Duration::hours(24));
        assert!(matches!(
            empty.verify("a.b.c", at(1_700_000_000)).unwrap_err(),
            ServiceError::Config(_)
        ));
    }
}
