use anyhow::{Context, Result};
use contracts::system::auth::TokenClaims;
use jsonwebtoken::{decode, DecodingKey, Validation};
use once_cell::sync::Lazy;
use rand::Rng;

use crate::shared::config::get_config;

// Accounts live in another service; this backend only validates its tokens.

static GENERATED_SECRET: Lazy<String> = Lazy::new(|| {
    tracing::warn!("auth.jwt_secret is empty, using a per-process secret; issued tokens will not survive a restart");
    generate_jwt_secret()
});

/// Generate a cryptographically secure JWT secret (256 bits)
fn generate_jwt_secret() -> String {
    use base64::{engine::general_purpose, Engine as _};
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen::<u8>()).collect();
    general_purpose::STANDARD.encode(&random_bytes)
}

/// Configured secret, or a generated one for this process
pub fn get_jwt_secret() -> &'static str {
    let configured = get_config().auth.jwt_secret.as_str();
    if configured.is_empty() {
        GENERATED_SECRET.as_str()
    } else {
        configured
    }
}

/// Validate JWT token and extract claims
pub fn validate_token(token: &str) -> Result<TokenClaims> {
    let token_data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(get_jwt_secret().as_bytes()),
        &Validation::default(),
    )
    .context("Failed to decode JWT token")?;

    Ok(token_data.claims)
}

/// Issue an access token the way the account service does, 24 hours lifetime
#[cfg(test)]
pub fn generate_access_token(user_id: &str, username: &str, is_admin: bool) -> Result<String> {
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = Utc::now();
    let exp = (now + chrono::Duration::hours(24)).timestamp() as usize;
    let iat = now.timestamp() as usize;

    let claims = TokenClaims {
        sub: user_id.to_string(),
        username: username.to_string(),
        is_admin,
        exp,
        iat,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(get_jwt_secret().as_bytes()),
    )
    .context("Failed to encode JWT token")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_validates() {
        let token = generate_access_token("42", "manager", true).unwrap();
        let claims = validate_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "manager");
        assert!(claims.is_admin);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let token = generate_access_token("42", "clerk", false).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(validate_token(&tampered).is_err());
        assert!(validate_token("not.a.jwt").is_err());
    }
}
