use serde::{Deserialize, Serialize};

/// Claims of a back-office bearer JWT. Tokens are issued by the account
/// system; this service only validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String, // user_id
    pub username: String,
    /// Admins may edit or delete confirmed entries and manage access tokens
    pub is_admin: bool,
    pub exp: usize,
    pub iat: usize,
}
