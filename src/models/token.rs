use serde::{Deserialize, Serialize};

use super::identity::UserIdentity;

/// Claims embedded in the signed access-token JWS. Field names follow §3's
/// required claim set; profile fields are non-sensitive and only present
/// when the IdP supplied them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Minimal record written under `oauth:token:{jti}`. Its mere presence (not
/// its content) is what `/verify` and `/introspect` consult; deleting it is
/// how revocation takes effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub client_id: String,
    pub sub: String,
    pub scope: String,
    pub exp: i64,
}

/// Stored under `oauth:refresh:{token}`. Carries the resolved identity so a
/// rotation can remint an access token without a fresh round trip to the IdP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub client_id: String,
    pub identity: UserIdentity,
    pub scope: String,
    pub exp: i64,
}
