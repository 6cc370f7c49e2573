//! HS256 bearer-token validation for end users and link visitors.
//!
//! Tokens are issued by the web session layer; this service only verifies
//! them. [`generate_token`] exists for tooling and tests.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use parcel_core::error::CoreError;
use parcel_core::job::Actor;
use serde::{Deserialize, Serialize};

pub const ACTOR_KIND_USER: &str = "user";
pub const ACTOR_KIND_VISITOR: &str = "visitor";

/// JWT claims carried by every bearer token.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User id for users; viewer id for visitors.
    pub sub: String,
    pub team_id: String,
    /// `"user"` or `"visitor"`.
    pub actor_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
}

impl Claims {
    /// The job-ownership identity these claims describe.
    pub fn actor(&self) -> Result<Actor, CoreError> {
        match self.actor_kind.as_str() {
            ACTOR_KIND_USER => Ok(Actor::User {
                user_id: self.sub.clone(),
            }),
            ACTOR_KIND_VISITOR => match (&self.link_id, &self.email) {
                (Some(link_id), Some(email)) if !link_id.is_empty() && !email.is_empty() => {
                    Ok(Actor::Visitor {
                        link_id: link_id.clone(),
                        viewer_email: email.clone(),
                    })
                }
                _ => Err(CoreError::Unauthorized(
                    "Visitor token missing link or email".into(),
                )),
            },
            _ => Err(CoreError::Unauthorized("Unknown actor kind".into())),
        }
    }
}

/// Configuration for JWT validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret shared with the token issuer.
    pub secret: String,
    /// Lifetime of tokens minted by [`generate_token`] (default: 60).
    pub token_expiry_mins: i64,
}

const DEFAULT_TOKEN_EXPIRY_MINS: i64 = 60;

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var                 | Required | Default |
    /// |-------------------------|----------|---------|
    /// | `JWT_SECRET`            | **yes**  | --      |
    /// | `JWT_TOKEN_EXPIRY_MINS` | no       | `60`    |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let token_expiry_mins: i64 = std::env::var("JWT_TOKEN_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_TOKEN_EXPIRY_MINS.to_string())
            .parse()
            .expect("JWT_TOKEN_EXPIRY_MINS must be a valid i64");

        Self {
            secret,
            token_expiry_mins,
        }
    }
}

/// Sign an HS256 token for `actor` in `team_id`.
pub fn generate_token(
    actor: &Actor,
    team_id: &str,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let (sub, actor_kind, link_id, email) = match actor {
        Actor::User { user_id } => (user_id.clone(), ACTOR_KIND_USER, None, None),
        Actor::Visitor {
            link_id,
            viewer_email,
        } => (
            viewer_email.clone(),
            ACTOR_KIND_VISITOR,
            Some(link_id.clone()),
            Some(viewer_email.clone()),
        ),
    };

    let claims = Claims {
        sub,
        team_id: team_id.to_string(),
        actor_kind: actor_kind.to_string(),
        link_id,
        email,
        exp: now + config.token_expiry_mins * 60,
        iat: now,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate and decode a token, returning the embedded [`Claims`].
pub fn validate_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(), // HS256, validates exp
    )?;
    Ok(token_data.claims)
}
