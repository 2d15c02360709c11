use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};
use std::sync::Arc;
use tokio::sync::watch;
use utoipa::ToSchema;

/// Env var holding the identity provider's token signing secret.
pub const JWT_SECRET_ENV: &str = "SUPABASE_JWT_SECRET";
const AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: UserMetadata,
}

impl CurrentUser {
    /// Email local part, else the metadata full name, else empty.
    pub fn display_name(&self) -> String {
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.metadata.full_name.clone().filter(|n| !n.is_empty()))
            .unwrap_or_default()
    }
}

/// Identity provider boundary: current user plus change notifications.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
    fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>>;
}

/// In-process auth state fed by login/logout callbacks.
#[derive(Clone)]
pub struct AuthState {
    tx: Arc<watch::Sender<Option<CurrentUser>>>,
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn sign_in(&self, user: CurrentUser) {
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for AuthState {
    fn current_user(&self) -> Option<CurrentUser> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.tx.subscribe()
    }
}

/// Who is acting, passed explicitly into every data-layer call.
#[derive(Debug, Clone, Default)]
pub struct IdentityContext {
    pub user: Option<CurrentUser>,
    /// Forwarded to the remote store so row-level policies see the user.
    pub access_token: Option<String>,
}

impl IdentityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: CurrentUser, access_token: Option<String>) -> Self {
        Self { user: Some(user), access_token }
    }

    pub fn from_provider(provider: &dyn IdentityProvider) -> Self {
        Self { user: provider.current_user(), access_token: None }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl From<Claims> for CurrentUser {
    fn from(c: Claims) -> Self {
        CurrentUser { id: c.sub, email: c.email, metadata: c.user_metadata }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("SUPABASE_JWT_SECRET not set")]
    MissingSecret,
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

fn secret() -> Result<String, TokenError> {
    env::var(JWT_SECRET_ENV).map_err(|_| TokenError::MissingSecret)
}

/// Validate an access token and return its claims.
pub fn decode_access_token(token: &str) -> Result<Claims, TokenError> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_audience(&[AUDIENCE]);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

/// Issue a provider-compatible access token (local development and tests).
pub fn create_access_token(user: &CurrentUser) -> Result<String, TokenError> {
    let secret = secret()?;
    let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize;
    let claims = Claims {
        sub: user.id.clone(),
        exp,
        aud: Some(AUDIENCE.to_string()),
        email: user.email.clone(),
        user_metadata: user.metadata.clone(),
    };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

/// Extractor yielding the verified user and the raw bearer token.
pub struct Auth {
    pub user: CurrentUser,
    pub token: String,
}

impl Auth {
    pub fn into_context(self) -> IdentityContext {
        IdentityContext::signed_in(self.user, Some(self.token))
    }
}

/// Context for handlers that accept both signed-in and anonymous callers.
pub fn context_of(auth: Option<Auth>) -> IdentityContext {
    auth.map(Auth::into_context).unwrap_or_default()
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return match decode_access_token(bearer.token()) {
                Ok(claims) => ready(Ok(Auth { user: claims.into(), token: bearer.token().to_string() })),
                Err(e) => {
                    tracing::debug!(error = %e, "rejected bearer token");
                    ready(Err(actix_web::error::ErrorUnauthorized("Invalid access token")))
                }
            };
        }
        ready(Err(actix_web::error::ErrorUnauthorized("Authorization required")))
    }
}
