//! Bearer token verification for the actor resolver.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::actor::{Actor, ActorResolver, Claims};

const BEARER_PREFIX: &str = "Bearer ";

/// Verifies ID tokens and resolves them into actors.
///
/// Resolution never fails: a missing, malformed, expired or forged token
/// yields [`Actor::anonymous`].
#[derive(Clone)]
pub struct JwtActorResolver {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
    resolver: ActorResolver,
}

impl fmt::Debug for JwtActorResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtActorResolver")
            .field("decoding_key", &"<redacted>")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtActorResolver {
    /// Creates a resolver with explicit decoding settings.
    pub fn new(decoding_key: DecodingKey, validation: Validation) -> Self {
        Self {
            decoding_key: Arc::new(decoding_key),
            validation,
            resolver: ActorResolver::new(),
        }
    }

    /// Creates an HS256 resolver from a shared secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::new(
            DecodingKey::from_secret(secret),
            Validation::new(Algorithm::HS256),
        )
    }

    /// Verifies a token and returns its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }

    /// Resolves a raw token.
    pub fn resolve_token(&self, token: &str) -> Actor {
        match self.verify(token) {
            Ok(claims) => self.resolver.resolve(Some(&claims)),
            Err(err) => {
                tracing::debug!(error = %err, "token rejected, resolving anonymous actor");
                Actor::anonymous()
            }
        }
    }

    /// Resolves an `Authorization` header value of the form `Bearer <token>`.
    pub fn resolve_bearer(&self, header: Option<&str>) -> Actor {
        match header.and_then(|value| value.strip_prefix(BEARER_PREFIX)) {
            Some(token) if !token.is_empty() => self.resolve_token(token),
            _ => Actor::anonymous(),
        }
    }
}
