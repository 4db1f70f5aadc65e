//! Axum integration utilities.
//!
//! [`ActorLayer`] resolves the request's credentials into an [`Actor`] and
//! stores it in the request extensions. Handlers take the actor as an
//! extractor, run the engine, and answer every deny with [`forbidden`].

use std::convert::Infallible;
use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::actor::Actor;

use ::axum::body::Body;
use ::axum::extract::FromRequestParts;
use ::axum::response::{IntoResponse, Response};
use ::http::request::Parts;
use ::http::{HeaderMap, Request, StatusCode};
use ::tower::{Layer, Service};

/// Resolves request headers into an actor.
///
/// Implementations must be total: credentials that cannot be verified
/// resolve to [`Actor::anonymous`].
pub trait RequestActorResolver: Send + Sync + 'static {
    /// Resolves the actor for a request.
    fn resolve(&self, headers: &HeaderMap) -> Actor;
}

impl<R> RequestActorResolver for Arc<R>
where
    R: RequestActorResolver + ?Sized,
{
    fn resolve(&self, headers: &HeaderMap) -> Actor {
        (**self).resolve(headers)
    }
}

/// The single response for every denied request. The deny reason is never
/// exposed to the caller.
pub fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

/// Middleware layer that attaches the resolved [`Actor`] to each request.
pub struct ActorLayer<R> {
    resolver: Arc<R>,
}

impl<R> ActorLayer<R> {
    /// Creates a new actor layer.
    pub fn new(resolver: R) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl<R> Clone for ActorLayer<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
        }
    }
}

impl<R> fmt::Debug for ActorLayer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorLayer").finish_non_exhaustive()
    }
}

impl<Inner, R> Layer<Inner> for ActorLayer<R>
where
    R: RequestActorResolver,
{
    type Service = ActorService<Inner, R>;

    fn layer(&self, inner: Inner) -> Self::Service {
        ActorService {
            inner,
            resolver: self.resolver.clone(),
        }
    }
}

/// Middleware service that resolves the request actor.
///
/// Never rejects: unusable credentials produce an anonymous actor and the
/// policy engine decides what that actor may do.
pub struct ActorService<Inner, R> {
    inner: Inner,
    resolver: Arc<R>,
}

impl<Inner: Clone, R> Clone for ActorService<Inner, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<Inner: fmt::Debug, R> fmt::Debug for ActorService<Inner, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<Inner, R> Service<Request<Body>> for ActorService<Inner, R>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    R: RequestActorResolver,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let actor = self.resolver.resolve(req.headers());
        req.extensions_mut().insert(actor);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            poll_fn(|cx| inner.poll_ready(cx)).await?;
            inner.call(req).await
        })
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Actor>()
            .cloned()
            .unwrap_or_else(Actor::anonymous))
    }
}

#[cfg(feature = "axum-jwt")]
impl RequestActorResolver for crate::jwt::JwtActorResolver {
    fn resolve(&self, headers: &HeaderMap) -> Actor {
        let header = headers
            .get(::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        self.resolve_bearer(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::types::ActorId;
    use ::axum::Router;
    use ::axum::body::to_bytes;
    use ::axum::routing::get;
    use ::tower::ServiceExt;

    /// Trusts an `x-test-user` header. Test only.
    struct HeaderResolver;

    impl RequestActorResolver for HeaderResolver {
        fn resolve(&self, headers: &HeaderMap) -> Actor {
            headers
                .get("x-test-user")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| ActorId::new(value).ok())
                .map(|id| Actor::authenticated(id, Role::Student))
                .unwrap_or_else(Actor::anonymous)
        }
    }

    async fn whoami(actor: Actor) -> Response {
        if actor.is_anonymous() {
            return forbidden();
        }
        actor.to_string().into_response()
    }

    async fn send(app: Router, user: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri("/");
        if let Some(user) = user {
            request = request.header("x-test-user", user);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn layer_attaches_resolved_actor() {
        let app = Router::new()
            .route("/", get(whoami))
            .layer(ActorLayer::new(HeaderResolver));

        assert_eq!(
            send(app.clone(), Some("s1")).await,
            (StatusCode::OK, "s1".to_string())
        );
        assert_eq!(
            send(app, None).await,
            (StatusCode::FORBIDDEN, "forbidden".to_string())
        );
    }

    #[tokio::test]
    async fn extractor_without_layer_is_anonymous() {
        let app = Router::new().route("/", get(whoami));
        let (status, _) = send(app, Some("s1")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
