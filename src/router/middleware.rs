//! Handlers, middleware composition, and the reference middlewares:
//! request logging, CORS, content-type gate, and firewall.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::{BoxFuture, FutureExt};
use regex::Regex;
use thiserror::Error;
use tower::{service_fn, Layer, ServiceExt};
use tower_http::cors::CorsLayer;

/// A boxed request handler; clones share the same function.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Handler(Arc::new(move |req| f(req).boxed()))
    }

    pub async fn call(&self, req: Request) -> Response {
        (self.0)(req).await
    }
}

/// Transforms a handler into one that wraps it. The router applies
/// middlewares so that the first registered is the outermost.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Handler) -> Handler + Send + Sync>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Middleware(Arc::new(f))
    }

    /// Middleware from an async function receiving the request and the inner handler.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Handler) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::new(move |inner| {
            let f = f.clone();
            Handler::new(move |req| f(req, inner.clone()))
        })
    }

    pub fn wrap(&self, inner: Handler) -> Handler {
        (self.0)(inner)
    }
}

/// Logs method, path, status and elapsed time of every request. Never short-circuits.
pub fn logging() -> Middleware {
    Middleware::from_fn(|req: Request, next: Handler| async move {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();
        let res = next.call(req).await;
        tracing::info!(
            %method,
            %path,
            status = res.status().as_u16(),
            elapsed = ?start.elapsed(),
            "request"
        );
        res
    })
}

/// Runs `layer` around the inner handler. Preflight requests are answered
/// here and never reach the middlewares registered after this one.
pub fn cors(layer: CorsLayer) -> Middleware {
    Middleware::new(move |inner: Handler| {
        let service = layer.layer(service_fn(move |req: Request| {
            let inner = inner.clone();
            async move { Ok::<_, Infallible>(inner.call(req).await) }
        }));
        Handler::new(move |req| {
            let service = service.clone();
            async move {
                match service.oneshot(req).await {
                    Ok(res) => res,
                    Err(never) => match never {},
                }
            }
        })
    })
}

/// Forwards only requests whose `Content-Type` equals one of `accepted`;
/// everything else, a missing header included, gets 415.
pub fn content_type<I, T>(accepted: I) -> Middleware
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let accepted: Arc<[String]> = accepted.into_iter().map(Into::into).collect();
    Middleware::from_fn(move |req: Request, next: Handler| {
        let accepted = accepted.clone();
        async move {
            let given = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            match given {
                Some(given) if accepted.iter().any(|a| a == given) => next.call(req).await,
                _ => {
                    tracing::debug!(content_type = ?given, "unsupported media type");
                    StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response()
                }
            }
        }
    })
}

/// Predicate deciding whether a request is authorized.
pub type Guard = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

#[derive(Error, Debug)]
pub enum MiddlewareError {
    #[error("invalid firewall pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Firewall settings. With `only` set, a path matching one of its patterns
/// must be authorized by the guard and other paths pass. Otherwise, with
/// `except` set, a request passes only if some `except` pattern does not
/// match its path and the guard authorizes it. With neither, all pass.
#[derive(Clone)]
pub struct FirewallConfig {
    pub only: Vec<String>,
    pub except: Vec<String>,
    pub guard: Guard,
}

impl FirewallConfig {
    pub fn new<G>(guard: G) -> Self
    where
        G: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        FirewallConfig {
            only: Vec::new(),
            except: Vec::new(),
            guard: Arc::new(guard),
        }
    }

    pub fn only<I, T>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.only = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn except<I, T>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.except = patterns.into_iter().map(Into::into).collect();
        self
    }
}

struct Firewall {
    only: Vec<Regex>,
    except: Vec<Regex>,
    guard: Guard,
}

impl Firewall {
    fn authorize(&self, req: &Request) -> bool {
        let path = req.uri().path();
        if !self.only.is_empty() {
            if self.only.iter().any(|p| p.is_match(path)) {
                return (self.guard)(req);
            }
            return true;
        }
        if !self.except.is_empty() {
            return self.except.iter().any(|p| !p.is_match(path)) && (self.guard)(req);
        }
        true
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, MiddlewareError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| MiddlewareError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Responds 401 without forwarding when the configured policy rejects the request.
pub fn firewall(config: FirewallConfig) -> Result<Middleware, MiddlewareError> {
    let firewall = Arc::new(Firewall {
        only: compile(&config.only)?,
        except: compile(&config.except)?,
        guard: config.guard,
    });
    Ok(Middleware::from_fn(move |req: Request, next: Handler| {
        let firewall = firewall.clone();
        async move {
            if firewall.authorize(&req) {
                next.call(req).await
            } else {
                tracing::debug!(path = %req.uri().path(), "request rejected by firewall");
                StatusCode::UNAUTHORIZED.into_response()
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler() -> (Handler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler = Handler::new(move |_req| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK.into_response()
            }
        });
        (handler, calls)
    }

    fn request(path: &str, content_type: Option<&str>, authorized: bool) -> Request {
        let mut builder = Request::builder().uri(path);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        if authorized {
            builder = builder.header(header::AUTHORIZATION, "yes");
        }
        builder.body(Body::empty()).unwrap()
    }

    fn has_auth(req: &Request) -> bool {
        req.headers().contains_key(header::AUTHORIZATION)
    }

    #[tokio::test]
    async fn content_type_gate_forwards_exact_matches_only() {
        let (inner, calls) = counting_handler();
        let gate = content_type(["application/vnd.api+json", "application/vnd.api+json; charset=UTF-8"]).wrap(inner);

        let res = gate.call(request("/", Some("application/vnd.api+json; charset=UTF-8"), false)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        for ct in [Some("application/json"), Some("application/vnd.api+json;charset=UTF-8"), None] {
            let res = gate.call(request("/", ct, false)).await;
            assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn firewall_only_guards_matching_paths() {
        let (inner, calls) = counting_handler();
        let fw = firewall(FirewallConfig::new(has_auth).only(["^/shows"])).unwrap().wrap(inner);

        assert_eq!(fw.call(request("/shows", None, false)).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fw.call(request("/shows", None, true)).await.status(), StatusCode::OK);
        assert_eq!(fw.call(request("/other", None, false)).await.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn firewall_except_needs_an_unmatched_pattern_and_the_guard() {
        let (inner, calls) = counting_handler();
        let fw = firewall(FirewallConfig::new(has_auth).except(["^/public"])).unwrap().wrap(inner);

        assert_eq!(fw.call(request("/public/info", None, true)).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(fw.call(request("/shows", None, false)).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fw.call(request("/shows", None, true)).await.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn firewall_except_consults_guard_when_another_pattern_misses() {
        let (inner, _) = counting_handler();
        let fw = firewall(FirewallConfig::new(has_auth).except(["^/a", "^/b"])).unwrap().wrap(inner);
        assert_eq!(fw.call(request("/a", None, false)).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(fw.call(request("/a", None, true)).await.status(), StatusCode::OK);

        let (inner, _) = counting_handler();
        let deny = firewall(FirewallConfig::new(|_: &Request| false).except(["^/public"]))
            .unwrap()
            .wrap(inner);
        assert_eq!(deny.call(request("/public/info", None, false)).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn firewall_without_lists_allows_everything() {
        let (inner, _) = counting_handler();
        let fw = firewall(FirewallConfig::new(|_: &Request| false)).unwrap().wrap(inner);
        assert_eq!(fw.call(request("/shows", None, false)).await.status(), StatusCode::OK);
    }

    #[test]
    fn firewall_rejects_bad_patterns() {
        let err = firewall(FirewallConfig::new(has_auth).only(["("])).err().unwrap();
        assert!(matches!(err, MiddlewareError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn cors_answers_preflight_without_forwarding() {
        use axum::http::Method;
        use tower_http::cors::Any;

        let (inner, calls) = counting_handler();
        let layer = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET, Method::POST]);
        let handler = cors(layer).wrap(content_type(["application/vnd.api+json"]).wrap(inner));

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/shows")
            .header(header::ORIGIN, "https://example.org")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let res = handler.call(preflight).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let simple = Request::builder()
            .uri("/shows")
            .header(header::ORIGIN, "https://example.org")
            .header(header::CONTENT_TYPE, "application/vnd.api+json")
            .body(Body::empty())
            .unwrap();
        let res = handler.call(simple).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn logging_always_forwards() {
        let (inner, calls) = counting_handler();
        let logged = logging().wrap(inner);
        assert_eq!(logged.call(request("/anything", None, false)).await.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
