//! Handler and middleware types, plus the built-in middlewares.
//!
//! A [`Handler`] is a type-erased async function from [`Context`] to
//! [`Outcome`]. A [`Middleware`] is a function from handler to handler; the
//! registry composes a route's middleware stack around its handler at
//! registration time, so `wrap` calls made after a route was registered never
//! affect it.
//!
//! Middlewares may:
//!
//! - **Pass through** — invoke the inner handler unchanged.
//! - **Short-circuit** — return a reply or an error without invoking it,
//!   as [`cors`] does for preflight requests.
//! - **Decorate** — invoke the inner handler and rework its reply, as
//!   [`json`] and [`html`] do.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::time::Instant;

use crate::context::Context;
use crate::error::HttpError;
use crate::http::{Headers, Method, StatusCode};
use crate::reply::{Body, Outcome, Reply};

/// The boxed future every handler invocation yields.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// A type-erased, reference-counted request handler.
pub type Handler = Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync + 'static>;

/// A function from handler to handler. Stacks compose outermost-last: with
/// middlewares `[m1, m2]`, the effective handler is `m2(m1(h))`.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync + 'static>;

/// Conversion of plain async functions into a [`Handler`].
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Outcome>`, so
/// route registration accepts `async fn`s directly.
pub trait IntoHandler {
    fn into_handler(self) -> Handler;
}

impl<F, Fut> IntoHandler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn into_handler(self) -> Handler {
        Arc::new(move |ctx| Box::pin(self(ctx)))
    }
}

impl IntoHandler for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

/// Wraps a handler-to-handler closure as a [`Middleware`].
///
/// ```
/// use seam::middleware::{middleware, Handler};
///
/// let passthrough = middleware(|next: Handler| next);
/// ```
pub fn middleware(f: impl Fn(Handler) -> Handler + Send + Sync + 'static) -> Middleware {
    Arc::new(f)
}

/// Composes a middleware stack around a handler, first-registered innermost.
pub(crate) fn apply(stack: &[Middleware], handler: Handler) -> Handler {
    stack.iter().fold(handler, |inner, m| m(inner))
}

/// Forces `Content-Type: application/json` on every successful reply.
pub fn json() -> Middleware {
    content_type("application/json")
}

/// Forces `Content-Type: text/html` on every successful reply.
pub fn html() -> Middleware {
    content_type("text/html")
}

fn content_type(value: &'static str) -> Middleware {
    Arc::new(move |next: Handler| {
        Arc::new(move |ctx: Context| {
            let next = next.clone();
            Box::pin(async move {
                let reply = next(ctx).await?;
                Ok(replace_content_type(reply, value))
            })
        })
    })
}

fn replace_content_type(reply: Reply, value: &str) -> Reply {
    match reply {
        Reply::Body(body) => typed(body, 200, Headers::new(), value),
        Reply::WithStatus(body, code) => typed(body, code, Headers::new(), value),
        Reply::Full(body, code, headers) => typed(body, code, headers, value),
        Reply::Response(mut response) => {
            response.set_header("Content-Type", value);
            Reply::Response(response)
        }
    }
}

fn typed(body: Body, code: u16, mut headers: Headers, value: &str) -> Reply {
    headers.set("Content-Type", value);
    Reply::Full(body, code, headers)
}

/// Wide-open CORS: answers `OPTIONS` preflights directly with a 204 and adds
/// `Access-Control-Allow-Origin: *` to every other reply.
pub fn cors() -> Middleware {
    Arc::new(|next: Handler| {
        Arc::new(move |ctx: Context| {
            let next = next.clone();
            Box::pin(async move {
                if *ctx.request().method() == Method::Options {
                    let headers: Headers = [
                        ("Access-Control-Allow-Origin", "*"),
                        ("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS"),
                        ("Access-Control-Allow-Headers", "*"),
                    ]
                    .into_iter()
                    .collect();
                    return Ok(Reply::Full(Body::Empty, 204, headers));
                }
                let reply = next(ctx).await?;
                Ok(reply.with_header("Access-Control-Allow-Origin", "*"))
            })
        })
    })
}

/// Rejects requests whose form body lacks any of the named fields with a 400
/// before the handler runs.
pub fn require_form_fields(fields: &[&str]) -> Middleware {
    let fields: Arc<Vec<String>> = Arc::new(fields.iter().map(|f| (*f).to_owned()).collect());
    Arc::new(move |next: Handler| {
        let fields = fields.clone();
        Arc::new(move |ctx: Context| {
            let next = next.clone();
            let fields = fields.clone();
            Box::pin(async move {
                let form = ctx.request().form();
                for field in fields.iter() {
                    if !form.contains_key(field) {
                        return Err(HttpError::new(
                            StatusCode::BAD_REQUEST,
                            format!("missing form field '{field}'"),
                        ));
                    }
                }
                next(ctx).await
            })
        })
    })
}

/// Logs each request's method, path, outcome, and duration via [`tracing`].
pub fn logger() -> Middleware {
    Arc::new(|next: Handler| {
        Arc::new(move |ctx: Context| {
            let next = next.clone();
            Box::pin(async move {
                let start = Instant::now();
                let method = ctx.request().method().as_str().to_owned();
                let path = ctx.request().path().to_owned();

                let outcome = next(ctx).await;

                let duration = start.elapsed();
                match &outcome {
                    Ok(_) => tracing::info!("{} {} ({:?})", method, path, duration),
                    Err(err) => tracing::warn!(
                        "{} {} - {} {} ({:?})",
                        method,
                        path,
                        err.status().as_u16(),
                        err.message(),
                        duration
                    ),
                }
                outcome
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::env::Environment;
    use crate::http::Request;
    use crate::reply::reply;
    use crate::router::PathParams;
    use crate::session::{MemorySessionStore, SessionStore};

    fn ctx(request: Request) -> Context {
        let store = MemorySessionStore::new();
        Context::new(
            request,
            PathParams::new(),
            Arc::new(Environment::new()),
            false,
            store.create(),
            None,
        )
    }

    fn hello() -> Handler {
        (|_ctx: Context| async { reply("hello") }).into_handler()
    }

    #[tokio::test]
    async fn json_sets_content_type() {
        let handler = apply(&[json()], hello());
        let request = Request::builder(Method::Get, "/").build();
        let response = handler(ctx(request)).await.unwrap().into_response();
        assert_eq!(
            response.headers().get("content-type"),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn html_replaces_existing_content_type() {
        let typed = (|_ctx: Context| async {
            reply(Reply::body("x").with_header("Content-Type", "text/plain"))
        })
        .into_handler();
        let handler = apply(&[html()], typed);
        let request = Request::builder(Method::Get, "/").build();
        let response = handler(ctx(request)).await.unwrap().into_response();
        let all: Vec<_> = response.headers().get_all("content-type").collect();
        assert_eq!(all, vec!["text/html"]);
    }

    #[tokio::test]
    async fn composition_order_is_first_registered_innermost() {
        let tag = |name: &'static str| {
            middleware(move |next: Handler| {
                Arc::new(move |ctx: Context| {
                    let next = next.clone();
                    Box::pin(async move {
                        let reply = next(ctx).await?;
                        Ok(reply.map_body(|body| match body {
                            Body::Text(text) => Body::Text(format!("{text}<{name}>")),
                            other => other,
                        }))
                    })
                })
            })
        };

        let handler = apply(&[tag("inner"), tag("outer")], hello());
        let request = Request::builder(Method::Get, "/").build();
        let response = handler(ctx(request)).await.unwrap().into_response();
        assert_eq!(response.text(), "hello<inner><outer>");
    }

    #[tokio::test]
    async fn cors_short_circuits_preflight() {
        let handler = apply(&[cors()], hello());
        let request = Request::builder(Method::Options, "/").build();
        let response = handler(ctx(request)).await.unwrap().into_response();
        assert_eq!(response.status().as_u16(), 204);
        assert_eq!(
            response.headers().get("access-control-allow-origin"),
            Some("*")
        );
    }

    #[tokio::test]
    async fn cors_decorates_normal_requests() {
        let handler = apply(&[cors()], hello());
        let request = Request::builder(Method::Get, "/").build();
        let response = handler(ctx(request)).await.unwrap().into_response();
        assert_eq!(response.text(), "hello");
        assert_eq!(
            response.headers().get("access-control-allow-origin"),
            Some("*")
        );
    }

    #[tokio::test]
    async fn missing_form_field_is_400() {
        let handler = apply(&[require_form_fields(&["test"])], hello());
        let request = Request::builder(Method::Post, "/").build();
        let err = handler(ctx(request)).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 400);
        assert!(err.message().contains("test"));
    }

    #[tokio::test]
    async fn present_form_field_passes() {
        let handler = apply(&[require_form_fields(&["test"])], hello());
        let request = Request::builder(Method::Post, "/")
            .form(&[("test", "1")])
            .build();
        let response = handler(ctx(request)).await.unwrap().into_response();
        assert_eq!(response.text(), "hello");
    }
}
