//! The built application and its dispatch engine.
//!
//! [`App::build`] consumes a finished [`Scope`] and freezes its route table;
//! after that the app only reads. Dispatch for one request runs in phases:
//! shared-directory lookup, session and secure-cookie loading, route
//! matching, handler invocation, error handling, reply normalization, and
//! finally cookie persistence. Every phase is total: `handle` always yields
//! a [`Response`].

use std::sync::Arc;

use crate::context::Context;
use crate::env::Environment;
use crate::error::{ErrorHandler, HttpError};
use crate::http::{Method, Request, Response, StatusCode};
use crate::middleware::Handler;
use crate::reply::Reply;
use crate::router::PathParams;
use crate::scope::{RouteEntry, Scope};
use crate::secure::{SECURE_COOKIE, SecureJar};
use crate::session::{MemorySessionStore, SESSION_COOKIE, Session, SessionStore};
use crate::shared::SharedDir;

/// A frozen, dispatch-ready application.
///
/// Cheap to share behind an [`Arc`]; the transport clones it per connection.
///
/// # Examples
///
/// ```
/// use seam::{reply, App, Context, Outcome, Scope};
///
/// async fn hello(_ctx: Context) -> Outcome {
///     reply("hello")
/// }
///
/// let mut scope = Scope::new("main");
/// scope.get("/hello", hello).unwrap();
/// let app = App::build(scope);
/// ```
pub struct App {
    routes: Vec<RouteEntry>,
    on_error: ErrorHandler,
    on_not_found: Option<Handler>,
    env: Arc<Environment>,
    shared: Option<SharedDir>,
    sessions: Arc<dyn SessionStore>,
    debug: bool,
}

impl App {
    /// Freezes a scope into an app. Dispatch state is read-only from here on.
    pub fn build(scope: Scope) -> Self {
        let parts = scope.into_parts();
        Self {
            routes: parts.routes,
            on_error: parts.on_error,
            on_not_found: parts.on_not_found,
            env: Arc::new(parts.env),
            shared: parts.shared_dir.map(SharedDir::new),
            sessions: Arc::new(MemorySessionStore::new()),
            debug: parts.debug,
        }
    }

    /// Overrides the scope's debug flag. With debug on, environment keys
    /// resolve through the `development` overlay and unhandled errors render
    /// their message instead of a generic body.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replaces the in-memory session store.
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = store;
        self
    }

    /// Dispatches one request to a response.
    pub async fn handle(&self, request: Request) -> Response {
        // Shared files are checked before the route table.
        if let Some(shared) = &self.shared {
            if *request.method() == Method::Get {
                if let Some(response) = shared.try_serve(request.path()).await {
                    return response;
                }
            }
        }

        let (session, fresh) = self.load_session(&request);
        let secret = self
            .env
            .resolve_str("secret_key", self.debug)
            .map(str::to_owned);
        let secure = secret
            .as_deref()
            .map(|s| SecureJar::from_cookie(request.cookie(SECURE_COOKIE).as_deref(), s));

        let session_id = session.id();
        let session_handle = session.clone();
        let secure_handle = secure.clone();

        let mut response = self.dispatch(request, session, secure).await;

        // Untouched sessions are never persisted and get no cookie.
        if session_handle.is_dirty() {
            self.sessions.save(&session_handle);
            if fresh {
                response.set_cookie(SESSION_COOKIE, session_id);
            }
        }
        if let (Some(jar), Some(secret)) = (&secure_handle, secret.as_deref()) {
            if jar.is_dirty() {
                response.set_cookie(SECURE_COOKIE, jar.encode(secret));
            }
        }
        response
    }

    fn load_session(&self, request: &Request) -> (Session, bool) {
        if let Some(session) = request
            .cookie(SESSION_COOKIE)
            .and_then(|id| self.sessions.get(&id))
        {
            (session, false)
        } else {
            (self.sessions.create(), true)
        }
    }

    async fn dispatch(
        &self,
        request: Request,
        session: Session,
        secure: Option<SecureJar>,
    ) -> Response {
        let path = request.path().to_owned();
        let method = request.method().clone();

        // Most specific method-allowed match wins. Equally specific
        // overlapping entries cannot coexist, so the winner is unique.
        let mut best: Option<(&RouteEntry, PathParams)> = None;
        let mut path_matched = false;
        for entry in &self.routes {
            let Some(params) = entry.pattern.matches(&path) else {
                continue;
            };
            path_matched = true;
            if !entry.methods.contains(&method) {
                continue;
            }
            let better = match &best {
                Some((current, _)) => {
                    entry.pattern.specificity() < current.pattern.specificity()
                }
                None => true,
            };
            if better {
                best = Some((entry, params));
            }
        }

        match best {
            Some((entry, params)) => {
                let ctx = Context::new(
                    request,
                    params,
                    self.env.clone(),
                    self.debug,
                    session,
                    secure,
                );
                match (entry.handler)(ctx).await {
                    Ok(reply) => reply.into_response(),
                    Err(err) => self.render_error(&entry.on_error, &err),
                }
            }
            None => {
                let err = if path_matched {
                    HttpError::method_not_allowed(method.as_str(), &path)
                } else {
                    HttpError::not_found(&path)
                };
                self.render_miss(request, err, session, secure).await
            }
        }
    }

    /// Runs a raised error through an error handler; a handler that declines
    /// (`None`) leaves an unhandled fault, logged and rendered generically.
    fn render_error(&self, handler: &ErrorHandler, err: &HttpError) -> Response {
        match handler(err) {
            Some(reply) => reply.into_response(),
            None => {
                tracing::error!(
                    "unhandled error: {} ({})",
                    err.message(),
                    err.status().as_u16()
                );
                let body = if self.debug {
                    err.message().to_owned()
                } else {
                    "Internal Server Error".to_owned()
                };
                Response::new(StatusCode::INTERNAL_SERVER_ERROR).body(body)
            }
        }
    }

    /// Renders a 404 or 405 through the custom not-found handler when one is
    /// installed, keeping the miss status unless the handler set its own.
    async fn render_miss(
        &self,
        request: Request,
        err: HttpError,
        session: Session,
        secure: Option<SecureJar>,
    ) -> Response {
        let Some(handler) = &self.on_not_found else {
            return self.render_error(&self.on_error, &err);
        };

        let status = err.status();
        let ctx = Context::new(
            request,
            PathParams::new(),
            self.env.clone(),
            self.debug,
            session,
            secure,
        );
        match handler(ctx).await {
            Ok(reply) => {
                let reply = match reply {
                    Reply::Body(body) => Reply::WithStatus(body, status.as_u16()),
                    other => other,
                };
                reply.into_response()
            }
            Err(inner) => self.render_error(&self.on_error, &inner),
        }
    }

    /// Binds a TCP listener on `addr` and serves this app until the task is
    /// cancelled.
    pub async fn run(self, addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<()> {
        crate::server::Server::new(self).run(addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{abort, error_handler};
    use crate::reply::{Outcome, reply};

    async fn hello(_ctx: Context) -> Outcome {
        reply("hello")
    }

    fn get(path: &str) -> Request {
        Request::builder(Method::Get, path).build()
    }

    #[tokio::test]
    async fn dispatches_matching_route() {
        let mut scope = Scope::new("main");
        scope.get("/hello", hello).unwrap();
        let app = App::build(scope);

        let response = app.handle(get("/hello")).await;
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text(), "hello");
    }

    #[tokio::test]
    async fn binds_path_params() {
        let mut scope = Scope::new("main");
        scope
            .get("/items/:id", |ctx: Context| async move {
                reply(format!("item {}", ctx.param("id").unwrap_or("?")))
            })
            .unwrap();
        let app = App::build(scope);

        let response = app.handle(get("/items/42")).await;
        assert_eq!(response.text(), "item 42");
    }

    #[tokio::test]
    async fn most_specific_pattern_wins() {
        let mut scope = Scope::new("main");
        scope
            .get("/items/:id", |_ctx: Context| async { reply("dynamic") })
            .unwrap();
        scope
            .get("/items/special", |_ctx: Context| async { reply("static") })
            .unwrap();
        let app = App::build(scope);

        assert_eq!(app.handle(get("/items/special")).await.text(), "static");
        assert_eq!(app.handle(get("/items/7")).await.text(), "dynamic");
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let app = App::build(Scope::new("main"));
        let response = app.handle(get("/nope")).await;
        assert_eq!(response.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let mut scope = Scope::new("main");
        scope.get("/only-get", hello).unwrap();
        let app = App::build(scope);

        let request = Request::builder(Method::Post, "/only-get").build();
        let response = app.handle(request).await;
        assert_eq!(response.status().as_u16(), 405);
    }

    #[tokio::test]
    async fn custom_not_found_keeps_miss_status() {
        let mut scope = Scope::new("main");
        scope.get("/only-get", hello).unwrap();
        scope.on_not_found(|_ctx: Context| async { reply("nothing here") });
        let app = App::build(scope);

        let miss = app.handle(get("/nope")).await;
        assert_eq!(miss.status().as_u16(), 404);
        assert_eq!(miss.text(), "nothing here");

        let wrong_method = app
            .handle(Request::builder(Method::Post, "/only-get").build())
            .await;
        assert_eq!(wrong_method.status().as_u16(), 405);
        assert_eq!(wrong_method.text(), "nothing here");
    }

    #[tokio::test]
    async fn not_found_handler_may_set_own_status() {
        let mut scope = Scope::new("main");
        scope.on_not_found(|_ctx: Context| async { reply(("gone", 410u16)) });
        let app = App::build(scope);

        let response = app.handle(get("/anything")).await;
        assert_eq!(response.status().as_u16(), 410);
    }

    #[tokio::test]
    async fn handler_error_goes_through_captured_handler() {
        let mut scope = Scope::new("main");
        scope.on_error(error_handler(|err| {
            Some(Reply::with_status(
                format!("handled: {}", err.message()),
                err.status().as_u16(),
            ))
        }));
        scope
            .get("/fail", |_ctx: Context| async { abort(403, "no entry") })
            .unwrap();
        let app = App::build(scope);

        let response = app.handle(get("/fail")).await;
        assert_eq!(response.status().as_u16(), 403);
        assert_eq!(response.text(), "handled: no entry");
    }

    #[tokio::test]
    async fn error_handler_is_captured_at_registration() {
        let mut scope = Scope::new("main");
        scope.on_error(error_handler(|err| {
            Some(Reply::with_status(
                format!("first: {}", err.message()),
                err.status().as_u16(),
            ))
        }));
        scope
            .get("/early", |_ctx: Context| async { abort(400, "oops") })
            .unwrap();
        scope.on_error(error_handler(|err| {
            Some(Reply::with_status(
                format!("second: {}", err.message()),
                err.status().as_u16(),
            ))
        }));
        scope
            .get("/late", |_ctx: Context| async { abort(400, "oops") })
            .unwrap();
        let app = App::build(scope);

        // The earlier route keeps the handler it was registered under.
        assert_eq!(app.handle(get("/early")).await.text(), "first: oops");
        assert_eq!(app.handle(get("/late")).await.text(), "second: oops");
    }

    #[tokio::test]
    async fn declining_error_handler_yields_generic_500() {
        let mut scope = Scope::new("main");
        scope.on_error(error_handler(|_| None));
        scope
            .get("/fail", |_ctx: Context| async { abort(418, "teapot") })
            .unwrap();
        let app = App::build(scope);

        let response = app.handle(get("/fail")).await;
        assert_eq!(response.status().as_u16(), 500);
        assert_eq!(response.text(), "Internal Server Error");
    }

    #[tokio::test]
    async fn debug_renders_error_message() {
        let mut scope = Scope::new("main");
        scope.on_error(error_handler(|_| None));
        scope
            .get("/fail", |_ctx: Context| async { abort(500, "boom") })
            .unwrap();
        let app = App::build(scope).debug(true);

        let response = app.handle(get("/fail")).await;
        assert_eq!(response.text(), "boom");
    }

    #[tokio::test]
    async fn untouched_session_issues_no_cookie() {
        let mut scope = Scope::new("main");
        scope.get("/", hello).unwrap();
        let app = App::build(scope);

        let response = app.handle(get("/")).await;
        assert!(!response.cookies().contains_key(SESSION_COOKIE));
    }

    #[tokio::test]
    async fn dirty_session_issues_cookie() {
        let mut scope = Scope::new("main");
        scope
            .get("/touch", |ctx: Context| async move {
                ctx.session().set("seen", true);
                reply("ok")
            })
            .unwrap();
        let app = App::build(scope);

        let response = app.handle(get("/touch")).await;
        assert!(response.cookies().contains_key(SESSION_COOKIE));
    }

    #[tokio::test]
    async fn session_persists_across_requests() {
        let mut scope = Scope::new("main");
        scope
            .get("/login", |ctx: Context| async move {
                ctx.session().set("user", "max");
                reply("ok")
            })
            .unwrap();
        scope
            .get("/whoami", |ctx: Context| async move {
                reply(ctx.session().get_str("user").unwrap_or_default())
            })
            .unwrap();
        let app = App::build(scope);

        let login = app.handle(get("/login")).await;
        let sid = login.cookies().get(SESSION_COOKIE).unwrap().clone();

        let request = Request::builder(Method::Get, "/whoami")
            .cookie(SESSION_COOKIE, &sid)
            .build();
        let response = app.handle(request).await;
        assert_eq!(response.text(), "max");
    }

    #[tokio::test]
    async fn secure_cookie_written_when_dirty() {
        let mut scope = Scope::new("main");
        scope.env_mut().set("secret_key", "not_secret").unwrap();
        scope
            .get("/set", |ctx: Context| async move {
                ctx.secure()?.set("test", "successful");
                reply("ok")
            })
            .unwrap();
        scope
            .get("/read", |ctx: Context| async move {
                reply(ctx.secure()?.get_str("test").unwrap_or_default())
            })
            .unwrap();
        let app = App::build(scope);

        let set = app.handle(get("/set")).await;
        let cookie = set.cookies().get(SECURE_COOKIE).unwrap().clone();

        let request = Request::builder(Method::Get, "/read")
            .cookie(SECURE_COOKIE, &cookie)
            .build();
        let response = app.handle(request).await;
        assert_eq!(response.text(), "successful");
    }

    #[tokio::test]
    async fn secure_without_secret_is_500_via_default_handler() {
        let mut scope = Scope::new("main");
        scope
            .get("/set", |ctx: Context| async move {
                ctx.secure()?.set("k", "v");
                reply("ok")
            })
            .unwrap();
        let app = App::build(scope);

        let response = app.handle(get("/set")).await;
        assert_eq!(response.status().as_u16(), 500);
        assert!(response.text().contains("secret_key"));
    }
}
