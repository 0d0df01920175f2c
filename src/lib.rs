//! seam — a small explicit-registration web framework.
//!
//! Routes, middleware, error handlers, and configuration are all registered
//! on a named [`Scope`]; [`App::build`] freezes the scope into a read-only
//! dispatch table served over async HTTP/1.1. Registration mistakes
//! (duplicate routes, ambiguous overlaps, include conflicts) fail at
//! assembly time, never at request time.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use seam::{reply, App, Context, Outcome, Scope};
//!
//! async fn hello(ctx: Context) -> Outcome {
//!     let name = ctx.request().query_param("name").unwrap_or("world");
//!     reply(format!("hello, {name}"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut scope = Scope::new("main");
//!     scope.get("/hello", hello).unwrap();
//!     App::build(scope).run("127.0.0.1:8080").await
//! }
//! ```
//!
//! # Handlers and replies
//!
//! A handler is any `async fn(Context) -> Outcome`. The [`reply`] helper
//! accepts every supported reply shape: a bare body, a `(body, code)` pair,
//! a `(body, code, headers)` triple, or a prebuilt [`Response`](http::Response).
//! [`abort`] short-circuits with an [`HttpError`], which routes through the
//! error handler the route was registered under.
//!
//! # Composition
//!
//! Scopes nest with [`Scope::include`], which copies another scope's routes
//! under a path prefix, all-or-nothing, and optionally adopts its
//! environment. Middleware registered with [`Scope::wrap`] applies to routes
//! registered afterwards; built-ins live in [`middleware`].

pub mod app;
pub mod context;
pub mod env;
pub mod error;
pub mod http;
pub mod middleware;
pub mod reply;
pub mod router;
pub mod scope;
pub mod secure;
pub mod session;
pub mod server;
pub mod shared;
pub mod testing;

pub use app::App;
pub use context::Context;
pub use env::{Environment, Runtime};
pub use error::{
    ErrorHandler, HttpError, RegistrationError, abort, default_error_handler, error_handler,
    json_error_handler,
};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Handler, IntoHandler, Middleware, middleware};
pub use reply::{Body, IntoBody, IntoReply, Outcome, Reply, redirect, reply};
pub use router::PathParams;
pub use scope::{EnvPolicy, Scope};
pub use secure::SecureJar;
pub use session::{MemorySessionStore, Session, SessionStore};
pub use shared::{send_attachment, send_file};
pub use testing::TestClient;
