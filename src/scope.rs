//! Route registration scopes.
//!
//! A [`Scope`] is the assembly-time half of the framework: routes, middleware,
//! error and not-found handlers, an [`Environment`], and optionally a shared
//! static directory, all registered explicitly on a named value. Scopes
//! compose by [`Scope::include`], which copies another scope's routes under a
//! path prefix, all-or-nothing. A finished scope is handed to
//! [`App::build`](crate::app::App::build), after which nothing mutates it.
//!
//! Every registration error (duplicate route, ambiguous overlap, include
//! conflict) surfaces immediately from the registering call; a scope that
//! assembled without error dispatches deterministically.

use std::path::PathBuf;
use std::sync::Arc;

use crate::env::Environment;
use crate::error::{ErrorHandler, HttpError, RegistrationError, default_error_handler};
use crate::http::{Method, StatusCode};
use crate::middleware::{self, Handler, IntoHandler, Middleware};
use crate::reply::Reply;
use crate::router::{Pattern, methods_intersect};

// Scopes are where error handlers get installed, so the wrapper rides along.
pub use crate::error::error_handler;

/// What [`Scope::include`] does with the source scope's environment and
/// shared directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvPolicy {
    /// Copy the source's environment into the target (source values win) and
    /// take over its shared directory when the target has none.
    Adopt,
    /// Leave the target's environment and shared directory untouched.
    Keep,
}

/// One registered route: a compiled pattern, the methods it answers, the
/// handler with its middleware stack already composed in, and the error
/// handler captured at registration time.
#[derive(Clone)]
pub(crate) struct RouteEntry {
    pub(crate) pattern: Pattern,
    pub(crate) methods: Vec<Method>,
    pub(crate) handler: Handler,
    pub(crate) on_error: ErrorHandler,
}

/// A named registration namespace.
///
/// # Examples
///
/// ```
/// use seam::{reply, Context, Outcome, Scope};
///
/// async fn hello(_ctx: Context) -> Outcome {
///     reply("hello")
/// }
///
/// let mut scope = Scope::new("api");
/// scope.get("/hello", hello).unwrap();
/// ```
pub struct Scope {
    name: String,
    routes: Vec<RouteEntry>,
    middleware: Vec<Middleware>,
    on_error: ErrorHandler,
    on_not_found: Option<Handler>,
    env: Environment,
    shared_dir: Option<PathBuf>,
    debug: bool,
}

impl Scope {
    /// Methods registered by [`route_all`](Self::route_all) when no explicit
    /// set is given.
    const DEFAULT_METHODS: [Method; 4] = [Method::Get, Method::Post, Method::Put, Method::Delete];

    /// Creates an empty scope with the given name. The name appears in
    /// registration error messages.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
            middleware: Vec::new(),
            on_error: default_error_handler(),
            on_not_found: None,
            env: Environment::new(),
            shared_dir: None,
            debug: false,
        }
    }

    /// The scope's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a handler for `pattern` under the given methods.
    ///
    /// The scope's current middleware stack is composed around the handler
    /// here, and the current error handler is captured with the entry; later
    /// [`wrap`](Self::wrap) or [`on_error`](Self::on_error) calls leave this
    /// route unchanged.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::DuplicateRoute`] — the normalized pattern is
    ///   already registered for an overlapping method set.
    /// - [`RegistrationError::AmbiguousRoute`] — an equally specific existing
    ///   pattern can match the same path for an overlapping method set.
    pub fn route(
        &mut self,
        methods: &[Method],
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RegistrationError> {
        let entry = RouteEntry {
            pattern: Pattern::parse(pattern),
            methods: methods.to_vec(),
            handler: middleware::apply(&self.middleware, handler.into_handler()),
            on_error: self.on_error.clone(),
        };
        self.insert(entry)?;
        Ok(self)
    }

    /// Registers a `GET` route.
    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RegistrationError> {
        self.route(&[Method::Get], pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RegistrationError> {
        self.route(&[Method::Post], pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RegistrationError> {
        self.route(&[Method::Put], pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RegistrationError> {
        self.route(&[Method::Delete], pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RegistrationError> {
        self.route(&[Method::Patch], pattern, handler)
    }

    /// Registers one handler for `GET`, `POST`, `PUT`, and `DELETE`.
    pub fn route_all(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RegistrationError> {
        self.route(&Self::DEFAULT_METHODS, pattern, handler)
    }

    /// Appends a middleware to the stack applied to routes registered from
    /// now on. First-added runs innermost.
    pub fn wrap(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Replaces the error handler captured by routes registered from now on.
    pub fn on_error(&mut self, handler: ErrorHandler) -> &mut Self {
        self.on_error = handler;
        self
    }

    /// Sets the handler invoked when no route matches (404) or a pattern
    /// matches without an allowed method (405). A bare-body reply from it is
    /// given the corresponding status.
    pub fn on_not_found(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.on_not_found = Some(handler.into_handler());
        self
    }

    /// The scope's environment, for reading.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The scope's environment, for configuration.
    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Replaces the whole environment, typically one loaded with
    /// [`Environment::parse`].
    pub fn set_env(&mut self, env: Environment) -> &mut Self {
        self.env = env;
        self
    }

    /// Switches development mode on or off. With debug on, environment keys
    /// resolve through the `development` overlay and unhandled errors render
    /// their message instead of a generic body.
    pub fn debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Serves files below `path` under `/shared/...` URLs.
    pub fn shared_dir(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.shared_dir = Some(path.into());
        self
    }

    /// Registers `GET /favicon.ico` serving the given file.
    pub fn favicon(&mut self, path: impl Into<PathBuf>) -> Result<&mut Self, RegistrationError> {
        let path = path.into();
        self.get("/favicon.ico", move |_ctx: crate::context::Context| {
            let path = path.clone();
            async move {
                let data = tokio::fs::read(&path).await.map_err(|_| {
                    HttpError::new(StatusCode::NOT_FOUND, "favicon not found")
                })?;
                Ok(Reply::body(data).with_header("Content-Type", "image/x-icon"))
            }
        })
    }

    /// Copies every route of `source` into this scope under `prefix`.
    ///
    /// All-or-nothing: the merged table is validated first, and on any
    /// conflict this scope is left exactly as it was. Included entries keep
    /// the middleware and error handlers they were registered with in
    /// `source`; this scope's stack is not re-applied to them.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::IncludeConflict`] — a prefixed pattern collides
    ///   with an existing one for an overlapping method set.
    /// - [`RegistrationError::AmbiguousRoute`] — a prefixed pattern is
    ///   equally specific to an existing one and can match the same path.
    pub fn include(
        &mut self,
        source: &Scope,
        prefix: &str,
        env_policy: EnvPolicy,
    ) -> Result<&mut Self, RegistrationError> {
        let incoming: Vec<RouteEntry> = source
            .routes
            .iter()
            .map(|entry| RouteEntry {
                pattern: entry.pattern.prefixed(prefix),
                ..entry.clone()
            })
            .collect();

        // Validate the whole batch before touching the table.
        for (i, entry) in incoming.iter().enumerate() {
            for existing in self.routes.iter().chain(&incoming[..i]) {
                if !methods_intersect(&entry.methods, &existing.methods) {
                    continue;
                }
                if existing.pattern.raw() == entry.pattern.raw() {
                    return Err(RegistrationError::IncludeConflict {
                        from_scope: source.name.clone(),
                        target: self.name.clone(),
                        pattern: entry.pattern.raw().to_owned(),
                    });
                }
                if existing.pattern.specificity() == entry.pattern.specificity()
                    && existing.pattern.overlaps(&entry.pattern)
                {
                    return Err(RegistrationError::AmbiguousRoute {
                        scope: self.name.clone(),
                        first: existing.pattern.raw().to_owned(),
                        second: entry.pattern.raw().to_owned(),
                    });
                }
            }
        }
        self.routes.extend(incoming);

        if env_policy == EnvPolicy::Adopt {
            self.env.adopt(&source.env);
            if self.shared_dir.is_none() {
                self.shared_dir = source.shared_dir.clone();
            }
        }
        Ok(self)
    }

    fn insert(&mut self, entry: RouteEntry) -> Result<(), RegistrationError> {
        for existing in &self.routes {
            if !methods_intersect(&entry.methods, &existing.methods) {
                continue;
            }
            if existing.pattern.raw() == entry.pattern.raw() {
                return Err(RegistrationError::DuplicateRoute {
                    scope: self.name.clone(),
                    pattern: entry.pattern.raw().to_owned(),
                });
            }
            if existing.pattern.specificity() == entry.pattern.specificity()
                && existing.pattern.overlaps(&entry.pattern)
            {
                return Err(RegistrationError::AmbiguousRoute {
                    scope: self.name.clone(),
                    first: existing.pattern.raw().to_owned(),
                    second: entry.pattern.raw().to_owned(),
                });
            }
        }
        self.routes.push(entry);
        Ok(())
    }

    pub(crate) fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub(crate) fn into_parts(self) -> ScopeParts {
        ScopeParts {
            routes: self.routes,
            on_error: self.on_error,
            on_not_found: self.on_not_found,
            env: self.env,
            shared_dir: self.shared_dir,
            debug: self.debug,
        }
    }
}

/// The pieces [`App::build`](crate::app::App::build) takes over from a
/// finished scope.
pub(crate) struct ScopeParts {
    pub(crate) routes: Vec<RouteEntry>,
    pub(crate) on_error: ErrorHandler,
    pub(crate) on_not_found: Option<Handler>,
    pub(crate) env: Environment,
    pub(crate) shared_dir: Option<PathBuf>,
    pub(crate) debug: bool,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("routes", &self.routes.len())
            .field("middleware", &self.middleware.len())
            .field("shared_dir", &self.shared_dir)
            .finish()
    }
}
