//! Per-dispatch request context.

use std::sync::Arc;

use serde_json::Value;

use crate::env::Environment;
use crate::error::HttpError;
use crate::http::{Request, StatusCode};
use crate::router::PathParams;
use crate::secure::SecureJar;
use crate::session::Session;

/// Everything a handler gets for one request: the parsed [`Request`], the
/// path parameters bound by the matcher, the owning scope's environment and
/// debug flag, the visitor's [`Session`], and (when a `secret_key` is
/// configured) the signed [`SecureJar`].
///
/// `Context` is created by the dispatch engine and moved into the handler
/// chain; it is not `Clone`, mirroring the request's exclusive ownership.
///
/// # Examples
///
/// ```
/// use seam::{reply, Context, Outcome};
///
/// async fn show(ctx: Context) -> Outcome {
///     let id = ctx.param("id").unwrap_or("unknown");
///     reply(format!("item {id}"))
/// }
/// ```
pub struct Context {
    request: Request,
    params: PathParams,
    environment: Arc<Environment>,
    debug: bool,
    session: Session,
    secure: Option<SecureJar>,
}

impl Context {
    pub(crate) fn new(
        request: Request,
        params: PathParams,
        environment: Arc<Environment>,
        debug: bool,
        session: Session,
        secure: Option<SecureJar>,
    ) -> Self {
        Self {
            request,
            params,
            environment,
            debug,
            session,
            secure,
        }
    }

    /// The parsed inbound request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// All path parameters bound by the matcher.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// One path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Resolves an environment value under the owning scope's debug flag.
    pub fn env(&self, key: &str) -> Option<&Value> {
        self.environment.resolve(key, self.debug)
    }

    /// Resolves an environment value as a string slice.
    pub fn env_str(&self, key: &str) -> Option<&str> {
        self.environment.resolve_str(key, self.debug)
    }

    /// The owning scope's full environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Whether the app was built with debug (development) mode on.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// The visitor's server-side session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The signed client-side cookie jar.
    ///
    /// # Errors
    ///
    /// A 500 [`HttpError`] when the environment defines no `secret_key`,
    /// since an unsigned jar would be forgeable.
    pub fn secure(&self) -> Result<&SecureJar, HttpError> {
        self.secure.as_ref().ok_or_else(|| {
            HttpError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "secret_key must be set in environment",
            )
        })
    }

    /// Deserializes the request body as JSON, raising a 400 on failure.
    pub fn json<T>(&self) -> Result<T, HttpError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.request
            .json()
            .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, format!("invalid JSON body: {err}")))
    }
}
