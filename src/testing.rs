//! In-process test client.
//!
//! Drives an [`App`] without a socket: requests are built with
//! [`Request::builder`] and fed straight into dispatch. Cookies set by
//! responses are carried into subsequent requests, so session and
//! secure-cookie flows can be exercised the way a browser would.

use std::collections::HashMap;

use crate::app::App;
use crate::http::{Method, Request, RequestBuilder, Response};

/// A stateful client for one [`App`].
///
/// # Examples
///
/// ```
/// use seam::{reply, App, Context, Outcome, Scope, testing::TestClient};
///
/// async fn hello(_ctx: Context) -> Outcome {
///     reply("hello")
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let mut scope = Scope::new("main");
///     scope.get("/hello", hello).unwrap();
///     let mut client = TestClient::new(App::build(scope));
///
///     let response = client.get("/hello").await;
///     assert_eq!(response.status().as_u16(), 200);
///     assert_eq!(response.text(), "hello");
/// }
/// ```
pub struct TestClient {
    app: App,
    cookies: HashMap<String, String>,
}

impl TestClient {
    /// Wraps an app for in-process driving.
    pub fn new(app: App) -> Self {
        Self {
            app,
            cookies: HashMap::new(),
        }
    }

    /// Sends a fully custom request, attaching stored cookies first and
    /// keeping any cookies the response sets.
    pub async fn send(&mut self, mut builder: RequestBuilder) -> Response {
        for (name, value) in &self.cookies {
            builder = builder.cookie(name, value);
        }
        let response = self.app.handle(builder.build()).await;
        for (name, value) in response.cookies() {
            self.cookies.insert(name.clone(), value.clone());
        }
        response
    }

    /// Sends a `GET` request.
    pub async fn get(&mut self, path: &str) -> Response {
        self.send(Request::builder(Method::Get, path)).await
    }

    /// Sends a bodyless `POST` request.
    pub async fn post(&mut self, path: &str) -> Response {
        self.send(Request::builder(Method::Post, path)).await
    }

    /// Sends a `POST` with an urlencoded form body.
    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> Response {
        self.send(Request::builder(Method::Post, path).form(fields))
            .await
    }

    /// Sends a `POST` with a JSON body.
    pub async fn post_json(&mut self, path: &str, value: &serde_json::Value) -> Response {
        self.send(Request::builder(Method::Post, path).json(value))
            .await
    }

    /// Sends a `PUT` request.
    pub async fn put(&mut self, path: &str) -> Response {
        self.send(Request::builder(Method::Put, path)).await
    }

    /// Sends a `DELETE` request.
    pub async fn delete(&mut self, path: &str) -> Response {
        self.send(Request::builder(Method::Delete, path)).await
    }

    /// A cookie currently stored in the client's jar.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Drops every stored cookie, simulating a fresh browser.
    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }
}
