//! Request router dispatching by verb and path.
//!
//! Verbs are matched case-insensitively, paths exactly. Requests that match
//! no route are answered with 404 unless a fallback is registered.
//!
//! # Example
//!
//! ```ignore
//! use streamwire::handler::Router;
//! use streamwire::{verb, StreamingResponse};
//!
//! let mut router = Router::new();
//!
//! router.route(verb::GET, "/health", |_request| async {
//!     Some(StreamingResponse::ok())
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;

use super::{BoxFuture, FnHandler, RequestHandler};
use crate::request::ReceiveRequest;
use crate::response::StreamingResponse;

/// Routing key: upper-cased verb and exact path.
type RouteKey = (String, String);

fn route_key(verb: &str, path: &str) -> RouteKey {
    (verb.to_ascii_uppercase(), path.to_string())
}

/// Registry mapping `(verb, path)` to handlers.
#[derive(Default)]
pub struct Router {
    routes: HashMap<RouteKey, Box<dyn RequestHandler>>,
    fallback: Option<Box<dyn RequestHandler>>,
}

impl Router {
    /// Create a new empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure for `verb` and `path`.
    ///
    /// A second registration for the same route replaces the first.
    pub fn route<F, Fut>(&mut self, verb: &str, path: &str, handler: F) -> &mut Self
    where
        F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<StreamingResponse>> + Send + 'static,
    {
        self.route_handler(verb, path, FnHandler::new(handler))
    }

    /// Register any [`RequestHandler`] for `verb` and `path`.
    pub fn route_handler<H: RequestHandler>(&mut self, verb: &str, path: &str, handler: H) -> &mut Self {
        self.routes.insert(route_key(verb, path), Box::new(handler));
        self
    }

    /// Handler for requests matching no route.
    pub fn fallback<H: RequestHandler>(&mut self, handler: H) -> &mut Self {
        self.fallback = Some(Box::new(handler));
        self
    }

    /// Get the handler registered for a route.
    pub fn get_handler(&self, verb: &str, path: &str) -> Option<&dyn RequestHandler> {
        self.routes.get(&route_key(verb, path)).map(|h| h.as_ref())
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RequestHandler for Router {
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'static, Option<StreamingResponse>> {
        if let Some(handler) = self.get_handler(&request.verb, &request.path) {
            return handler.process_request(request);
        }

        if let Some(fallback) = &self.fallback {
            return fallback.process_request(request);
        }

        tracing::debug!("No route for {} {}", request.verb, request.path);
        Box::pin(async { Some(StreamingResponse::not_found()) })
    }
}
