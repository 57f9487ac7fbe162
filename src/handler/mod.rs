//! Handler module - serving requests that arrive from the peer.
//!
//! Provides:
//! - [`RequestHandler`] - the application hook invoked once per assembled request
//! - [`FnHandler`] / [`handler_fn`] - adapt an async closure into a handler
//! - [`Router`] - dispatch by verb and path
//!
//! # Example
//!
//! ```ignore
//! use streamwire::handler::{handler_fn, Router};
//! use streamwire::{verb, StreamingResponse};
//!
//! let mut router = Router::new();
//!
//! router.route(verb::POST, "/echo", |request| async move {
//!     let body = request.read_body_as_string().await.ok()?;
//!     let mut response = StreamingResponse::ok();
//!     response.set_text_body(body);
//!     Some(response)
//! });
//! ```

mod router;

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use crate::request::ReceiveRequest;
use crate::response::StreamingResponse;

pub use router::Router;

/// Boxed future for handler results and transport I/O.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Serves requests received from the peer.
///
/// Returning `None` sends nothing back; the peer's request stays pending.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle one fully assembled request.
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'static, Option<StreamingResponse>>;
}

/// Adapter turning an async closure into a [`RequestHandler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<StreamingResponse>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<StreamingResponse>> + Send + 'static,
{
    /// Create a new closure handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> RequestHandler for FnHandler<F, Fut>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<StreamingResponse>> + Send + 'static,
{
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'static, Option<StreamingResponse>> {
        Box::pin((self.handler)(request))
    }
}

/// Shorthand for [`FnHandler::new`].
pub fn handler_fn<F, Fut>(handler: F) -> FnHandler<F, Fut>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<StreamingResponse>> + Send + 'static,
{
    FnHandler::new(handler)
}
