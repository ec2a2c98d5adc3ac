//! ## A tower [`Service`] for socket.io so it can be used with frameworks
//! supporting tower services
//!
//! If a request is not a socket.io request it is forwarded to the inner
//! service; by default a [`NotFoundService`] answers those with a 404, which
//! makes [`SocketIoService`] usable standalone:
//!
//! ```rust
//! # use socketio_legacy::service::SocketIoService;
//! # use socketio_legacy::{Packet, Session, SocketIoHandler, DisconnectReason};
//! # use std::sync::Arc;
//! #[derive(Debug)]
//! struct MyHandler;
//!
//! impl SocketIoHandler for MyHandler {
//!     fn on_connect(&self, session: Arc<Session>) { }
//!     fn on_message(&self, session: Arc<Session>, packet: Packet) { }
//!     fn on_disconnect(&self, session: Arc<Session>, reason: DisconnectReason) { }
//! }
//!
//! // Create a socket.io service that answers 404 to every other request
//! let service = SocketIoService::new(MyHandler)
//!     .into_make_service(); // MakeService for a standalone hyper server
//! ```

use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};

use ::futures::future::{self, Ready};
use bytes::Bytes;
use http::{Request, Response};
use http_body::{Body, Empty};
use tower::Service;

use crate::{
    body::ResponseBody, config::SocketIoConfig, engine::SocketIo, handler::SocketIoHandler,
};

mod futures;
mod parser;

pub use self::parser::TransportKind;
use self::{futures::ResponseFuture, parser::dispatch_req};

/// A [`Service`] that handles socket.io requests as a middleware.
/// If the request is not a socket.io request, it forwards it to the inner
/// service; otherwise it is routed to the handshake or the matching
/// transport framer.
pub struct SocketIoService<H: SocketIoHandler, S = NotFoundService> {
    inner: S,
    engine: Arc<SocketIo<H>>,
}

impl<H: SocketIoHandler> SocketIoService<H, NotFoundService> {
    /// Create a new [`SocketIoService`] with a [`NotFoundService`] as the
    /// inner service.
    pub fn new(handler: H) -> Self {
        SocketIoService::with_config(handler, SocketIoConfig::default())
    }

    /// Create a new [`SocketIoService`] with a custom config.
    pub fn with_config(handler: H, config: SocketIoConfig) -> Self {
        SocketIoService::with_config_inner(NotFoundService, handler, config)
    }
}

impl<S: Clone, H: SocketIoHandler> SocketIoService<H, S> {
    /// Create a new [`SocketIoService`] with a custom inner service.
    pub fn with_inner(inner: S, handler: H) -> Self {
        SocketIoService::with_config_inner(inner, handler, SocketIoConfig::default())
    }

    /// Create a new [`SocketIoService`] with a custom inner service and a
    /// custom config.
    pub fn with_config_inner(inner: S, handler: H, config: SocketIoConfig) -> Self {
        SocketIoService {
            inner,
            engine: Arc::new(SocketIo::new(handler, config)),
        }
    }

    /// Convert this [`SocketIoService`] into a [`MakeSocketIoService`].
    /// This is useful when using it without layers.
    pub fn into_make_service(self) -> MakeSocketIoService<H, S> {
        MakeSocketIoService::new(self)
    }
}

impl<S: Clone, H: SocketIoHandler> Clone for SocketIoService<H, S> {
    fn clone(&self) -> Self {
        SocketIoService {
            inner: self.inner.clone(),
            engine: self.engine.clone(),
        }
    }
}

impl<H: SocketIoHandler, S> std::fmt::Debug for SocketIoService<H, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoService").finish()
    }
}

/// Tower [`Service`] implementation for [`SocketIoService`].
impl<ReqBody, ResBody, S, H> Service<Request<ReqBody>> for SocketIoService<H, S>
where
    ResBody: Body + Send + 'static,
    ReqBody: Body + Send + Unpin + 'static,
    ReqBody::Error: std::fmt::Debug,
    ReqBody::Data: Send,
    S: tower::Service<Request<ReqBody>, Response = Response<ResBody>>,
    H: SocketIoHandler,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if req.uri().path().starts_with(&self.engine.config.req_path) {
            dispatch_req(req, self.engine.clone())
        } else {
            ResponseFuture::new(self.inner.call(req))
        }
    }
}

/// A MakeService that always returns a clone of the [`SocketIoService`] it
/// was created with.
pub struct MakeSocketIoService<H: SocketIoHandler, S> {
    svc: SocketIoService<H, S>,
}

impl<H: SocketIoHandler, S> MakeSocketIoService<H, S> {
    pub fn new(svc: SocketIoService<H, S>) -> Self {
        MakeSocketIoService { svc }
    }
}

impl<H: SocketIoHandler, S: Clone, T> Service<T> for MakeSocketIoService<H, S> {
    type Response = SocketIoService<H, S>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: T) -> Self::Future {
        future::ready(Ok(self.svc.clone()))
    }
}

/// A [`Service`] that always returns a 404 response and that is compatible
/// with [`SocketIoService`].
#[derive(Debug, Clone)]
pub struct NotFoundService;

impl<ReqBody> Service<Request<ReqBody>> for NotFoundService {
    type Response = Response<ResponseBody<Empty<Bytes>>>;
    type Error = Infallible;
    type Future = Ready<Result<Response<ResponseBody<Empty<Bytes>>>, Infallible>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _: Request<ReqBody>) -> Self::Future {
        future::ready(Ok(Response::builder()
            .status(404)
            .body(ResponseBody::empty_response())
            .unwrap()))
    }
}
