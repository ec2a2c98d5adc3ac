use tower::Layer;

use crate::{config::SocketIoConfig, handler::SocketIoHandler, service::SocketIoService};

/// A tower [`Layer`] that wraps an inner service with a
/// [`SocketIoService`].
#[derive(Debug, Clone)]
pub struct SocketIoLayer<H: SocketIoHandler + Clone> {
    config: SocketIoConfig,
    handler: H,
}

impl<H: SocketIoHandler + Clone> SocketIoLayer<H> {
    pub fn new(handler: H) -> Self {
        Self {
            config: SocketIoConfig::default(),
            handler,
        }
    }

    pub fn from_config(handler: H, config: SocketIoConfig) -> Self {
        Self { config, handler }
    }
}

impl<S: Clone, H: SocketIoHandler + Clone> Layer<S> for SocketIoLayer<H> {
    type Service = SocketIoService<H, S>;

    fn layer(&self, inner: S) -> Self::Service {
        SocketIoService::with_config_inner(inner, self.handler.clone(), self.config.clone())
    }
}
