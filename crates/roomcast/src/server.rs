//! `RoomcastServer` builder and server loop.
//!
//! This is the entry point for running a Roomcast chat server. It ties
//! together all the layers: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use roomcast_protocol::{ClientId, Codec, JsonCodec};
use roomcast_room::RoomRegistry;
use roomcast_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{RoomcastError, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Rooms guard
/// themselves, so nothing here needs an outer lock.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    next_client_id: AtomicU64,
}

impl<C: Codec> ServerState<C> {
    pub(crate) fn new(codec: C, config: ServerConfig) -> Self {
        Self {
            registry: RoomRegistry::new(),
            codec,
            config,
            // 0 is reserved for server-authored messages
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Hands out the next client id. Never returns the server sentinel.
    pub(crate) fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builder for configuring and starting a Roomcast server.
///
/// # Example
///
/// ```rust,ignore
/// let config = ServerConfig::load("roomcast.toml")?;
/// let server = RoomcastServer::builder()
///     .config(config)
///     .bind("0.0.0.0:9000")
///     .build()
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoomcastServerBuilder {
    config: ServerConfig,
}

impl RoomcastServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration, bind address included.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Validates the configuration, binds the listener and creates the
    /// lobby.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<RoomcastServer<JsonCodec>, RoomcastError> {
        self.config.validate()?;
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let state = Arc::new(ServerState::new(JsonCodec, self.config));
        Ok(RoomcastServer { transport, state })
    }
}

/// A Roomcast chat server bound to its listen address.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RoomcastServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl RoomcastServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> RoomcastServerBuilder {
        RoomcastServerBuilder::new()
    }
}

impl<C: Codec> RoomcastServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The room registry this server routes into.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), RoomcastError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes the
    /// listener.
    ///
    /// Each accepted peer gets its own handler task, which also runs the
    /// WebSocket handshake. Connections already being served are left to
    /// finish on their own.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), RoomcastError> {
        tracing::info!(addr = %self.state.config.bind_addr, "Roomcast server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(pending, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        drop(self.transport);
        tracing::info!("shutdown requested, listener closed");
        Ok(())
    }
}
