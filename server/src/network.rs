//! UDP server loop: decode, validate, authenticate, dispatch.
//!
//! The transport is unreliable by contract; every failure along the
//! inbound pipeline drops the datagram with a log and nothing else.
//! Unauthenticated senders are never answered, so the server cannot be
//! used to probe for valid user ids.

use crate::auth;
use crate::dispatch::Dispatcher;
use crate::publisher::Publisher;
use crate::store::Store;
use crate::tasks::TaskRegistry;
use log::{debug, error, info, warn};
use shared::Envelope;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

pub struct Server {
    socket: Arc<UdpSocket>,
    store: Store,
    dispatcher: Dispatcher,
}

impl Server {
    pub async fn bind(addr: &str, store: Store) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("server listening on {}", addr);

        let publisher = Arc::new(Publisher::new(Arc::clone(&socket), store.clone()));
        let movement = Arc::new(TaskRegistry::new());
        let dispatcher = Dispatcher::new(store.clone(), publisher, movement);

        Ok(Server {
            socket,
            store,
            dispatcher,
        })
    }

    /// Receives and processes datagrams forever. Handlers run inline on
    /// this loop; nothing blocks longer than one store round-trip.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let _sweep = self.dispatcher.spawn_liveness_sweep();
        let mut buffer = [0u8; 2048];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            self.handle_datagram(&buffer[..len], addr).await;
        }
    }

    async fn handle_datagram(&self, payload: &[u8], addr: SocketAddr) {
        let envelope: Envelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("malformed envelope from {}: {}", addr, e);
                return;
            }
        };

        if let Err(e) = envelope.validate() {
            warn!("malformed envelope from {}: {}", addr, e);
            return;
        }

        // Schema validation first: an unknown or malformed event is
        // dropped before any store round-trip happens.
        let event = match envelope.parse_event() {
            Ok(event) => event,
            Err(e) => {
                warn!("dropping message from {}: {}", envelope.user_id, e);
                return;
            }
        };

        if let Err(e) = auth::authenticate(&self.store, &envelope).await {
            warn!("dropping message from {}: {}", envelope.user_id, e);
            return;
        }

        debug!("valid `{}` message from {}", envelope.event, envelope.user_id);
        self.dispatcher.dispatch(&envelope.user_id, event, addr).await;
    }
}
