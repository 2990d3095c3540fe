//! Session Manager (§4.G): accepts connections, finds a free slot, raises
//! the "connected" I/O state on the first live connection, and spawns a
//! Connection Reader task per client.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use motion_server::controller::Controller;

use crate::dispatch;
use crate::reader;

pub async fn run(controller: Arc<Controller>, listener: TcpListener, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => accept_connection(&controller, stream, addr.to_string()),
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, refusing new connections");
                break;
            }
        }
    }
}

fn accept_connection(controller: &Arc<Controller>, stream: tokio::net::TcpStream, addr: String) {
    let was_idle = controller.connections_in_use() == 0;
    match controller.acquire_connection_slot() {
        Some(slot) => {
            if was_idle {
                dispatch::update_connected_io(controller, true);
            }
            tracing::info!("connection accepted from {addr} on slot {slot}");
            let controller = Arc::clone(controller);
            tokio::spawn(async move {
                reader::handle_connection(stream, controller, slot).await;
                tracing::info!("connection closed: {addr} (slot {slot})");
            });
        }
        None => {
            tracing::warn!(%addr, "no free connection slot, refusing");
        }
    }
}
