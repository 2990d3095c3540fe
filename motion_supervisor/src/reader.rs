//! Connection Reader (§4.D): per-connection cooperative loop that frames
//! inbound messages, dispatches one at a time, and writes back exactly one
//! reply per request.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use motion_common::wire::{Header, HEADER_SIZE, PREFIX_SIZE};
use motion_server::controller::Controller;

use crate::dispatch;

/// Guards against a client-declared length that would otherwise force an
/// unbounded buffer grow.
const MAX_FRAME_SIZE: usize = 64 * 1024;

async fn fill_at_least(stream: &mut TcpStream, buf: &mut Vec<u8>, needed: usize) -> bool {
    let mut scratch = [0u8; 4096];
    while buf.len() < needed {
        match stream.read(&mut scratch).await {
            Ok(0) => return false,
            Ok(n) => buf.extend_from_slice(&scratch[..n]),
            Err(_) => return false,
        }
    }
    true
}

/// Runs until the peer disconnects, a transport error occurs, or a
/// DISCONNECT control command is served. Always releases `slot` on exit.
pub async fn handle_connection(mut stream: TcpStream, controller: Arc<Controller>, slot: usize) {
    let mut buf: Vec<u8> = Vec::new();

    loop {
        if !fill_at_least(&mut stream, &mut buf, PREFIX_SIZE + HEADER_SIZE).await {
            break;
        }
        let length = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        if length < HEADER_SIZE || PREFIX_SIZE + length > MAX_FRAME_SIZE {
            tracing::warn!("oversized or undersized frame (length {length}), disconnecting");
            break;
        }
        let total = PREFIX_SIZE + length;
        if !fill_at_least(&mut stream, &mut buf, total).await {
            break;
        }

        let header = match Header::decode(&buf[PREFIX_SIZE..]) {
            Ok(h) => h,
            Err(_) => break,
        };
        let body = &buf[PREFIX_SIZE + HEADER_SIZE..total];

        let outcome = dispatch::dispatch(&controller, header, body).await;

        // §4.D step 4: shift any surplus (pipelined next request) down and
        // carry it over to the next loop iteration without a fresh recv.
        buf.drain(0..total);

        if stream.write_all(&outcome.framed_reply).await.is_err() {
            break;
        }
        if outcome.close {
            break;
        }
    }

    controller.release_connection_slot(slot);
    if controller.connections_in_use() == 0 {
        dispatch::update_connected_io(&controller, false);
    }
}
