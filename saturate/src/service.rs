//! The trivial target service: a no-op procedure and an echo procedure spoken
//! over the [line protocol](crate::connection::line).
//!
//! It exists to calibrate the harness. Each accepted connection is served by its
//! own task until the peer hangs up.
use std::{future::Future, io, net::SocketAddr};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

use crate::connection::line::{Procedure, trim_line};

/// Longest request line accepted, terminator included. A peer that sends a longer
/// line gets an error reply and is disconnected.
pub const MAX_LINE: usize = 64 * 1024;

/// Accept and serve connections until `shutdown` resolves.
///
/// Failed accepts are logged and skipped; they never stop the service.
pub async fn serve<S>(listener: TcpListener, shutdown: S) -> io::Result<()>
where
    S: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    tracing::info!("Serving on {local}");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, no longer accepting connections.");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer));
                }
                Err(e) => tracing::warn!("Accept failed: {e}"),
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr) {
    tracing::debug!("Accepted connection from {peer}");
    match answer(stream).await {
        Ok(served) => tracing::debug!("Connection from {peer} closed after {served} calls"),
        Err(e) => tracing::debug!("Connection from {peer} failed: {e}"),
    }
}

/// Answer requests until EOF, returning the number of calls served.
async fn answer(stream: TcpStream) -> io::Result<u64> {
    stream.set_nodelay(true)?;
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = Vec::new();
    let mut reply = String::new();
    let mut served = 0;

    loop {
        line.clear();
        let limit = MAX_LINE as u64 + 1;
        if (&mut reader).take(limit).read_until(b'\n', &mut line).await? == 0 {
            return Ok(served);
        }
        if line.len() > MAX_LINE {
            write.write_all(b"ERR line too long\n").await?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request line exceeds {MAX_LINE} bytes"),
            ));
        }

        reply.clear();
        let request = std::str::from_utf8(&line)
            .map_err(|_| "request is not utf-8".to_owned())
            .and_then(|line| Procedure::parse(trim_line(line)));
        match request {
            Ok(Procedure::Nothing) => reply.push_str("OK\n"),
            Ok(Procedure::Echo(payload)) => {
                reply.push_str("OK ");
                reply.push_str(&payload);
                reply.push('\n');
            }
            Err(message) => {
                reply.push_str("ERR ");
                reply.push_str(&message);
                reply.push('\n');
            }
        }
        write.write_all(reply.as_bytes()).await?;
        served += 1;
    }
}
