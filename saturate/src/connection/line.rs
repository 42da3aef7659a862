//! Newline-delimited text protocol over TCP.
//!
//! Every request and reply is one line:
//!
//! ```text
//! NOTHING\n          -> OK\n
//! ECHO <payload>\n   -> OK <payload>\n
//! <anything else>\n  -> ERR <message>\n
//! ```
//!
//! The protocol exists so the harness can be pointed at [`crate::service`] without
//! pulling in an RPC framework. Payloads must not contain line breaks.
use serde::{Deserialize, Serialize};
use std::io;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use super::{Connection, Connector};
use crate::error::CallError;

/// The remote procedures exposed by the target service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Procedure {
    /// Do nothing and reply with an empty success.
    Nothing,
    /// Reply with the payload unchanged.
    Echo(String),
}

impl Procedure {
    fn encode(&self, out: &mut String) -> Result<(), CallError> {
        match self {
            Procedure::Nothing => out.push_str("NOTHING\n"),
            Procedure::Echo(payload) => {
                if payload.contains(['\n', '\r']) {
                    return Err(CallError::Transport(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "echo payload contains a line break",
                    )));
                }
                out.push_str("ECHO ");
                out.push_str(payload);
                out.push('\n');
            }
        }
        Ok(())
    }

    /// Parse one request line, without its terminator.
    pub(crate) fn parse(line: &str) -> Result<Self, String> {
        match line {
            "NOTHING" => Ok(Procedure::Nothing),
            "ECHO" => Ok(Procedure::Echo(String::new())),
            _ => match line.strip_prefix("ECHO ") {
                Some(payload) => Ok(Procedure::Echo(payload.to_owned())),
                None => Err("unknown procedure".to_owned()),
            },
        }
    }
}

/// Parse one reply line, without its terminator.
fn parse_reply(line: &str) -> Result<&str, CallError> {
    if line == "OK" {
        return Ok("");
    }
    if let Some(body) = line.strip_prefix("OK ") {
        return Ok(body);
    }
    match line.strip_prefix("ERR") {
        Some(message) => Err(CallError::Remote(message.trim_start().to_owned())),
        None => Err(CallError::Remote(format!("malformed reply: {line:?}"))),
    }
}

pub(crate) fn trim_line(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Dials [`LineConnection`]s with `TCP_NODELAY` set.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineConnector;

impl Connector for LineConnector {
    type Connection = LineConnection;

    async fn connect(&self, addr: &str) -> io::Result<LineConnection> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(LineConnection::new(stream))
    }
}

/// Client side of the line protocol.
///
/// `Echo` calls check that the reply matches the payload and fail with
/// [`CallError::Mismatch`] otherwise.
pub struct LineConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    outgoing: String,
    incoming: String,
}

impl LineConnection {
    pub fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
            outgoing: String::new(),
            incoming: String::new(),
        }
    }
}

impl Connection for LineConnection {
    type Request = Procedure;
    type Response = String;

    async fn call(&mut self, request: &Procedure) -> Result<String, CallError> {
        self.outgoing.clear();
        request.encode(&mut self.outgoing)?;
        self.writer.write_all(self.outgoing.as_bytes()).await?;

        self.incoming.clear();
        if self.reader.read_line(&mut self.incoming).await? == 0 {
            return Err(CallError::Closed);
        }
        let reply = parse_reply(trim_line(&self.incoming))?;

        if let Procedure::Echo(expected) = request
            && reply != expected.as_str()
        {
            return Err(CallError::Mismatch {
                expected: expected.clone(),
                actual: reply.to_owned(),
            });
        }
        Ok(reply.to_owned())
    }
}
