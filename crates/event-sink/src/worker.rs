// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Message intake.
//!
//! [`run`] pulls one message at a time from a [`MessageReader`] and awaits the
//! [`Handler`] before reading the next, so a slow flush applies backpressure to
//! the input. Cancellation is only checked between messages, which lets an
//! in-flight flush finish before the worker stops.
//!
//! Standard input is read on its own OS thread and handed over through a
//! channel. A blocked read there cannot hold up runtime shutdown.

use async_trait::async_trait;
use std::fmt::Debug;
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::thread;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::InputError;

// Largest UDP payload.
const DATAGRAM_BUFFER_SIZE: usize = 65_535;
// Lines read ahead of the handler on a blocking input.
const LINE_CHANNEL_CAPACITY: usize = 64;

#[async_trait]
pub trait Handler: Send {
    /// Processes one raw message. Failures are handled and logged inside.
    async fn handle(&mut self, msg: &[u8]);

    /// Called once when the input ends or the worker is cancelled.
    async fn shutdown(&mut self);
}

/// Source of raw messages.
pub enum MessageReader {
    /// Newline-delimited messages from a byte stream.
    Lines(Box<dyn AsyncBufRead + Send + Unpin>),
    /// Newline-delimited messages read on a dedicated thread.
    Blocking(mpsc::Receiver<io::Result<Vec<u8>>>),
    /// One message per datagram.
    Udp(UdpSocket),
}

impl Debug for MessageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageReader::Lines(_) => write!(f, "Lines"),
            MessageReader::Blocking(_) => write!(f, "Blocking"),
            MessageReader::Udp(socket) => write!(f, "Udp({:?})", socket.local_addr().ok()),
        }
    }
}

impl MessageReader {
    /// Opens the input named on the command line: `-` or `stdin` for standard
    /// input, or `udp://host:port` to bind a UDP socket.
    pub async fn open(input: &str) -> Result<Self, InputError> {
        if input == "-" || input == "stdin" {
            return Self::stdin();
        }
        let Some(addr) = input.strip_prefix("udp://") else {
            return Err(InputError::Unsupported(input.to_string()));
        };
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| InputError::Unsupported(input.to_string()))?;
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening for events on udp://{}", socket.local_addr()?);
        Ok(Self::Udp(socket))
    }

    pub fn stdin() -> Result<Self, InputError> {
        Self::from_blocking("stdin-reader", io::BufReader::new(io::stdin()))
    }

    /// Reads lines from `reader` on a new thread. The thread ends at EOF, on a
    /// read error or once the returned reader is dropped and a line arrives.
    pub fn from_blocking<R: BufRead + Send + 'static>(
        name: &str,
        mut reader: R,
    ) -> Result<Self, InputError> {
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                let mut line = Vec::new();
                let next = match BufRead::read_until(&mut reader, b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => Ok(line),
                    Err(e) => Err(e),
                };
                let failed = next.is_err();
                if tx.blocking_send(next).is_err() || failed {
                    break;
                }
            })?;
        Ok(Self::Blocking(rx))
    }

    pub fn from_reader<R: AsyncBufRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self::Lines(Box::new(reader))
    }

    /// Returns the next message, or `None` once the input is exhausted.
    /// Blank lines are skipped and a trailing `\r\n` is removed.
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>, InputError> {
        match self {
            MessageReader::Lines(reader) => loop {
                let mut line = Vec::new();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    return Ok(None);
                }
                if let Some(msg) = trim_line(line) {
                    return Ok(Some(msg));
                }
            },
            MessageReader::Blocking(rx) => loop {
                let Some(line) = rx.recv().await else {
                    return Ok(None);
                };
                if let Some(msg) = trim_line(line?) {
                    return Ok(Some(msg));
                }
            },
            MessageReader::Udp(socket) => {
                let mut buf = vec![0; DATAGRAM_BUFFER_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                debug!("Received {amt} bytes from {src}");
                buf.truncate(amt);
                Ok(Some(buf))
            }
        }
    }
}

/// Strips the line terminator. Blank lines yield `None`.
fn trim_line(mut line: Vec<u8>) -> Option<Vec<u8>> {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    (!line.is_empty()).then_some(line)
}

/// Drives `handler` until the input ends or `cancel` fires, then calls
/// [`Handler::shutdown`]. A read error stops the worker after shutdown.
pub async fn run<H: Handler>(
    mut reader: MessageReader,
    handler: &mut H,
    cancel: CancellationToken,
) -> Result<(), InputError> {
    let result = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Shutdown requested, stopping intake");
                break Ok(());
            }
            next = reader.read() => next,
        };
        match next {
            Ok(Some(msg)) => handler.handle(&msg).await,
            Ok(None) => {
                info!("Input closed");
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };
    handler.shutdown().await;
    result
}
