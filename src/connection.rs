use crate::protocol::{AirCodec, Request, Response};
use futures::{SinkExt as _, StreamExt as _};
use std::time::Duration;
use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lookup of `{1}` failed")]
    LookupHost(#[source] std::io::Error, String),
    #[error("could not connect to `{1}` over TCP")]
    Connect(#[source] std::io::Error, String),
    #[error("not connected to the unit")]
    NotConnected,
    #[error("could not send out the request")]
    Send(#[source] std::io::Error),
    #[error("could not read the reply from the stream")]
    Receive(#[source] std::io::Error),
    #[error("the unit closed the connection before replying")]
    Closed,
    #[error("the unit did not reply within {}", humantime::format_duration(*.0))]
    ReadTimeout(Duration),
}

#[derive(clap::Parser, Clone)]
#[group(id = "connection::Args")]
pub struct Args {
    /// Host name or address of the unit's communication module.
    #[arg(long, short = 'a')]
    pub address: String,

    /// TCP port the communication module serves the register protocol on.
    #[arg(long, default_value_t = crate::protocol::DEVICE_PORT)]
    pub port: u16,

    /// Consider a request failed if the reply does not arrive in this amount
    /// of time.
    ///
    /// A failed request is retried once over a fresh connection.
    #[arg(long, default_value = "30s")]
    pub read_timeout: humantime::Duration,

    /// Wait for replies indefinitely, as the vendor's own PC tool does.
    #[arg(long)]
    pub no_read_timeout: bool,
}

type AirIo = Framed<TcpStream, AirCodec>;

/// One TCP connection to the unit and the request/response exchange over it.
///
/// The protocol carries no transaction identifiers, so a reply can only be
/// matched to its request by strict ordering on a dedicated connection. The
/// whole write+read pair runs under one lock; at most one request is in
/// flight at a time.
pub struct Connection {
    address: String,
    port: u16,
    read_timeout: Option<Duration>,
    io: tokio::sync::Mutex<Option<AirIo>>,
}

impl Connection {
    pub fn new(args: &Args) -> Connection {
        let read_timeout = (!args.no_read_timeout).then_some(*args.read_timeout);
        Connection::with_address(args.address.clone(), args.port, read_timeout)
    }

    pub fn with_address(
        address: impl Into<String>,
        port: u16,
        read_timeout: Option<Duration>,
    ) -> Connection {
        Connection {
            address: address.into(),
            port,
            read_timeout,
            io: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn connect(&self) -> Result<(), Error> {
        let io = self.open_stream().await?;
        *self.io.lock().await = Some(io);
        Ok(())
    }

    /// Close the connection if one is open.
    ///
    /// Best-effort cleanup: close-time I/O errors are discarded, and calling
    /// this while already disconnected does nothing.
    pub async fn disconnect(&self) {
        let Some(mut io) = self.io.lock().await.take() else {
            return;
        };
        let shutdown_result = io.get_mut().shutdown().await;
        trace!(message = "closed the connection", is_error = ?shutdown_result.err());
    }

    /// Send `request` and wait for the unit's reply, reconnecting and
    /// retrying once if the exchange fails.
    ///
    /// The reconnect and the retry happen under the same lock as the first
    /// attempt. A failure of the retry is fatal for this call and surfaces
    /// to the caller; nothing retries further.
    pub async fn send_robust_request(&self, request: &Request) -> Result<Response, Error> {
        let mut io = self.io.lock().await;
        match self.exchange(&mut io, request).await {
            Ok(response) => Ok(response),
            Err(error) => {
                warn!(
                    message = "request failed, reconnecting for one retry",
                    error = (&error as &dyn std::error::Error)
                );
                *io = Some(self.open_stream().await?);
                self.exchange(&mut io, request).await
            }
        }
    }

    async fn exchange(
        &self,
        io: &mut Option<AirIo>,
        request: &Request,
    ) -> Result<Response, Error> {
        let io = io.as_mut().ok_or(Error::NotConnected)?;
        io.send(request).await.map_err(Error::Send)?;
        let reply = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, io.next())
                .await
                .map_err(|_| Error::ReadTimeout(limit))?,
            None => io.next().await,
        };
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(Error::Receive(error)),
            None => Err(Error::Closed),
        }
    }

    async fn open_stream(&self) -> Result<AirIo, Error> {
        info!(message = "connecting...", address = self.address.as_str(), port = self.port);
        let addresses = tokio::net::lookup_host((self.address.as_str(), self.port))
            .await
            .map_err(|e| Error::LookupHost(e, self.address.clone()))?
            .collect::<Vec<_>>();
        debug!(message = "resolved", ?addresses);
        let socket = TcpStream::connect(&*addresses)
            .await
            .map_err(|e| Error::Connect(e, self.address.clone()))?;
        let nodelay_result = socket.set_nodelay(true);
        trace!(message = "setting nodelay", is_error = ?nodelay_result.err());
        info!(message = "connected");
        Ok(Framed::new(socket, AirCodec {}))
    }
}
