use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::anyhow;
use bytes::{Buf, BytesMut};
use log::debug;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::Instant,
};

use super::{Field, Message, Packet};
use crate::Result;

const PORT_LOOKUP_PORT: u16 = 12523;
const PORT_LOOKUP_REQUEST: &[u8] = b"\x00\x00\x00\x0fRemoteDBServer\x00";
const RETRY_DELAYS_MS: &[u64] = &[1_000, 2_000, 3_000];

/// Looks up the TCP port a player's database server is listening on.
/// The lookup service lives at a fixed, well-known port; the server
/// itself moves around, so every player has to be asked individually.
///
/// Retries up to three times with an increasing delay, since a player
/// that has just appeared on the network may not have its lookup
/// service up yet.
pub(crate) async fn discover_port(ip: &[u8; 4]) -> Result<u16> {
    let addr = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])),
        PORT_LOOKUP_PORT,
    );

    let mut last_err = None;
    for delay_ms in [0].iter().chain(RETRY_DELAYS_MS.iter()) {
        if *delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match try_discover_port(&addr).await {
            Ok(port) => return Ok(port),
            Err(e) => {
                debug!("dbserver port lookup at {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("dbserver port lookup failed").into()))
}

/// A reply of `0xffff` means the player's database server isn't ready
/// yet; the caller should back off and try again rather than treat it
/// as a usable port.
const PORT_NOT_READY: u16 = 0xffff;

async fn try_discover_port(addr: &SocketAddr) -> Result<u16> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(PORT_LOOKUP_REQUEST).await?;
    let port = stream.read_u16().await?;
    if port == PORT_NOT_READY {
        return Err(anyhow!("dbserver at {} is not ready yet", addr).into());
    }
    Ok(port)
}

/// A pooled connection to one player's database server, posing as a
/// borrowed device number the way a CDJ poses as a fellow CDJ when it
/// wants to browse another player's media.
pub(crate) struct Connection {
    stream: TcpStream,
    buf: BytesMut,
    tx_id: u32,
    last_used: Instant,
}

impl Connection {
    async fn connect(addr: &SocketAddr, posing_as: u8) -> Result<Connection> {
        let mut stream = TcpStream::connect(addr).await?;

        // Greeting: a single 4-byte field both sides echo back verbatim.
        let greeting = Packet::new().with_field(Field::U32(0x1)).to_bytes()?;
        stream.write_all(&greeting).await?;
        let mut buf = [0; 4096];
        let len = stream.read(&mut buf).await?;
        if buf[0..len] != greeting[..] {
            return Err(anyhow!("unexpected dbserver greeting reply").into());
        }

        let mut conn = Connection {
            stream,
            buf: BytesMut::with_capacity(4096),
            tx_id: 0,
            last_used: Instant::now(),
        };

        // Setup: tell the server which device number we're posing as. It
        // replies with a menu-available message whose second argument
        // echoes the device number it accepted us as.
        conn.send_message(super::message_type::SETUP, vec![Field::U32(posing_as as u32)])
            .await?;
        let response = conn.read_message().await?;
        if response.ty != super::message_type::MEDIA_RESPONSE {
            return Err(anyhow!(
                "dbserver setup: unexpected response type 0x{:04x}",
                response.ty
            )
            .into());
        }
        if response.num_args != 2 {
            return Err(anyhow!(
                "dbserver setup: expected 2 response args, got {}",
                response.num_args
            )
            .into());
        }
        if response.arg_u32(1)? != posing_as as u32 {
            return Err(anyhow!("dbserver setup rejected our device number").into());
        }

        Ok(conn)
    }

    pub(crate) async fn send_message(&mut self, ty: u16, args: Vec<Field>) -> Result<()> {
        self.tx_id += 1;
        let mut msg_buf = Vec::new();
        Message::new(self.tx_id, ty, args)?.encode(&mut msg_buf)?;
        self.stream.write_all(&msg_buf).await?;
        self.last_used = Instant::now();
        Ok(())
    }

    // Framing follows https://tokio.rs/tokio/tutorial/framing: parse what's
    // buffered, topping up from the socket only when a full message isn't
    // available yet.
    pub(crate) async fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = self.parse_message()? {
                self.last_used = Instant::now();
                return Ok(msg);
            }

            if 0 == self.stream.read_buf(&mut self.buf).await? {
                return Err(anyhow!("dbserver connection reset by peer").into());
            }
        }
    }

    fn parse_message(&mut self) -> Result<Option<Message>> {
        let buf = &self.buf[..];
        let (len, msg) = match Message::parse(buf) {
            Ok((rest, msg)) => (buf.len() - rest.len(), msg),
            Err(nom::Err::Incomplete(_)) => return Ok(None),
            Err(e) => return Err(anyhow!("error parsing dbserver message: {}", e).into()),
        };
        self.buf.advance(len);
        Ok(Some(msg))
    }

    fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }
}

/// One pool per device, reusing a connection across requests and posing
/// as whichever device number the caller was assigned rather than
/// opening a fresh socket for every menu walk.
pub(crate) struct ConnectionManager {
    posing_as: u8,
    idle_limit: Duration,
    // Keyed by IP, not device number: devices in a compound unit (e.g. a
    // CDJ and an attached controller) share one dbserver.
    ports: HashMap<[u8; 4], u16>,
    connections: HashMap<u8, Connection>,
}

impl ConnectionManager {
    pub(crate) fn new(posing_as: u8, idle_limit: Duration) -> ConnectionManager {
        ConnectionManager {
            posing_as,
            idle_limit,
            ports: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    /// Borrows (connecting first if necessary) the pooled connection for
    /// `device_num` at `ip`.
    pub(crate) async fn get(&mut self, device_num: u8, ip: &[u8; 4]) -> Result<&mut Connection> {
        if !self.connections.contains_key(&device_num) {
            let port = match self.ports.get(ip) {
                Some(port) => *port,
                None => {
                    let port = discover_port(ip).await?;
                    self.ports.insert(*ip, port);
                    port
                }
            };

            let addr = SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])),
                port,
            );
            let conn = Connection::connect(&addr, self.posing_as).await?;
            self.connections.insert(device_num, conn);
        }

        Ok(self.connections.get_mut(&device_num).unwrap())
    }

    /// Drops connections idle for longer than the configured limit.
    /// Called periodically by the owning task, not on a timer of its own.
    pub(crate) fn sweep_idle(&mut self) {
        let idle_limit = self.idle_limit;
        self.connections
            .retain(|_, conn| conn.idle_for() < idle_limit);
    }

    /// Forgets a device's connection, e.g. because it left the network.
    /// The port cache is left alone since other devices at the same IP
    /// may still be relying on it.
    pub(crate) fn forget(&mut self, device_num: u8) {
        self.connections.remove(&device_num);
    }
}
