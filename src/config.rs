//! Socket configuration consumed by every endpoint.
//!
//! No CLI/config-file harness is carried; this is a plain, typed,
//! builder-style struct with setter methods per option.

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};

/// Per-probe keep-alive tuning.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    pub time: Duration,
    pub interval: Duration,
    pub retries: u32,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            time: Duration::from_secs(60),
            interval: Duration::from_secs(10),
            retries: 3,
        }
    }
}

/// Socket-level configuration shared by every stream/datagram endpoint.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub dual_stack: bool,
    pub reuse_address: bool,
    pub exclusive_address_use: bool,
    pub keep_alive: Option<KeepAlive>,
    pub no_delay: bool,
    pub send_buffer_size: Option<usize>,
    pub receive_buffer_size: Option<usize>,
    /// 0 (represented as `None`) means unlimited.
    pub send_buffer_limit: Option<usize>,
    /// 0 (represented as `None`) means unlimited.
    pub receive_buffer_limit: Option<usize>,
    pub accept_backlog: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            dual_stack: false,
            reuse_address: true,
            exclusive_address_use: false,
            keep_alive: Some(KeepAlive::default()),
            no_delay: true,
            send_buffer_size: None,
            receive_buffer_size: None,
            send_buffer_limit: None,
            receive_buffer_limit: Some(64 * 1024 * 1024),
            accept_backlog: 1024,
        }
    }
}

impl SocketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dual_stack(mut self, enabled: bool) -> Self {
        self.dual_stack = enabled;
        self
    }

    pub fn reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }

    pub fn exclusive_address_use(mut self, enabled: bool) -> Self {
        self.exclusive_address_use = enabled;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Option<KeepAlive>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }

    pub fn send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = Some(size);
        self
    }

    pub fn send_buffer_limit(mut self, limit: usize) -> Self {
        self.send_buffer_limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn receive_buffer_limit(mut self, limit: usize) -> Self {
        self.receive_buffer_limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn accept_backlog(mut self, backlog: u32) -> Self {
        self.accept_backlog = backlog;
        self
    }

    /// Applies the socket-level options this config carries to a connected
    /// TCP stream: no-delay, keep-alive, and send/receive buffer sizes.
    pub fn apply_to_tcp(&self, stream: &tokio::net::TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.no_delay)?;

        let sock = SockRef::from(stream);
        match &self.keep_alive {
            Some(keep_alive) => {
                let tcp_keepalive =
                    TcpKeepalive::new().with_time(keep_alive.time).with_interval(keep_alive.interval);
                sock.set_tcp_keepalive(&tcp_keepalive)?;
            }
            None => sock.set_keepalive(false)?,
        }
        if let Some(size) = self.send_buffer_size {
            sock.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.receive_buffer_size {
            sock.set_recv_buffer_size(size)?;
        }
        Ok(())
    }

    /// Builds a listening socket honoring `reuse_address`,
    /// `exclusive_address_use`, `dual_stack`, and `accept_backlog`, then
    /// hands it to tokio as a non-blocking [`tokio::net::TcpListener`].
    pub fn bind_listener(&self, addr: SocketAddr) -> std::io::Result<tokio::net::TcpListener> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        if addr.is_ipv6() {
            socket.set_only_v6(!self.dual_stack)?;
        }
        socket.set_reuse_address(self.reuse_address && !self.exclusive_address_use)?;
        socket.bind(&addr.into())?;
        socket.listen(self.accept_backlog as i32)?;
        tokio::net::TcpListener::from_std(socket.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_listener_honors_accept_backlog_and_accepts_connections() {
        let config = SocketConfig::default().accept_backlog(16);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = config.bind_listener(addr).unwrap();
        let local_addr = listener.local_addr().unwrap();

        let client = tokio::net::TcpStream::connect(local_addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        config.apply_to_tcp(&server_side).unwrap();
        drop(client);
    }

    #[tokio::test]
    async fn apply_to_tcp_accepts_disabled_keep_alive() {
        let config = SocketConfig::default().keep_alive(None);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = config.bind_listener(addr).unwrap();
        let local_addr = listener.local_addr().unwrap();

        let client = tokio::net::TcpStream::connect(local_addr).await.unwrap();
        config.apply_to_tcp(&client).unwrap();
    }
}
