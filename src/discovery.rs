use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, Result};
use crate::types::DeviceEndpoint;
use futures_util::future::join_all;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};

/// Any routable host; only used to ask the OS which local address it would pick
const ROUTE_PROBE_TARGET: &str = "8.8.8.8:53";

/// Host numbers probed on the /24 network
const FIRST_HOST: u8 = 1;
const LAST_HOST: u8 = 253;

/// Finds the receiver on the local /24 network
///
/// Every host is probed with a plain TCP connect on the control port. The
/// socket is closed as soon as the connect succeeds or fails; no data is
/// exchanged.
///
/// # Example
///
/// ```no_run
/// use sony_av::{Locator, ReceiverConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let locator = Locator::new(&ReceiverConfig::default());
///     let endpoint = locator.locate().await?;
///     println!("Receiver at {}", endpoint);
///     Ok(())
/// }
/// ```
pub struct Locator {
    port: u16,
    probe_timeout: Duration,
    local_address: Option<Ipv4Addr>,
}

impl Locator {
    pub fn new(config: &ReceiverConfig) -> Self {
        Self {
            port: config.port,
            probe_timeout: config.probe_timeout,
            local_address: config.local_address,
        }
    }

    /// Scan the network of the local address
    pub async fn locate(&self) -> Result<DeviceEndpoint> {
        let local = match self.local_address {
            Some(addr) => addr,
            None => local_ipv4().await?,
        };
        let [a, b, c, _] = local.octets();
        tracing::info!(local = %local, "Searching for receiver on {}.{}.{}.0/24", a, b, c);

        self.scan_subnet([a, b, c]).await
    }

    /// Probe hosts `.1` to `.253` of the given /24 network concurrently
    ///
    /// If several hosts answer, the highest address wins and a warning is
    /// logged; only one receiver per network is supported.
    pub async fn scan_subnet(&self, prefix: [u8; 3]) -> Result<DeviceEndpoint> {
        let [a, b, c] = prefix;
        let probes = (FIRST_HOST..=LAST_HOST)
            .map(|host| SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, host)), self.port))
            .map(|addr| probe(addr, self.probe_timeout));

        let found: Vec<SocketAddr> = join_all(probes).await.into_iter().flatten().collect();

        let addr = match found.as_slice() {
            [] => {
                return Err(ReceiverError::NoDeviceFound {
                    network: format!("{}.{}.{}.0/24", a, b, c),
                })
            }
            [only] => *only,
            [.., last] => {
                tracing::warn!(
                    candidates = ?found,
                    "Several hosts answer on port {}, using {}",
                    self.port,
                    last
                );
                *last
            }
        };

        tracing::info!(addr = %addr, "Detected receiver");
        Ok(DeviceEndpoint::new(addr.ip(), addr.port()))
    }
}

/// Connect to `addr` and close again; `Some(addr)` if the host accepted
async fn probe(addr: SocketAddr, timeout: Duration) -> Option<SocketAddr> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Some(addr)
        }
        Ok(Err(e)) => {
            tracing::trace!(addr = %addr, error = %e, "Probe refused");
            None
        }
        Err(_) => None,
    }
}

/// The local IPv4 address whose /24 network is scanned
///
/// The first non-loopback interface address wins. The route lookup is the
/// fallback when interfaces cannot be listed or none is usable.
pub async fn local_ipv4() -> Result<Ipv4Addr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            if let Some(ip) = first_usable_ipv4(interfaces.iter().map(|iface| iface.ip())) {
                tracing::debug!(local = %ip, "Using interface address");
                return Ok(ip);
            }
            tracing::debug!("No usable interface address, falling back to route lookup");
        }
        Err(e) => {
            tracing::debug!(error = %e, "Cannot list interfaces, falling back to route lookup");
        }
    }
    routed_ipv4().await
}

fn first_usable_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(ip) if is_usable(ip) => Some(ip),
        _ => None,
    })
}

fn is_usable(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}

/// The address the OS picks for outgoing traffic
///
/// Connecting a UDP socket sends nothing; it only selects a route.
async fn routed_ipv4() -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(ReceiverError::LocalAddress)?;
    socket
        .connect(ROUTE_PROBE_TARGET)
        .await
        .map_err(ReceiverError::LocalAddress)?;

    match socket.local_addr().map_err(ReceiverError::LocalAddress)?.ip() {
        IpAddr::V4(ip) if is_usable(ip) => Ok(ip),
        other => Err(ReceiverError::LocalAddress(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no usable IPv4 address, got {}", other),
        ))),
    }
}
