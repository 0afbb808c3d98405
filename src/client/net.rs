//! The underlying network stream

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, ErrorKind, Read, Write},
    net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream, ToSocketAddrs},
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};

use crate::{
    client::mock::MockStream,
    error::{self, Error},
};

/// Parameters for a STARTTLS upgrade
#[derive(Clone)]
pub struct TlsParameters {
    connector: TlsConnector,
    domain: String,
}

impl TlsParameters {
    /// Creates parameters verifying certificates against `domain`
    pub fn new(domain: String) -> Result<TlsParameters, Error> {
        let connector = TlsConnector::new().map_err(error::tls)?;
        Ok(TlsParameters { connector, domain })
    }

    /// Creates parameters around an already-configured connector
    pub fn new_with_connector(connector: TlsConnector, domain: String) -> TlsParameters {
        TlsParameters { connector, domain }
    }

    /// The server name presented during the handshake
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Debug for TlsParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsParameters")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Represents the different types of underlying network streams
pub enum NetworkStream {
    /// Plain TCP stream
    Tcp(TcpStream),
    /// Encrypted TCP stream
    Tls(Box<TlsStream<TcpStream>>),
    /// Mock stream
    Mock(MockStream),
}

impl Debug for NetworkStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkStream::Tcp(_) => "NetworkStream::Tcp",
            NetworkStream::Tls(_) => "NetworkStream::Tls",
            NetworkStream::Mock(_) => "NetworkStream::Mock",
        })
    }
}

impl NetworkStream {
    /// Opens a TCP connection to the server
    pub fn connect<A: ToSocketAddrs>(
        server: A,
        timeout: Option<Duration>,
    ) -> io::Result<NetworkStream> {
        let mut last_err = None;

        for addr in server.to_socket_addrs()? {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(NetworkStream::Tcp(stream)),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(ErrorKind::NotFound, "could not resolve hostname")
        }))
    }

    /// Upgrades to a TLS connection in place
    pub fn upgrade_tls(&mut self, tls_parameters: &TlsParameters) -> io::Result<()> {
        *self = match self {
            NetworkStream::Tcp(ref mut stream) => {
                let tcp_stream = stream.try_clone()?;
                match tls_parameters
                    .connector
                    .connect(&tls_parameters.domain, tcp_stream)
                {
                    Ok(tls_stream) => NetworkStream::Tls(Box::new(tls_stream)),
                    Err(err) => return Err(io::Error::new(ErrorKind::Other, err)),
                }
            }
            NetworkStream::Tls(_) => return Ok(()),
            NetworkStream::Mock(_) => return Ok(()),
        };

        Ok(())
    }

    /// Is the stream encrypted
    pub fn is_encrypted(&self) -> bool {
        match *self {
            NetworkStream::Tcp(_) => false,
            NetworkStream::Tls(_) => true,
            NetworkStream::Mock(_) => false,
        }
    }

    /// Returns peer's address
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match *self {
            NetworkStream::Tcp(ref s) => s.peer_addr(),
            NetworkStream::Tls(ref s) => s.get_ref().peer_addr(),
            NetworkStream::Mock(_) => Ok(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(127, 0, 0, 1),
                80,
            ))),
        }
    }

    /// Shutdowns the connection
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match *self {
            NetworkStream::Tcp(ref s) => s.shutdown(how),
            NetworkStream::Tls(ref s) => s.get_ref().shutdown(how),
            NetworkStream::Mock(_) => Ok(()),
        }
    }

    /// Set read timeout for IO calls
    pub fn set_read_timeout(&mut self, duration: Option<Duration>) -> io::Result<()> {
        match *self {
            NetworkStream::Tcp(ref mut stream) => stream.set_read_timeout(duration),
            NetworkStream::Tls(ref mut stream) => stream.get_ref().set_read_timeout(duration),
            NetworkStream::Mock(_) => Ok(()),
        }
    }

    /// Set write timeout for IO calls
    pub fn set_write_timeout(&mut self, duration: Option<Duration>) -> io::Result<()> {
        match *self {
            NetworkStream::Tcp(ref mut stream) => stream.set_write_timeout(duration),
            NetworkStream::Tls(ref mut stream) => stream.get_ref().set_write_timeout(duration),
            NetworkStream::Mock(_) => Ok(()),
        }
    }
}

impl Read for NetworkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            NetworkStream::Tcp(ref mut s) => s.read(buf),
            NetworkStream::Tls(ref mut s) => s.read(buf),
            NetworkStream::Mock(ref mut s) => s.read(buf),
        }
    }
}

impl Write for NetworkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            NetworkStream::Tcp(ref mut s) => s.write(buf),
            NetworkStream::Tls(ref mut s) => s.write(buf),
            NetworkStream::Mock(ref mut s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            NetworkStream::Tcp(ref mut s) => s.flush(),
            NetworkStream::Tls(ref mut s) => s.flush(),
            NetworkStream::Mock(ref mut s) => s.flush(),
        }
    }
}
