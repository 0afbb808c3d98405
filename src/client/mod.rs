//! SMTP client
//!
//! Line-oriented I/O over a [`NetworkStream`], one reply parser on the read
//! side and a group-at-a-time write scheduler on the write side.

use std::{
    fmt::Display,
    io::{self, BufRead, BufReader, Write},
    net::Shutdown,
    sync::Arc,
    time::Duration,
};

use crate::{
    commands::{Noop, Quit},
    error::{self, Error},
    event::{Direction, Monitor},
    pipeline::CommandQueue,
    response::{parse_response, Response},
    util::escape_crlf,
};

pub mod mock;
pub mod net;

pub use self::net::{NetworkStream, TlsParameters};

/// Structure that implements the SMTP client
pub struct Connection {
    /// TCP stream between client and server
    stream: BufReader<NetworkStream>,
    /// Whether QUIT has been sent
    sent_quit: bool,
    monitor: Option<Arc<dyn Monitor>>,
    monitor_headers_only: bool,
}

impl Connection {
    /// Wraps an established stream
    pub fn new(stream: NetworkStream) -> Connection {
        Connection {
            stream: BufReader::new(stream),
            sent_quit: false,
            monitor: None,
            monitor_headers_only: false,
        }
    }

    pub(crate) fn set_monitor(&mut self, monitor: Arc<dyn Monitor>, headers_only: bool) {
        self.monitor = Some(monitor);
        self.monitor_headers_only = headers_only;
    }

    /// Set the per-reply deadline
    pub fn set_timeout(&mut self, duration: Option<Duration>) -> io::Result<()> {
        self.stream.get_mut().set_read_timeout(duration)?;
        self.stream.get_mut().set_write_timeout(duration)
    }

    /// Tells if the underlying stream is currently encrypted
    pub fn is_encrypted(&self) -> bool {
        self.stream.get_ref().is_encrypted()
    }

    /// Upgrades the underlying stream to TLS in place
    pub fn upgrade_tls(&mut self, tls_parameters: &TlsParameters) -> io::Result<()> {
        self.stream.get_mut().upgrade_tls(tls_parameters)
    }

    /// Checks if the server is connected using the NOOP SMTP command
    pub fn test_connected(&mut self) -> bool {
        self.command(Noop).is_ok()
    }

    /// Sends QUIT
    pub fn quit(&mut self) -> Result<Response, Error> {
        self.sent_quit = true;
        self.command(Quit)
    }

    /// Best-effort QUIT then close, for every exit path
    pub fn abort(&mut self) {
        if !self.sent_quit {
            let _ = self.quit();
        }
        let _ = self.stream.get_ref().shutdown(Shutdown::Both);
    }

    /// Sends an SMTP command and reads the reply.
    ///
    /// Negative replies are returned like positive ones; only transport
    /// and parse problems are errors. Status classification is the
    /// caller's.
    pub fn command<C: Display>(&mut self, command: C) -> Result<Response, Error> {
        self.write_all_monitored(command.to_string().as_bytes())?;
        self.flush()?;
        self.read_response()
    }

    /// True when reply octets are already buffered, so a read will not
    /// block. The batch scheduler consults this to drain early.
    pub(crate) fn can_read_without_blocking(&self) -> bool {
        !self.stream.buffer().is_empty()
    }

    /// Issues a queue of commands, grouped per RFC 2920, and pairs every
    /// reply with the tag of the command that produced it, in issue order
    pub(crate) fn dispatch<T>(
        &mut self,
        queue: CommandQueue<T>,
        pipelining: bool,
    ) -> Result<Vec<(T, Response)>, Error> {
        let mut results = Vec::with_capacity(queue.len());

        for group in queue.into_groups(pipelining) {
            let mut responses = Vec::with_capacity(group.len());
            let mut written = 0;

            for item in &group {
                self.write_all_monitored(item.text.as_bytes())?;
                written += 1;
                // A server whose transmit window filled up replies before
                // the whole batch is out; drain early rather than
                // deadlocking both windows.
                while responses.len() + 1 < written && self.can_read_without_blocking() {
                    responses.push(self.read_response()?);
                }
            }
            self.flush()?;
            while responses.len() < group.len() {
                responses.push(self.read_response()?);
            }

            for (item, response) in group.into_iter().zip(responses) {
                results.push((item.tag, response));
            }
        }

        Ok(results)
    }

    /// Writes one chunk of the DATA payload, without flushing.
    ///
    /// A headers-only monitor is not shown body octets.
    pub(crate) fn write_payload(&mut self, chunk: &[u8], is_header: bool) -> Result<(), Error> {
        if let Some(monitor) = &self.monitor {
            if (is_header || !self.monitor_headers_only)
                && !monitor.on_traffic(Direction::Write, chunk)
            {
                return Err(error::cancelled("monitor requested abort"));
            }
        }
        self.stream
            .get_mut()
            .write_all(chunk)
            .map_err(error::network)
    }

    /// Writes raw command-level octets (the DATA terminator), monitored
    pub(crate) fn write_raw(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.write_all_monitored(chunk)
    }

    pub(crate) fn flush(&mut self) -> Result<(), Error> {
        self.stream.get_mut().flush().map_err(error::network)
    }

    fn write_all_monitored(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if let Some(monitor) = &self.monitor {
            if !monitor.on_traffic(Direction::Write, chunk) {
                return Err(error::cancelled("monitor requested abort"));
            }
        }
        self.stream
            .get_mut()
            .write_all(chunk)
            .map_err(error::network)?;

        tracing::debug!("Wrote: {}", escape_crlf(&String::from_utf8_lossy(chunk)));
        Ok(())
    }

    /// Gets the SMTP response
    pub fn read_response(&mut self) -> Result<Response, Error> {
        let mut buffer = String::with_capacity(100);

        while self.read_line(&mut buffer)? > 0 {
            match parse_response(&buffer) {
                Ok((_remaining, response)) => {
                    return Ok(response);
                }
                Err(nom::Err::Incomplete(_)) => { /* read more */ }
                Err(nom::Err::Failure(e)) => {
                    return Err(error::response(e.to_string()));
                }
                Err(nom::Err::Error(e)) => {
                    return Err(error::response(e.to_string()));
                }
            }
        }

        Err(error::response("incomplete response"))
    }

    fn read_line(&mut self, buffer: &mut String) -> Result<usize, Error> {
        let before = buffer.len();
        let read = self
            .stream
            .read_line(buffer)
            .map_err(error::network)?;
        if read > 0 {
            let line = &buffer[before..];
            if let Some(monitor) = &self.monitor {
                if !monitor.on_traffic(Direction::Read, line.as_bytes()) {
                    return Err(error::cancelled("monitor requested abort"));
                }
            }
            tracing::debug!("<< {}", escape_crlf(line));
        }
        Ok(read)
    }
}
