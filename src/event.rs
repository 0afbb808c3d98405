//! Observability hooks
//!
//! Two optional callbacks: an [`EventListener`] told about protocol state
//! transitions, and a [`Monitor`] shown every octet on the wire. Both are
//! invoked re-entrantly from within `start_session`, on the calling thread.

/// A protocol state transition reported to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// The transport is connected
    Connect,
    /// The server greeting was read
    Greeting,
    /// EHLO (or the HELO fallback) completed and capabilities are known
    Hello,
    /// The connection was upgraded to TLS
    StartTls,
    /// The AUTH exchange completed successfully
    Authenticated,
    /// A MAIL FROM reply was recorded
    MailFrom,
    /// A RCPT TO reply was recorded
    RcptTo,
    /// The server accepted DATA and the payload is about to flow
    Data,
    /// A message transaction finished, successfully or not
    MessageDone,
    /// RSET was issued to abandon a transaction
    Reset,
    /// QUIT was sent
    Quit,
    /// The transport is closed
    Disconnect,
}

/// Receives [`Event`] notifications during a session
pub trait EventListener {
    /// Called at each state transition
    fn on_event(&self, event: Event);
}

/// Direction of monitored traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Octets read from the server
    Read,
    /// Octets written to the server
    Write,
}

/// Observes the raw octet stream, for protocol tracing.
///
/// When the monitor was registered headers-only, message bodies are
/// withheld and only command traffic and message headers are reported.
pub trait Monitor {
    /// Called with every monitored buffer before it is interpreted.
    ///
    /// Returning `false` cancels the session: a best-effort QUIT, then
    /// close.
    fn on_traffic(&self, direction: Direction, octets: &[u8]) -> bool;
}
