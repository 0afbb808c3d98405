//! SMTP commands

use std::fmt::{self, Display, Formatter};

use crate::{
    address::Address,
    extension::{ClientId, MailParameter, RcptParameter},
};

/// EHLO command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Ehlo {
    client_id: ClientId,
}

impl Display for Ehlo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EHLO {}\r\n", self.client_id)
    }
}

impl Ehlo {
    /// Creates a EHLO command
    pub fn new(client_id: ClientId) -> Ehlo {
        Ehlo { client_id }
    }
}

/// HELO command, the fallback greeting for servers rejecting EHLO
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Helo {
    client_id: ClientId,
}

impl Display for Helo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HELO {}\r\n", self.client_id)
    }
}

impl Helo {
    /// Creates a HELO command
    pub fn new(client_id: ClientId) -> Helo {
        Helo { client_id }
    }
}

/// STARTTLS command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Starttls;

impl Display for Starttls {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("STARTTLS\r\n")
    }
}

/// MAIL command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Mail {
    sender: Option<Address>,
    parameters: Vec<MailParameter>,
}

impl Display for Mail {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAIL FROM:<{}>",
            self.sender.as_ref().map_or("", |s| s.as_ref())
        )?;
        for parameter in &self.parameters {
            write!(f, " {parameter}")?;
        }
        f.write_str("\r\n")
    }
}

impl Mail {
    /// Creates a MAIL command
    ///
    /// A `None` sender is the empty reverse path, `MAIL FROM:<>`
    pub fn new(sender: Option<Address>, parameters: Vec<MailParameter>) -> Mail {
        Mail { sender, parameters }
    }
}

/// RCPT command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Rcpt {
    recipient: Address,
    parameters: Vec<RcptParameter>,
}

impl Display for Rcpt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RCPT TO:<{}>", self.recipient)?;
        for parameter in &self.parameters {
            write!(f, " {parameter}")?;
        }
        f.write_str("\r\n")
    }
}

impl Rcpt {
    /// Creates an RCPT command
    pub fn new(recipient: Address, parameters: Vec<RcptParameter>) -> Rcpt {
        Rcpt {
            recipient,
            parameters,
        }
    }
}

/// DATA command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Data;

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("DATA\r\n")
    }
}

/// QUIT command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Quit;

impl Display for Quit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("QUIT\r\n")
    }
}

/// NOOP command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Noop;

impl Display for Noop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("NOOP\r\n")
    }
}

/// RSET command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Rset;

impl Display for Rset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("RSET\r\n")
    }
}

/// AUTH command, with an optional base64-encoded initial response
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Auth {
    mechanism: String,
    initial_response: Option<String>,
}

impl Display for Auth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.initial_response {
            Some(initial) => write!(f, "AUTH {} {}\r\n", self.mechanism, initial),
            None => write!(f, "AUTH {}\r\n", self.mechanism),
        }
    }
}

impl Auth {
    /// Creates an AUTH command
    pub fn new(mechanism: String, initial_response: Option<String>) -> Auth {
        Auth {
            mechanism,
            initial_response,
        }
    }
}

/// One base64-encoded reply in an AUTH challenge exchange
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct AuthResponse(pub String);

impl Display for AuthResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.0)
    }
}

/// The `*` line cancelling an AUTH exchange
///
/// [RFC 4954, section 4](https://tools.ietf.org/html/rfc4954#section-4)
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct AuthCancel;

impl Display for AuthCancel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("*\r\n")
    }
}

/// Whether a command may be grouped with its successors without an
/// intervening reply read.
///
/// [RFC 2920, section 3.1](https://tools.ietf.org/html/rfc2920#section-3.1):
/// only RSET, MAIL, RCPT, SEND, SOML, SAML and VRFY may appear anywhere but
/// last in a pipelined group; everything else is a synchronization point.
pub(crate) fn is_pipelinable(command: &str) -> bool {
    let verb = command
        .split(|c| c == ' ' || c == '\r')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(
        verb.as_str(),
        "RSET" | "MAIL" | "RCPT" | "SEND" | "SOML" | "SAML" | "VRFY"
    )
}
