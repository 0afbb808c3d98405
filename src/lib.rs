//! Facteur is a client-side mail submission library. It hands a complete
//! SMTP session (one connection carrying one or more messages, each with
//! one or more recipients) to a submission server, and records a
//! structured status for the session, for every message and for every
//! recipient.
//!
//! It implements the SMTP submission profile with the PIPELINING, SIZE,
//! 8BITMIME, STARTTLS, AUTH, DSN, ENHANCEDSTATUSCODES and DELIVERBY
//! extensions, negotiated from the server's EHLO response.
//!
//! ```rust,no_run
//! use facteur::{Address, Session};
//!
//! # fn main() -> Result<(), facteur::Error> {
//! let mut session = Session::new();
//! session.set_server("mail.example.org")?;
//!
//! let message = session.add_message();
//! message.set_reverse_path(Some("alice@example.org".parse().unwrap()));
//! message.add_recipient("bob@example.net".parse::<Address>().unwrap());
//! message.set_body_bytes("Subject: hi\r\n\r\nhello\r\n");
//!
//! session.start_session()?;
//!
//! for message in session.messages() {
//!     for recipient in message.recipients() {
//!         println!("{}: {}", recipient.mailbox(), recipient.status());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    unsafe_code
)]

pub mod address;
pub mod authentication;
pub mod client;
pub mod commands;
pub mod error;
pub mod event;
pub mod extension;
mod headers;
mod pipeline;
pub mod response;
pub mod session;
pub mod source;
pub mod status;
mod transaction;
mod util;

pub use crate::{
    address::Address,
    authentication::{Credentials, Mechanism, SaslClient},
    client::{NetworkStream, TlsParameters},
    error::Error,
    event::{Direction, Event, EventListener, Monitor},
    extension::{ClientId, Extension, ServerInfo},
    session::{
        BodyKind, ByMode, DeliverBy, DsnRet, Message, Notify, Recipient, Session, TlsPolicy,
    },
    source::BodySource,
    status::{Status, StatusKind},
};

/// Default relay port
pub const SMTP_PORT: u16 = 25;

/// Default submission port
pub const SUBMISSION_PORT: u16 = 587;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
