//! Structured delivery status for sessions, messages and recipients

use std::fmt::{self, Display, Formatter};

use crate::{
    error::Error,
    response::{EnhancedCode, Response, Severity},
};

/// Classification of a recorded status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusKind {
    /// The protocol never reached this level
    #[default]
    Pending,
    /// 2xx completion
    Ok,
    /// 4xx reply, or no reply within the deadline
    TransientFailure,
    /// 5xx reply
    PermanentFailure,
    /// Malformed reply, missing required extension or payload violation
    ProtocolError,
    /// DNS, socket or TLS failure
    LocalError,
}

impl StatusKind {
    /// The classification of a failure that produced no reply
    pub(crate) fn from_error(e: &Error) -> StatusKind {
        if e.is_timeout() {
            StatusKind::TransientFailure
        } else if e.is_response() || e.is_protocol() {
            StatusKind::ProtocolError
        } else {
            StatusKind::LocalError
        }
    }
}

impl Display for StatusKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusKind::Pending => "pending",
            StatusKind::Ok => "ok",
            StatusKind::TransientFailure => "transient failure",
            StatusKind::PermanentFailure => "permanent failure",
            StatusKind::ProtocolError => "protocol error",
            StatusKind::LocalError => "local error",
        })
    }
}

/// The outcome recorded at one level of a session.
///
/// Holds the SMTP reply code, the RFC 3463 enhanced status code when the
/// server provided one, the reply text and a classification. A status
/// synthesized by the library (a failure that produced no reply) carries
/// code `0`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    code: u16,
    enhanced: Option<EnhancedCode>,
    text: String,
    kind: StatusKind,
}

impl Status {
    /// The SMTP reply code, or `0` when no reply was involved
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The enhanced status code, when the server advertised
    /// ENHANCEDSTATUSCODES and supplied one
    pub fn enhanced_code(&self) -> Option<&EnhancedCode> {
        self.enhanced.as_ref()
    }

    /// The reply text, joined across continuation lines
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Classification of this status
    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    /// True once something has been recorded
    pub fn is_set(&self) -> bool {
        self.kind != StatusKind::Pending
    }

    /// Clears the status back to pending
    pub fn reset(&mut self) {
        *self = Status::default();
    }

    pub(crate) fn from_reply(response: &Response, enhanced: bool) -> Status {
        let kind = match response.code().severity() {
            Severity::PositiveCompletion | Severity::PositiveIntermediate => StatusKind::Ok,
            Severity::TransientNegativeCompletion => StatusKind::TransientFailure,
            Severity::PermanentNegativeCompletion => StatusKind::PermanentFailure,
        };
        Status {
            code: response.code().into(),
            enhanced: if enhanced { response.enhanced_code() } else { None },
            text: response.message().collect::<Vec<_>>().join(" "),
            kind,
        }
    }

    /// A reply recorded with a caller-imposed classification (a greeting
    /// that was not 220 is a local error whatever its class)
    pub(crate) fn from_reply_with_kind(
        response: &Response,
        enhanced: bool,
        kind: StatusKind,
    ) -> Status {
        Status {
            kind,
            ..Status::from_reply(response, enhanced)
        }
    }

    pub(crate) fn synthesized(kind: StatusKind, text: impl Into<String>) -> Status {
        Status {
            code: 0,
            enhanced: None,
            text: text.into(),
            kind,
        }
    }

    pub(crate) fn timeout() -> Status {
        Status::synthesized(StatusKind::TransientFailure, "no reply within the deadline")
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{} ({})", self.kind, self.text)
        } else if let Some(enhanced) = &self.enhanced {
            write!(f, "{} {} {}", self.code, enhanced, self.text)
        } else {
            write!(f, "{} {}", self.code, self.text)
        }
    }
}
