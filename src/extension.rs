//! ESMTP features

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    net::{Ipv4Addr, Ipv6Addr},
    result::Result,
};

use crate::{
    error::{self, Error},
    response::Response,
    util::XText,
};

/// Client identifier, the parameter to `EHLO`
#[derive(PartialEq, Eq, Clone, Debug)]
#[non_exhaustive]
pub enum ClientId {
    /// A fully-qualified domain name
    Domain(String),
    /// An IPv4 address
    Ipv4(Ipv4Addr),
    /// An IPv6 address
    Ipv6(Ipv6Addr),
}

const LOCALHOST_CLIENT: ClientId = ClientId::Ipv4(Ipv4Addr::new(127, 0, 0, 1));

impl Default for ClientId {
    fn default() -> Self {
        // https://tools.ietf.org/html/rfc5321#section-4.1.4
        //
        // The SMTP client MUST, if possible, ensure that the domain parameter
        // to the EHLO command is a primary host name as specified for this
        // command in Section 2.3.5.  If this is not possible (e.g., when the
        // client's address is dynamically assigned and the client does not have
        // an obvious name), an address literal SHOULD be substituted for the
        // domain name.
        hostname::get()
            .ok()
            .and_then(|s| s.into_string().map(Self::Domain).ok())
            .unwrap_or(LOCALHOST_CLIENT)
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Domain(ref value) => f.write_str(value),
            Self::Ipv4(ref value) => write!(f, "[{value}]"),
            Self::Ipv6(ref value) => write!(f, "[IPv6:{value}]"),
        }
    }
}

impl ClientId {
    /// The domain part used when deriving default `Message-ID` values
    pub(crate) fn domain(&self) -> String {
        match self {
            Self::Domain(value) => value.clone(),
            Self::Ipv4(value) => value.to_string(),
            Self::Ipv6(value) => value.to_string(),
        }
    }
}

/// Supported ESMTP keywords
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum Extension {
    /// PIPELINING keyword
    ///
    /// Defined in [RFC 2920](https://tools.ietf.org/html/rfc2920)
    Pipelining,
    /// SIZE keyword
    ///
    /// Defined in [RFC 1870](https://tools.ietf.org/html/rfc1870)
    Size,
    /// 8BITMIME keyword
    ///
    /// Defined in [RFC 6152](https://tools.ietf.org/html/rfc6152)
    EightBitMime,
    /// STARTTLS keyword
    ///
    /// Defined in [RFC 3207](https://tools.ietf.org/html/rfc3207)
    StartTls,
    /// AUTH keyword
    ///
    /// Defined in [RFC 4954](https://tools.ietf.org/html/rfc4954)
    Auth,
    /// DSN keyword
    ///
    /// Defined in [RFC 3461](https://tools.ietf.org/html/rfc3461)
    Dsn,
    /// ENHANCEDSTATUSCODES keyword
    ///
    /// Defined in [RFC 2034](https://tools.ietf.org/html/rfc2034)
    EnhancedStatusCodes,
    /// DELIVERBY keyword
    ///
    /// Defined in [RFC 2852](https://tools.ietf.org/html/rfc2852)
    DeliverBy,
    /// ETRN keyword
    ///
    /// Defined in [RFC 1985](https://tools.ietf.org/html/rfc1985)
    Etrn,
}

impl Display for Extension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Extension::Pipelining => f.write_str("PIPELINING"),
            Extension::Size => f.write_str("SIZE"),
            Extension::EightBitMime => f.write_str("8BITMIME"),
            Extension::StartTls => f.write_str("STARTTLS"),
            Extension::Auth => f.write_str("AUTH"),
            Extension::Dsn => f.write_str("DSN"),
            Extension::EnhancedStatusCodes => f.write_str("ENHANCEDSTATUSCODES"),
            Extension::DeliverBy => f.write_str("DELIVERBY"),
            Extension::Etrn => f.write_str("ETRN"),
        }
    }
}

/// Contains information about an SMTP server, built from its EHLO response
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ServerInfo {
    /// Server name
    ///
    /// The name given in the server banner
    name: String,
    /// ESMTP features supported by the server
    ///
    /// It contains the features supported by the server and known by the `Extension` module.
    features: HashSet<Extension>,
    /// The maximum message size declared with SIZE, when one was declared
    size_max: Option<u64>,
    /// AUTH mechanism names, in the order the server listed them
    auth_mechanisms: Vec<String>,
    /// The minimum by-time declared with DELIVERBY, in seconds
    deliverby_min: Option<u64>,
    /// Keywords this module does not recognize, kept verbatim
    unknown: Vec<String>,
}

impl Display for ServerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let features = if self.features.is_empty() {
            "no supported features".to_string()
        } else {
            format!("{:?}", self.features)
        };
        write!(f, "{} with {}", self.name, features)
    }
}

impl ServerInfo {
    /// Parses an EHLO response to create a `ServerInfo`
    pub fn from_response(response: &Response) -> Result<ServerInfo, Error> {
        let name = match response.first_word() {
            Some(name) => name,
            None => return Err(error::response("Could not read server name")),
        };

        let mut info = ServerInfo {
            name: name.to_string(),
            ..Default::default()
        };

        for line in response.message().skip(1) {
            if line.is_empty() {
                continue;
            }

            let mut split = line.split_whitespace();
            let keyword = split.next().unwrap();
            match keyword {
                "PIPELINING" => {
                    info.features.insert(Extension::Pipelining);
                }
                "SIZE" => {
                    info.features.insert(Extension::Size);
                    // "SIZE 0" means no fixed limit
                    info.size_max = split
                        .next()
                        .and_then(|v| v.parse::<u64>().ok())
                        .filter(|v| *v > 0);
                }
                "8BITMIME" => {
                    info.features.insert(Extension::EightBitMime);
                }
                "STARTTLS" => {
                    info.features.insert(Extension::StartTls);
                }
                "DSN" => {
                    info.features.insert(Extension::Dsn);
                }
                "ENHANCEDSTATUSCODES" => {
                    info.features.insert(Extension::EnhancedStatusCodes);
                }
                "DELIVERBY" => {
                    info.features.insert(Extension::DeliverBy);
                    info.deliverby_min = split.next().and_then(|v| v.parse::<u64>().ok());
                }
                "ETRN" => {
                    info.features.insert(Extension::Etrn);
                }
                "AUTH" => {
                    info.features.insert(Extension::Auth);
                    info.auth_mechanisms
                        .extend(split.map(|mechanism| mechanism.to_string()));
                }
                _ => {
                    // Some servers announce "AUTH=PLAIN LOGIN" for ancient
                    // clients; treat it like the standard form.
                    if let Some(mechanisms) = keyword.strip_prefix("AUTH=") {
                        info.features.insert(Extension::Auth);
                        info.auth_mechanisms.push(mechanisms.to_string());
                        info.auth_mechanisms
                            .extend(split.map(|mechanism| mechanism.to_string()));
                    } else {
                        info.unknown.push(line.to_string());
                    }
                }
            };
        }

        Ok(info)
    }

    /// Checks if the server supports an ESMTP feature
    pub fn supports_feature(&self, keyword: Extension) -> bool {
        self.features.contains(&keyword)
    }

    /// Checks if the server supports an AUTH mechanism
    pub fn supports_auth_mechanism(&self, mechanism: &str) -> bool {
        self.auth_mechanisms.iter().any(|m| m == mechanism)
    }

    /// The AUTH mechanism names the server advertised
    pub fn auth_mechanisms(&self) -> &[String] {
        &self.auth_mechanisms
    }

    /// The maximum message size the server declared with SIZE, if any
    pub fn size_max(&self) -> Option<u64> {
        self.size_max
    }

    /// The minimum by-time the server declared with DELIVERBY, in seconds
    pub fn deliverby_min(&self) -> Option<u64> {
        self.deliverby_min
    }

    /// EHLO keywords this module did not recognize, verbatim
    pub fn unknown_features(&self) -> &[String] {
        &self.unknown
    }

    /// The name given in the server banner
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }
}

/// The `RET` parameter to `MAIL FROM`, from the DSN extension
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DsnRet {
    /// Return the full message in the notification
    Full,
    /// Return the headers only
    Hdrs,
}

impl Display for DsnRet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            DsnRet::Full => f.write_str("FULL"),
            DsnRet::Hdrs => f.write_str("HDRS"),
        }
    }
}

/// The DSN `NOTIFY` conditions for one recipient
///
/// With no condition set this renders as `NOTIFY=NEVER`.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub struct Notify {
    /// Notify on successful delivery
    pub success: bool,
    /// Notify on delivery failure
    pub failure: bool,
    /// Notify on delivery delay
    pub delay: bool,
}

impl Notify {
    /// Suppress all delivery status notifications for the recipient
    pub const NEVER: Notify = Notify {
        success: false,
        failure: false,
        delay: false,
    };
}

impl Display for Notify {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if *self == Notify::NEVER {
            return f.write_str("NEVER");
        }
        let mut sep = "";
        for (set, name) in [
            (self.success, "SUCCESS"),
            (self.failure, "FAILURE"),
            (self.delay, "DELAY"),
        ] {
            if set {
                write!(f, "{sep}{name}")?;
                sep = ",";
            }
        }
        Ok(())
    }
}

/// The `BY` delivery mode, from the DELIVERBY extension
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ByMode {
    /// Issue a delayed DSN if the deadline passes
    Notify,
    /// Return the message if the deadline passes
    Return,
}

impl Display for ByMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            ByMode::Notify => f.write_str("N"),
            ByMode::Return => f.write_str("R"),
        }
    }
}

/// A message deadline, the `BY` parameter to `MAIL FROM`
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeliverBy {
    /// Seconds until the deadline, possibly negative
    pub time: i64,
    /// What the server should do when the deadline passes
    pub mode: ByMode,
    /// Request trace information (the `T` modifier)
    pub trace: bool,
}

/// A `MAIL FROM` extension parameter
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum MailParameter {
    /// `BODY` parameter
    Body(MailBodyParameter),
    /// `SIZE` parameter
    Size(u64),
    /// `RET` parameter
    Ret(DsnRet),
    /// `ENVID` parameter
    Envid(String),
    /// `BY` parameter
    By(DeliverBy),
    /// Custom parameter
    Other {
        /// Parameter keyword
        keyword: String,
        /// Parameter value
        value: Option<String>,
    },
}

impl Display for MailParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            MailParameter::Body(ref value) => write!(f, "BODY={value}"),
            MailParameter::Size(size) => write!(f, "SIZE={size}"),
            MailParameter::Ret(ret) => write!(f, "RET={ret}"),
            MailParameter::Envid(ref envid) => write!(f, "ENVID={}", XText(envid)),
            MailParameter::By(by) => {
                write!(f, "BY={};{}", by.time, by.mode)?;
                if by.trace {
                    f.write_str("T")?;
                }
                Ok(())
            }
            MailParameter::Other {
                ref keyword,
                value: Some(ref value),
            } => write!(f, "{}={}", keyword, XText(value)),
            MailParameter::Other {
                ref keyword,
                value: None,
            } => f.write_str(keyword),
        }
    }
}

/// Values for the `BODY` parameter to `MAIL FROM`
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub enum MailBodyParameter {
    /// `7BIT`
    SevenBit,
    /// `8BITMIME`
    EightBitMime,
}

impl Display for MailBodyParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            MailBodyParameter::SevenBit => f.write_str("7BIT"),
            MailBodyParameter::EightBitMime => f.write_str("8BITMIME"),
        }
    }
}

/// A `RCPT TO` extension parameter
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum RcptParameter {
    /// `NOTIFY` parameter
    Notify(Notify),
    /// `ORCPT` parameter
    Orcpt {
        /// The address type, usually `rfc822`
        address_type: String,
        /// The original recipient address, xtext-encoded on the wire
        address: String,
    },
    /// Custom parameter
    Other {
        /// Parameter keyword
        keyword: String,
        /// Parameter value
        value: Option<String>,
    },
}

impl Display for RcptParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            RcptParameter::Notify(notify) => write!(f, "NOTIFY={notify}"),
            RcptParameter::Orcpt {
                ref address_type,
                ref address,
            } => write!(f, "ORCPT={};{}", address_type, XText(address)),
            RcptParameter::Other {
                ref keyword,
                value: Some(ref value),
            } => write!(f, "{}={}", keyword, XText(value)),
            RcptParameter::Other {
                ref keyword,
                value: None,
            } => f.write_str(keyword),
        }
    }
}
