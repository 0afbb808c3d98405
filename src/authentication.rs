//! Provides limited SASL authentication mechanisms

use std::fmt::{self, Debug, Display, Formatter};

use crate::error::{self, Error};

/// Accepted authentication mechanisms on an encrypted connection
/// Trying LOGIN last as it is deprecated.
pub const DEFAULT_MECHANISMS: &[Mechanism] = &[Mechanism::Plain, Mechanism::Login];

/// Contains user credentials
#[derive(PartialEq, Eq, Clone, Hash)]
pub struct Credentials {
    authentication_identity: String,
    secret: String,
}

impl Credentials {
    /// Create a `Credentials` struct from username and password
    pub fn new(username: String, password: String) -> Credentials {
        Credentials {
            authentication_identity: username,
            secret: password,
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Do not leak the secret through logs
        f.debug_struct("Credentials")
            .field("authentication_identity", &self.authentication_identity)
            .finish_non_exhaustive()
    }
}

impl<S: Into<String>, T: Into<String>> From<(S, T)> for Credentials {
    fn from((username, password): (S, T)) -> Credentials {
        Credentials::new(username.into(), password.into())
    }
}

/// Represents authentication mechanisms
#[derive(PartialEq, Eq, Copy, Clone, Hash, Debug)]
pub enum Mechanism {
    /// PLAIN authentication mechanism
    /// RFC 4616: https://tools.ietf.org/html/rfc4616
    Plain,
    /// LOGIN authentication mechanism
    /// Obsolete but needed for some providers (like office365)
    /// https://www.ietf.org/archive/id/draft-murchison-sasl-login-00.txt
    Login,
    /// Non-standard XOAUTH2 mechanism
    /// https://developers.google.com/gmail/imap/xoauth2-protocol
    Xoauth2,
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Mechanism::Plain => "PLAIN",
            Mechanism::Login => "LOGIN",
            Mechanism::Xoauth2 => "XOAUTH2",
        })
    }
}

impl Mechanism {
    /// Does the mechanism supports initial response
    pub fn supports_initial_response(&self) -> bool {
        match *self {
            Mechanism::Plain | Mechanism::Xoauth2 => true,
            Mechanism::Login => false,
        }
    }

    /// Returns the response to send to the server, using the provided
    /// username, password and challenge in some cases
    pub fn response(
        &self,
        credentials: &Credentials,
        challenge: Option<&str>,
    ) -> Result<String, Error> {
        match *self {
            Mechanism::Plain => match challenge {
                Some(_) => Err(error::client("This mechanism does not expect a challenge")),
                None => Ok(format!(
                    "\u{0}{}\u{0}{}",
                    credentials.authentication_identity, credentials.secret
                )),
            },
            Mechanism::Login => {
                let decoded_challenge =
                    challenge.ok_or_else(|| error::client("This mechanism does expect a challenge"))?;

                if ["User Name", "Username:", "Username"].contains(&decoded_challenge) {
                    return Ok(credentials.authentication_identity.to_string());
                }

                if ["Password", "Password:"].contains(&decoded_challenge) {
                    return Ok(credentials.secret.to_string());
                }

                Err(error::client("Unrecognized challenge"))
            }
            Mechanism::Xoauth2 => match challenge {
                Some(_) => Err(error::client("This mechanism does not expect a challenge")),
                None => Ok(format!(
                    "user={}\x01auth=Bearer {}\x01\x01",
                    credentials.authentication_identity, credentials.secret
                )),
            },
        }
    }
}

/// The SASL collaborator driving an AUTH exchange.
///
/// The session engine owns the wire protocol (`AUTH`, 334 challenges,
/// base64 framing); the collaborator owns mechanism selection and the
/// challenge/response computation. [`Credentials`] paired with a mechanism
/// preference list is the built-in implementation; anything speaking a
/// richer SASL dialect can be injected instead.
pub trait SaslClient {
    /// Picks a mechanism from the list the server advertised, or `None`
    /// when no offered mechanism is acceptable
    fn select_mechanism(&self, offered: &[String]) -> Option<String>;

    /// The initial response to send with the AUTH command itself, when the
    /// chosen mechanism has one
    fn initial_response(&mut self, mechanism: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Computes the response to one decoded server challenge
    fn step(&mut self, mechanism: &str, challenge: &[u8]) -> Result<Vec<u8>, Error>;
}

/// `Credentials` with a mechanism preference list, the default
/// [`SaslClient`]
pub(crate) struct CredentialsClient {
    pub(crate) credentials: Credentials,
    pub(crate) mechanisms: Vec<Mechanism>,
}

impl CredentialsClient {
    fn mechanism_by_name(&self, name: &str) -> Option<Mechanism> {
        self.mechanisms
            .iter()
            .copied()
            .find(|m| m.to_string().eq_ignore_ascii_case(name))
    }
}

impl SaslClient for CredentialsClient {
    fn select_mechanism(&self, offered: &[String]) -> Option<String> {
        self.mechanisms
            .iter()
            .find(|preference| {
                offered
                    .iter()
                    .any(|name| preference.to_string().eq_ignore_ascii_case(name))
            })
            .map(Mechanism::to_string)
    }

    fn initial_response(&mut self, mechanism: &str) -> Result<Option<Vec<u8>>, Error> {
        let mechanism = self
            .mechanism_by_name(mechanism)
            .ok_or_else(|| error::client("Unknown mechanism"))?;
        if mechanism.supports_initial_response() {
            Ok(Some(
                mechanism.response(&self.credentials, None)?.into_bytes(),
            ))
        } else {
            Ok(None)
        }
    }

    fn step(&mut self, mechanism: &str, challenge: &[u8]) -> Result<Vec<u8>, Error> {
        let mechanism = self
            .mechanism_by_name(mechanism)
            .ok_or_else(|| error::client("Unknown mechanism"))?;
        let challenge = std::str::from_utf8(challenge).map_err(error::client)?;
        Ok(mechanism
            .response(&self.credentials, Some(challenge))?
            .into_bytes())
    }
}
