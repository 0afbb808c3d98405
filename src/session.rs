//! The session: configuration, the message/recipient model, and the engine
//! driving one connection from greeting to QUIT

use std::{any::Any, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::{
    address::Address,
    authentication::{Credentials, CredentialsClient, SaslClient, DEFAULT_MECHANISMS},
    client::{Connection, NetworkStream, TlsParameters},
    commands::{Auth, AuthCancel, AuthResponse, Ehlo, Helo, Starttls},
    error::{self, Error},
    event::{Event, EventListener, Monitor},
    extension::{ClientId, Extension, ServerInfo},
    headers::HeaderTable,
    source::BodySource,
    status::{Status, StatusKind},
    transaction::{self, TransactionContext},
    SUBMISSION_PORT,
};

pub use crate::extension::{ByMode, DeliverBy, DsnRet, MailBodyParameter as BodyKind, Notify};

/// When to upgrade the connection with STARTTLS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Never use TLS
    None,
    /// Use TLS when the server offers it, continue in cleartext otherwise
    ///
    /// Default mode.
    #[default]
    Opportunistic,
    /// Abort the session unless the connection can be encrypted
    Required,
}

/// One SMTP submission session.
///
/// A session is configured, loaded with messages, executed once with
/// [`Session::start_session`], and then inspected: every message and every
/// recipient carries the status the server gave it. After resetting the
/// statuses a session may be executed again; each execution establishes a
/// fresh connection.
pub struct Session {
    host: Option<String>,
    port: u16,
    hello_name: ClientId,
    messages: Vec<Message>,
    tls: TlsPolicy,
    tls_parameters: Option<TlsParameters>,
    sasl: Option<Box<dyn SaslClient>>,
    auth_required: bool,
    timeout: Option<Duration>,
    require_all_recipients: bool,
    event_listener: Option<Arc<dyn EventListener>>,
    monitor: Option<Arc<dyn Monitor>>,
    monitor_headers_only: bool,
    status: Status,
    application_data: Option<Box<dyn Any>>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    /// Creates an empty session
    pub fn new() -> Session {
        Session {
            host: None,
            port: SUBMISSION_PORT,
            hello_name: ClientId::default(),
            messages: Vec::new(),
            tls: TlsPolicy::default(),
            tls_parameters: None,
            sasl: None,
            auth_required: false,
            timeout: Some(Duration::from_secs(60)),
            require_all_recipients: false,
            event_listener: None,
            monitor: None,
            monitor_headers_only: false,
            status: Status::default(),
            application_data: None,
        }
    }

    /// Sets the submission server as `host[:service]`
    ///
    /// The service may be a port number or one of the well-known service
    /// names; it defaults to `submission` (port 587).
    pub fn set_server(&mut self, hostport: &str) -> Result<(), Error> {
        let (host, service) = match hostport.rsplit_once(':') {
            Some((host, service)) => (host, Some(service)),
            None => (hostport, None),
        };
        if host.is_empty() {
            return Err(error::client("empty server host"));
        }
        self.port = match service {
            Some(service) => service_port(service)?,
            None => SUBMISSION_PORT,
        };
        self.host = Some(host.to_string());
        Ok(())
    }

    /// Sets the identity announced with EHLO
    ///
    /// Defaults to the local hostname.
    pub fn set_hello_name(&mut self, name: ClientId) {
        self.hello_name = name;
    }

    /// Sets the per-reply deadline; `None` waits forever
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Sets the STARTTLS policy
    pub fn set_tls(&mut self, policy: TlsPolicy) {
        self.tls = policy;
    }

    /// Overrides the TLS configuration used for STARTTLS
    ///
    /// Without this, certificates are verified against the server host.
    pub fn set_tls_parameters(&mut self, parameters: TlsParameters) {
        self.tls_parameters = Some(parameters);
    }

    /// Authenticates with these credentials, trying the built-in
    /// mechanisms the server also offers
    pub fn set_credentials<C: Into<Credentials>>(&mut self, credentials: C) {
        self.sasl = Some(Box::new(CredentialsClient {
            credentials: credentials.into(),
            mechanisms: DEFAULT_MECHANISMS.to_vec(),
        }));
    }

    /// Authenticates through an injected SASL implementation
    pub fn set_sasl_client(&mut self, sasl: Box<dyn SaslClient>) {
        self.sasl = Some(sasl);
    }

    /// Fails the session when the server does not offer AUTH
    pub fn require_authentication(&mut self) {
        self.auth_required = true;
    }

    /// Abandons a message when any of its recipients is rejected
    ///
    /// Some applications can't handle one recipient from many failing;
    /// with this set, a partially rejected message is not sent at all.
    pub fn require_all_recipients(&mut self, state: bool) {
        self.require_all_recipients = state;
    }

    /// Registers a state-transition callback
    pub fn set_event_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.event_listener = Some(listener);
    }

    /// Registers a wire monitor; with `headers_only` set, message bodies
    /// are withheld from it
    pub fn set_monitor(&mut self, monitor: Arc<dyn Monitor>, headers_only: bool) {
        self.monitor = Some(monitor);
        self.monitor_headers_only = headers_only;
    }

    /// Appends an empty message to the session
    pub fn add_message(&mut self) -> &mut Message {
        self.messages.push(Message::new());
        self.messages.last_mut().unwrap()
    }

    /// The messages, in submission order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// The messages, mutable
    pub fn messages_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.messages.iter_mut()
    }

    /// The session-level status
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Clears the session-level status
    pub fn reset_status(&mut self) {
        self.status.reset();
    }

    /// Attaches application data to the session, returning the previous
    /// value
    pub fn set_application_data(&mut self, data: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.application_data.replace(data)
    }

    /// The application data attached to the session
    pub fn application_data(&self) -> Option<&(dyn Any)> {
        self.application_data.as_deref()
    }

    /// Runs the session: connect, negotiate, submit every message, QUIT.
    ///
    /// Returns `Ok` when the protocol ran to completion, even if
    /// individual recipients or messages were rejected; those outcomes are
    /// read from the statuses. Returns `Err` when the session itself could
    /// not run or aborted, with the statuses of everything not attempted
    /// filled in.
    pub fn start_session(&mut self) -> Result<(), Error> {
        let host = match &self.host {
            Some(host) => host.clone(),
            None => return Err(error::client("no server configured")),
        };
        self.precheck()?;

        let stream = NetworkStream::connect((host.as_str(), self.port), self.timeout)
            .map_err(|e| self.fail(Status::synthesized(StatusKind::LocalError, e.to_string()), error::connection(e)))?;
        self.execute(stream)
    }

    /// Runs the session over an already-established stream.
    ///
    /// The greeting is expected first, like on a fresh connection.
    pub fn start_with_stream(&mut self, stream: NetworkStream) -> Result<(), Error> {
        self.precheck()?;
        self.execute(stream)
    }

    fn execute(&mut self, stream: NetworkStream) -> Result<(), Error> {
        let mut conn = Connection::new(stream);
        if let Some(monitor) = &self.monitor {
            conn.set_monitor(monitor.clone(), self.monitor_headers_only);
        }
        conn.set_timeout(self.timeout)
            .map_err(|e| self.fail(Status::synthesized(StatusKind::LocalError, e.to_string()), error::network(e)))?;

        self.emit(Event::Connect);
        let result = self.run(&mut conn);
        if result.is_err() {
            conn.abort();
            self.cascade_not_attempted();
        }
        self.emit(Event::Disconnect);
        result
    }

    /// Every message must have a body producer bound before the session
    /// starts
    fn precheck(&self) -> Result<(), Error> {
        if self.messages.iter().any(|m| m.body.is_none()) {
            return Err(error::client("message without a body producer"));
        }
        Ok(())
    }

    fn run(&mut self, conn: &mut Connection) -> Result<(), Error> {
        // GREETING
        let greeting = self.read_reply(conn)?;
        if !greeting.has_code(220) {
            let status = Status::from_reply_with_kind(&greeting, false, StatusKind::LocalError);
            return Err(self.fail(status, error::connection("unexpected greeting")));
        }
        self.emit(Event::Greeting);

        // EHLO
        let mut info = self.hello(conn)?;

        // STARTTLS, then EHLO again on the encrypted channel
        if self.wants_tls(&info)? {
            let response = self.command(conn, Starttls)?;
            if response.has_code(220) {
                let parameters = self.tls_parameters()?;
                conn.upgrade_tls(&parameters).map_err(|e| {
                    self.fail(
                        Status::synthesized(StatusKind::LocalError, e.to_string()),
                        error::tls(e),
                    )
                })?;
                tracing::debug!("connection encrypted");
                self.emit(Event::StartTls);
                info = self.hello(conn)?;
            } else if self.tls == TlsPolicy::Required {
                let status =
                    Status::from_reply_with_kind(&response, false, StatusKind::LocalError);
                return Err(self.fail(status, error::code(response.code(), response.first_line().map(str::to_owned))));
            }
            // Opportunistic refusal continues in cleartext
        }

        // AUTH, then re-fetch capabilities
        if self.sasl.is_some() && info.supports_feature(Extension::Auth) {
            self.authenticate(conn, &info)?;
            self.emit(Event::Authenticated);
            info = self.hello(conn)?;
        }

        // The advertised set must cover everything the configuration
        // depends on, before any MAIL is issued
        for required in self.required_extensions() {
            if !info.supports_feature(required) {
                let status = Status::synthesized(
                    StatusKind::ProtocolError,
                    format!("required extension {required} not available"),
                );
                return Err(self.fail(
                    status,
                    error::protocol(format!("required extension {required} not available")),
                ));
            }
        }

        // TRANSACT
        let ctx = TransactionContext {
            info: &info,
            require_all_recipients: self.require_all_recipients,
            hello_domain: self.hello_name.domain(),
            events: self.event_listener.clone(),
        };
        let mut fatal = None;
        for message in &mut self.messages {
            if let Err(e) = transaction::deliver(conn, message, &ctx) {
                fatal = Some(e);
                break;
            }
        }
        if let Some(e) = fatal {
            if !self.status.is_set() {
                self.status = Status::synthesized(
                    StatusKind::from_error(&e),
                    e.to_string(),
                );
            }
            return Err(e);
        }

        // QUIT
        self.emit(Event::Quit);
        self.status = match conn.quit() {
            Ok(response) => Status::from_reply(&response, false),
            Err(_) => Status::synthesized(StatusKind::Ok, "session completed"),
        };
        conn.abort();

        Ok(())
    }

    /// Sends EHLO and parses the capability set, falling back to HELO for
    /// servers that reject EHLO outright
    fn hello(&mut self, conn: &mut Connection) -> Result<ServerInfo, Error> {
        let mut response = self.command(conn, Ehlo::new(self.hello_name.clone()))?;

        if response.code().severity() == crate::response::Severity::PermanentNegativeCompletion {
            response = self.command(conn, Helo::new(self.hello_name.clone()))?;
        }

        if !response.is_positive() {
            let status = Status::from_reply(&response, false);
            return Err(self.fail(
                status,
                error::code(response.code(), response.first_line().map(str::to_owned)),
            ));
        }

        let info = ServerInfo::from_response(&response).map_err(|e| {
            self.fail(
                Status::synthesized(StatusKind::ProtocolError, e.to_string()),
                e,
            )
        })?;
        tracing::debug!("server {}", info);
        self.emit(Event::Hello);
        Ok(info)
    }

    fn wants_tls(&mut self, info: &ServerInfo) -> Result<bool, Error> {
        match self.tls {
            TlsPolicy::None => Ok(false),
            TlsPolicy::Opportunistic => Ok(info.supports_feature(Extension::StartTls)),
            TlsPolicy::Required => {
                if info.supports_feature(Extension::StartTls) {
                    Ok(true)
                } else {
                    let status = Status::synthesized(
                        StatusKind::LocalError,
                        "server does not offer STARTTLS",
                    );
                    Err(self.fail(status, error::protocol("server does not offer STARTTLS")))
                }
            }
        }
    }

    fn tls_parameters(&mut self) -> Result<TlsParameters, Error> {
        if let Some(parameters) = &self.tls_parameters {
            return Ok(parameters.clone());
        }
        let domain = self.host.clone().unwrap_or_else(|| "localhost".to_string());
        TlsParameters::new(domain).map_err(|e| {
            self.status = Status::synthesized(StatusKind::LocalError, e.to_string());
            e
        })
    }

    /// Runs the AUTH exchange with the configured SASL collaborator
    fn authenticate(&mut self, conn: &mut Connection, info: &ServerInfo) -> Result<(), Error> {
        let sasl = self.sasl.as_mut().unwrap();

        let mechanism = match sasl.select_mechanism(info.auth_mechanisms()) {
            Some(mechanism) => mechanism,
            None => {
                let status = Status::synthesized(
                    StatusKind::ProtocolError,
                    "no compatible authentication mechanism",
                );
                self.status = status;
                return Err(error::client(
                    "No compatible authentication mechanism was found",
                ));
            }
        };

        let initial = sasl
            .initial_response(&mechanism)?
            .map(|response| BASE64.encode(response));
        let mut response = conn
            .command(Auth::new(mechanism.clone(), initial))
            .map_err(|e| self.io_failure(e))?;

        // Limit challenges to avoid blocking
        let mut challenges = 10;
        while challenges > 0 && response.has_code(334) {
            challenges -= 1;

            let reply = match decode_challenge(&response) {
                Ok(challenge) => {
                    let sasl = self.sasl.as_mut().unwrap();
                    sasl.step(&mechanism, &challenge)
                }
                Err(e) => Err(e),
            };

            response = match reply {
                Ok(reply) => conn
                    .command(AuthResponse(BASE64.encode(reply)))
                    .map_err(|e| self.io_failure(e))?,
                Err(e) => {
                    // Cancel the exchange before giving up
                    let _ = conn.command(AuthCancel);
                    let status =
                        Status::synthesized(StatusKind::ProtocolError, e.to_string());
                    return Err(self.fail(status, e));
                }
            };
        }

        if challenges == 0 {
            let status =
                Status::synthesized(StatusKind::ProtocolError, "unexpected number of challenges");
            return Err(self.fail(status, error::response("Unexpected number of challenges")));
        }

        if response.has_code(235) {
            tracing::debug!("authenticated");
            Ok(())
        } else {
            let status = Status::from_reply(&response, false);
            Err(self.fail(
                status,
                error::code(response.code(), response.first_line().map(str::to_owned)),
            ))
        }
    }

    /// The extensions the session configuration depends on
    fn required_extensions(&self) -> Vec<Extension> {
        let mut required = Vec::new();
        let uses_dsn = self.messages.iter().any(|m| {
            m.dsn_ret.is_some()
                || m.dsn_envid.is_some()
                || m.recipients
                    .iter()
                    .any(|r| r.notify.is_some() || r.orcpt.is_some())
        });
        if uses_dsn {
            required.push(Extension::Dsn);
        }
        if self.messages.iter().any(|m| m.body_kind.is_some()) {
            required.push(Extension::EightBitMime);
        }
        if self.messages.iter().any(|m| m.deliver_by.is_some()) {
            required.push(Extension::DeliverBy);
        }
        if self.auth_required {
            required.push(Extension::Auth);
        }
        required
    }

    fn command<C: std::fmt::Display>(
        &mut self,
        conn: &mut Connection,
        command: C,
    ) -> Result<crate::response::Response, Error> {
        conn.command(command).map_err(|e| self.io_failure(e))
    }

    fn read_reply(&mut self, conn: &mut Connection) -> Result<crate::response::Response, Error> {
        conn.read_response().map_err(|e| self.io_failure(e))
    }

    /// Maps transport and parse failures onto the session status
    fn io_failure(&mut self, e: Error) -> Error {
        self.status = if e.is_timeout() {
            Status::timeout()
        } else {
            Status::synthesized(StatusKind::from_error(&e), e.to_string())
        };
        e
    }

    fn fail(&mut self, status: Status, e: Error) -> Error {
        self.status = status;
        e
    }

    /// Marks everything the aborted session never reached
    fn cascade_not_attempted(&mut self) {
        let kind = match self.status.kind() {
            StatusKind::Pending => StatusKind::LocalError,
            kind => kind,
        };
        for message in &mut self.messages {
            if !message.message_status.is_set() {
                message.message_status = Status::synthesized(kind, "not attempted");
            }
            for recipient in &mut message.recipients {
                if !recipient.status.is_set() {
                    recipient.status = Status::synthesized(kind, "not attempted");
                }
            }
        }
    }

    fn emit(&self, event: Event) {
        if let Some(listener) = &self.event_listener {
            listener.on_event(event);
        }
    }
}

fn decode_challenge(response: &crate::response::Response) -> Result<Vec<u8>, Error> {
    let encoded = response.first_word().unwrap_or("");
    BASE64.decode(encoded).map_err(error::response)
}

fn service_port(service: &str) -> Result<u16, Error> {
    if let Ok(port) = service.parse::<u16>() {
        return Ok(port);
    }
    match service {
        "submission" => Ok(SUBMISSION_PORT),
        "smtp" => Ok(crate::SMTP_PORT),
        "smtps" | "submissions" => Ok(465),
        _ => Err(error::client(format!("unknown service {service:?}"))),
    }
}

/// One message within a session
pub struct Message {
    pub(crate) reverse_path: Option<Address>,
    pub(crate) recipients: Vec<Recipient>,
    pub(crate) dsn_ret: Option<DsnRet>,
    pub(crate) dsn_envid: Option<String>,
    pub(crate) size_estimate: Option<u64>,
    pub(crate) body_kind: Option<BodyKind>,
    pub(crate) deliver_by: Option<DeliverBy>,
    pub(crate) headers: HeaderTable,
    pub(crate) body: Option<Box<dyn BodySource>>,
    pub(crate) reverse_path_status: Status,
    pub(crate) message_status: Status,
    application_data: Option<Box<dyn Any>>,
}

impl Message {
    fn new() -> Message {
        Message {
            reverse_path: None,
            recipients: Vec::new(),
            dsn_ret: None,
            dsn_envid: None,
            size_estimate: None,
            body_kind: None,
            deliver_by: None,
            headers: HeaderTable::new(),
            body: None,
            reverse_path_status: Status::default(),
            message_status: Status::default(),
            application_data: None,
        }
    }

    /// Sets the envelope sender; `None` is the empty reverse path used for
    /// bounce notifications, sent as `MAIL FROM:<>`
    pub fn set_reverse_path(&mut self, mailbox: Option<Address>) {
        self.reverse_path = mailbox;
    }

    /// The envelope sender
    pub fn reverse_path(&self) -> Option<&Address> {
        self.reverse_path.as_ref()
    }

    /// Appends a recipient
    pub fn add_recipient(&mut self, mailbox: Address) -> &mut Recipient {
        self.recipients.push(Recipient::new(mailbox));
        self.recipients.last_mut().unwrap()
    }

    /// The recipients, in `RCPT` issue order
    pub fn recipients(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter()
    }

    /// The recipients, mutable
    pub fn recipients_mut(&mut self) -> impl Iterator<Item = &mut Recipient> {
        self.recipients.iter_mut()
    }

    /// Sets or replaces a header; it overrides a producer-supplied header
    /// of the same name
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// The application-supplied header table
    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    /// Binds the body producer for this message
    pub fn set_body<B: BodySource + 'static>(&mut self, body: B) {
        self.body = Some(Box::new(body));
    }

    /// Binds an in-memory body
    pub fn set_body_bytes(&mut self, body: impl Into<Vec<u8>>) {
        self.set_body(std::io::Cursor::new(body.into()));
    }

    /// Declares the approximate message size, passed as `SIZE=` when the
    /// server supports it
    pub fn set_size_estimate(&mut self, size: u64) {
        self.size_estimate = Some(size);
    }

    /// Declares the body kind, passed as `BODY=`; requires the server to
    /// advertise 8BITMIME
    pub fn set_body_kind(&mut self, kind: BodyKind) {
        self.body_kind = Some(kind);
    }

    /// Requests full-message or headers-only bounces; requires DSN
    pub fn dsn_set_ret(&mut self, ret: DsnRet) {
        self.dsn_ret = Some(ret);
    }

    /// Sets the DSN envelope identifier; requires DSN
    pub fn dsn_set_envid(&mut self, envid: impl Into<String>) {
        self.dsn_envid = Some(envid.into());
    }

    /// Sets the delivery deadline; requires DELIVERBY.
    ///
    /// In return mode the deadline must be in the future.
    pub fn set_deliver_by(&mut self, deliver_by: DeliverBy) -> Result<(), Error> {
        if !(-999_999_999..=999_999_999).contains(&deliver_by.time) {
            return Err(error::client("deliver-by time out of range"));
        }
        if deliver_by.mode == ByMode::Return && deliver_by.time <= 0 {
            return Err(error::client("deliver-by return mode requires time > 0"));
        }
        self.deliver_by = Some(deliver_by);
        Ok(())
    }

    /// The status of the `MAIL FROM` exchange
    pub fn reverse_path_status(&self) -> &Status {
        &self.reverse_path_status
    }

    /// The status of the message as a whole, recorded after `DATA`
    pub fn status(&self) -> &Status {
        &self.message_status
    }

    /// Clears the message-level statuses
    pub fn reset_status(&mut self) {
        self.reverse_path_status.reset();
        self.message_status.reset();
    }

    /// Attaches application data to the message, returning the previous
    /// value
    pub fn set_application_data(&mut self, data: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.application_data.replace(data)
    }

    /// The application data attached to the message
    pub fn application_data(&self) -> Option<&(dyn Any)> {
        self.application_data.as_deref()
    }

}

/// One recipient of a message
pub struct Recipient {
    mailbox: Address,
    pub(crate) notify: Option<Notify>,
    pub(crate) orcpt: Option<(String, String)>,
    pub(crate) complete: bool,
    pub(crate) status: Status,
    application_data: Option<Box<dyn Any>>,
}

impl Recipient {
    fn new(mailbox: Address) -> Recipient {
        Recipient {
            mailbox,
            notify: None,
            orcpt: None,
            complete: false,
            status: Status::default(),
            application_data: None,
        }
    }

    /// The forward-path mailbox
    pub fn mailbox(&self) -> &Address {
        &self.mailbox
    }

    /// Sets the DSN notify conditions; requires DSN
    pub fn dsn_set_notify(&mut self, notify: Notify) {
        self.notify = Some(notify);
    }

    /// Sets the DSN original recipient; requires DSN
    pub fn dsn_set_orcpt(
        &mut self,
        address_type: impl Into<String>,
        address: impl Into<String>,
    ) {
        self.orcpt = Some((address_type.into(), address.into()));
    }

    /// True once the `RCPT` phase reached this recipient, whether it was
    /// accepted or rejected
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The status of this recipient's `RCPT` exchange
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Clears the recipient status
    pub fn reset_status(&mut self) {
        self.status.reset();
        self.complete = false;
    }

    /// Attaches application data to the recipient, returning the previous
    /// value
    pub fn set_application_data(&mut self, data: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.application_data.replace(data)
    }

    /// The application data attached to the recipient
    pub fn application_data(&self) -> Option<&(dyn Any)> {
        self.application_data.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::{BodyKind, ByMode, DeliverBy, DsnRet, Notify, Session};
    use crate::extension::Extension;

    #[test]
    fn server_parsing() {
        let mut session = Session::new();
        session.set_server("mail.example.org").unwrap();
        assert_eq!(session.port, 587);

        session.set_server("mail.example.org:2525").unwrap();
        assert_eq!(session.port, 2525);

        session.set_server("mail.example.org:smtp").unwrap();
        assert_eq!(session.port, 25);

        assert!(session.set_server(":587").is_err());
        assert!(session.set_server("mail.example.org:nothing").is_err());
    }

    #[test]
    fn required_extensions_follow_configuration() {
        let mut session = Session::new();
        assert!(session.required_extensions().is_empty());

        let message = session.add_message();
        message.dsn_set_envid("tracer");
        assert_eq!(session.required_extensions(), [Extension::Dsn]);

        let message = session.add_message();
        message.set_body_kind(BodyKind::EightBitMime);
        message
            .set_deliver_by(DeliverBy {
                time: 120,
                mode: ByMode::Notify,
                trace: false,
            })
            .unwrap();
        let required = session.required_extensions();
        assert!(required.contains(&Extension::Dsn));
        assert!(required.contains(&Extension::EightBitMime));
        assert!(required.contains(&Extension::DeliverBy));
    }

    #[test]
    fn notify_marks_dsn_required() {
        let mut session = Session::new();
        let message = session.add_message();
        message
            .add_recipient("b@example.net".parse().unwrap())
            .dsn_set_notify(Notify::NEVER);
        assert_eq!(session.required_extensions(), [Extension::Dsn]);
    }

    #[test]
    fn deliver_by_return_requires_future_deadline() {
        let mut session = Session::new();
        let message = session.add_message();
        assert!(message
            .set_deliver_by(DeliverBy {
                time: 0,
                mode: ByMode::Return,
                trace: false,
            })
            .is_err());
        assert!(message
            .set_deliver_by(DeliverBy {
                time: 0,
                mode: ByMode::Notify,
                trace: false,
            })
            .is_ok());
        assert!(message
            .set_deliver_by(DeliverBy {
                time: 1_000_000_000,
                mode: ByMode::Notify,
                trace: false,
            })
            .is_err());
    }

    #[test]
    fn session_without_body_refuses_to_start() {
        let mut session = Session::new();
        session.set_server("mail.example.org").unwrap();
        let message = session.add_message();
        message.add_recipient("b@example.net".parse().unwrap());
        let err = session
            .start_with_stream(crate::client::NetworkStream::Mock(
                crate::client::mock::MockStream::new(),
            ))
            .unwrap_err();
        assert!(err.is_client());
    }

    #[test]
    fn ret_marks_dsn_required() {
        let mut session = Session::new();
        session.add_message().dsn_set_ret(DsnRet::Full);
        assert_eq!(session.required_extensions(), [Extension::Dsn]);
    }
}
