//! The mail transaction: one message through MAIL, RCPT, DATA and the
//! payload, with per-recipient bookkeeping

use std::{sync::Arc, time::SystemTime};

use crate::{
    client::Connection,
    commands::{Data, Mail, Rcpt, Rset},
    error::{self, Error},
    event::{Event, EventListener},
    extension::{Extension, MailParameter, RcptParameter, ServerInfo},
    headers,
    pipeline::CommandQueue,
    session::{Message, Recipient},
    source::{BodyScan, MessageSource, SynthesizedHeaders},
    status::{Status, StatusKind},
};

/// Session-level context a transaction runs under
pub(crate) struct TransactionContext<'a> {
    pub(crate) info: &'a ServerInfo,
    pub(crate) require_all_recipients: bool,
    pub(crate) hello_domain: String,
    pub(crate) events: Option<Arc<dyn EventListener>>,
}

impl TransactionContext<'_> {
    fn emit(&self, event: Event) {
        if let Some(listener) = &self.events {
            listener.on_event(event);
        }
    }

    fn enhanced(&self) -> bool {
        self.info.supports_feature(Extension::EnhancedStatusCodes)
    }
}

enum Tag {
    Mail,
    Rcpt(usize),
}

/// Drives one message. Per-message failures are recorded in the statuses
/// and leave the connection usable for the next message; only transport
/// breakdowns and channel violations are returned as errors and abort the
/// session.
pub(crate) fn deliver(
    conn: &mut Connection,
    message: &mut Message,
    ctx: &TransactionContext<'_>,
) -> Result<(), Error> {
    if message.recipients.is_empty() {
        message.message_status =
            Status::synthesized(StatusKind::ProtocolError, "message has no recipients");
        return Ok(());
    }

    // Synthesized header values are fixed up front so the measuring pass
    // and the transmission are byte-identical.
    let synthesized = SynthesizedHeaders {
        date: headers::date_value(SystemTime::now()),
        message_id: headers::message_id_value(&ctx.hello_domain),
        from: message.reverse_path.as_ref().map(|a| a.to_string()),
    };

    let body = message.body.as_mut().expect("body producer checked at start");
    let scan = match MessageSource::new(&mut **body, &message.headers, &synthesized).measure() {
        Ok(scan) => scan,
        Err(e) => {
            let status = Status::synthesized(StatusKind::LocalError, e.to_string());
            message.message_status = status.clone();
            not_attempted(message, &status);
            abandon(conn, ctx)?;
            return Ok(());
        }
    };

    // 8-bit octets cannot cross a channel that did not negotiate
    // 8BITMIME; this violation aborts the whole session.
    if scan.eight_bit && !ctx.info.supports_feature(Extension::EightBitMime) {
        let status = Status::synthesized(
            StatusKind::ProtocolError,
            "8-bit message body but server does not support 8BITMIME",
        );
        message.message_status = status.clone();
        not_attempted(message, &status);
        abandon(conn, ctx)?;
        return Err(error::protocol(
            "8-bit message body but server does not support 8BITMIME",
        ));
    }

    // Admission against the server's declared maximum, using the exact
    // post-canonicalization size.
    if let Some(max) = ctx.info.size_max() {
        if scan.size > max {
            let status = Status::synthesized(
                StatusKind::PermanentFailure,
                format!("message of {} octets exceeds server limit of {max}", scan.size),
            );
            message.message_status = status.clone();
            not_attempted(message, &status);
            abandon(conn, ctx)?;
            return Ok(());
        }
    }

    // MAIL and all RCPTs go out as one pipelined group when the server
    // allows it.
    let mut queue = CommandQueue::new();
    queue.push(
        Mail::new(message.reverse_path.clone(), mail_parameters(message, ctx.info, &scan)),
        Tag::Mail,
    );
    for (index, recipient) in message.recipients.iter().enumerate() {
        queue.push(
            Rcpt::new(recipient.mailbox().clone(), rcpt_parameters(recipient)),
            Tag::Rcpt(index),
        );
    }

    let pipelining = ctx.info.supports_feature(Extension::Pipelining);
    let enhanced = ctx.enhanced();
    for (tag, response) in conn.dispatch(queue, pipelining)? {
        match tag {
            Tag::Mail => {
                message.reverse_path_status = Status::from_reply(&response, enhanced);
                tracing::info!(
                    "from=<{}> status={}",
                    message
                        .reverse_path
                        .as_ref()
                        .map(|a| a.to_string())
                        .unwrap_or_default(),
                    message.reverse_path_status.code(),
                );
                ctx.emit(Event::MailFrom);
            }
            Tag::Rcpt(index) => {
                let recipient = &mut message.recipients[index];
                recipient.status = Status::from_reply(&response, enhanced);
                recipient.complete = true;
                tracing::info!(
                    "to=<{}> status={}",
                    recipient.mailbox(),
                    recipient.status.code(),
                );
                ctx.emit(Event::RcptTo);
            }
        }
    }

    let mail_ok = message.reverse_path_status.kind() == StatusKind::Ok;
    let accepted = message
        .recipients
        .iter()
        .filter(|r| r.status.kind() == StatusKind::Ok)
        .count();
    let rejected = message.recipients.len() - accepted;

    if !mail_ok {
        // The sender was refused: none of the recipients were really
        // attempted, whatever the server said to the pipelined RCPTs.
        let kind = message.reverse_path_status.kind();
        for recipient in &mut message.recipients {
            recipient.status =
                Status::synthesized(kind, "not attempted: sender rejected");
            recipient.complete = false;
        }
        message.message_status = message.reverse_path_status.clone();
        abandon(conn, ctx)?;
        ctx.emit(Event::MessageDone);
        return Ok(());
    }

    if accepted == 0 || (ctx.require_all_recipients && rejected > 0) {
        let kind = if message
            .recipients
            .iter()
            .any(|r| r.status.kind() == StatusKind::TransientFailure)
        {
            StatusKind::TransientFailure
        } else {
            StatusKind::PermanentFailure
        };
        let text = if accepted == 0 {
            "no valid recipients"
        } else {
            "recipients rejected"
        };
        message.message_status = Status::synthesized(kind, text);
        abandon(conn, ctx)?;
        ctx.emit(Event::MessageDone);
        return Ok(());
    }

    let response = conn.command(Data)?;
    if !response.has_code(354) {
        message.message_status = Status::from_reply(&response, enhanced);
        ctx.emit(Event::MessageDone);
        return Ok(());
    }
    ctx.emit(Event::Data);

    let body = message.body.as_mut().expect("body producer checked at start");
    MessageSource::new(&mut **body, &message.headers, &synthesized)
        .write_to(&mut |chunk, is_header| conn.write_payload(chunk, is_header))?;
    conn.write_raw(b".\r\n")?;
    conn.flush()?;

    let response = conn.read_response()?;
    message.message_status = Status::from_reply(&response, enhanced);
    tracing::info!(
        "size={} status={} ({})",
        scan.size,
        message.message_status.code(),
        message.message_status.text(),
    );
    ctx.emit(Event::MessageDone);

    Ok(())
}

/// Clears server-side transaction state after an abandoned message
fn abandon(conn: &mut Connection, ctx: &TransactionContext<'_>) -> Result<(), Error> {
    conn.command(Rset)?;
    ctx.emit(Event::Reset);
    Ok(())
}

/// Marks every recipient the transaction never reached
fn not_attempted(message: &mut Message, status: &Status) {
    for recipient in &mut message.recipients {
        if !recipient.status.is_set() {
            recipient.status = Status::synthesized(status.kind(), "not attempted");
        }
    }
}

/// Assembles the MAIL FROM parameter list from the message configuration
/// and the advertised capability set
fn mail_parameters(message: &Message, info: &ServerInfo, scan: &BodyScan) -> Vec<MailParameter> {
    let mut parameters = Vec::new();

    if info.supports_feature(Extension::Size) {
        parameters.push(MailParameter::Size(
            message.size_estimate.unwrap_or(scan.size),
        ));
    }
    if let Some(kind) = message.body_kind {
        // Guarded by the required-extensions check
        parameters.push(MailParameter::Body(kind));
    }
    if let Some(ret) = message.dsn_ret {
        parameters.push(MailParameter::Ret(ret));
    }
    if let Some(envid) = &message.dsn_envid {
        parameters.push(MailParameter::Envid(envid.clone()));
    }
    if let Some(by) = message.deliver_by {
        parameters.push(MailParameter::By(by));
    }

    parameters
}

fn rcpt_parameters(recipient: &Recipient) -> Vec<RcptParameter> {
    let mut parameters = Vec::new();
    if let Some(notify) = recipient.notify {
        parameters.push(RcptParameter::Notify(notify));
    }
    if let Some((address_type, address)) = &recipient.orcpt {
        parameters.push(RcptParameter::Orcpt {
            address_type: address_type.clone(),
            address: address.clone(),
        });
    }
    parameters
}
