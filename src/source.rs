//! Message source
//!
//! Adapts the application's body producer into the octet stream sent after
//! `DATA`: header repair first, then CRLF canonicalization and dot-stuffing
//! over the body. The same transform also runs as a measuring pre-pass when
//! the engine needs the exact payload size or the 8-bit admission verdict
//! before `MAIL` is issued.

use std::io::{self, Read, Seek, SeekFrom};

use crate::{
    error::{self, Error},
    headers::{self, HeaderTable},
};

/// The application-supplied body producer.
///
/// A pull interface over the raw RFC 822 message. The stream is read at
/// least once per delivery and must support rewinding to the start: the
/// engine takes a measuring pass before transmission. Offsets other than
/// zero are never requested.
///
/// Every `Read + Seek` type (a `Cursor`, a `File`) is a `BodySource`.
pub trait BodySource {
    /// Reads up to `buf.len()` octets, returning 0 at the end of the body
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Restarts the body from offset 0
    fn rewind(&mut self) -> io::Result<()>;
}

impl<T: Read + Seek> BodySource for T {
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

/// Header values synthesized once per delivery, so that the measuring pass
/// and the transmission pass agree byte for byte
#[derive(Debug, Clone)]
pub(crate) struct SynthesizedHeaders {
    pub(crate) date: String,
    pub(crate) message_id: String,
    pub(crate) from: Option<String>,
}

/// What the measuring pre-pass learned about the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BodyScan {
    /// Exact payload size after header repair, canonicalization and
    /// dot-stuffing, excluding the final `.` terminator
    pub(crate) size: u64,
    /// Whether any octet above 127 appears in the payload
    pub(crate) eight_bit: bool,
}

/// Converts bare LF and bare CR to CRLF
#[derive(Default)]
struct CrlfCanon {
    prev_cr: bool,
}

impl CrlfCanon {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &b in input {
            if self.prev_cr {
                out.extend_from_slice(b"\r\n");
                self.prev_cr = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\r' => self.prev_cr = true,
                b'\n' => out.extend_from_slice(b"\r\n"),
                _ => out.push(b),
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        if self.prev_cr {
            out.extend_from_slice(b"\r\n");
            self.prev_cr = false;
        }
    }
}

/// Duplicates the leading dot of a line
///
/// Reference: https://tools.ietf.org/html/rfc5321#section-4.5.2
struct DotStuff {
    line_start: bool,
}

impl Default for DotStuff {
    fn default() -> Self {
        DotStuff { line_start: true }
    }
}

impl DotStuff {
    /// Input must already be CRLF-canonical
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &b in input {
            if self.line_start && b == b'.' {
                out.push(b'.');
            }
            self.line_start = b == b'\n';
            out.push(b);
        }
    }
}

/// One message, ready to stream
pub(crate) struct MessageSource<'a> {
    body: &'a mut dyn BodySource,
    overrides: &'a HeaderTable,
    synthesized: &'a SynthesizedHeaders,
}

const PULL_CHUNK: usize = 8192;

impl<'a> MessageSource<'a> {
    pub(crate) fn new(
        body: &'a mut dyn BodySource,
        overrides: &'a HeaderTable,
        synthesized: &'a SynthesizedHeaders,
    ) -> MessageSource<'a> {
        MessageSource {
            body,
            overrides,
            synthesized,
        }
    }

    /// Measuring pre-pass: exact payload size and the 8-bit verdict
    pub(crate) fn measure(&mut self) -> Result<BodyScan, Error> {
        let mut scan = BodyScan {
            size: 0,
            eight_bit: false,
        };
        self.write_to(&mut |chunk: &[u8], _| {
            scan.size += chunk.len() as u64;
            scan.eight_bit |= chunk.iter().any(|b| *b > 127);
            Ok(())
        })?;
        Ok(scan)
    }

    /// Streams the repaired, canonical, dot-stuffed payload into `sink`.
    ///
    /// The sink's second argument is true while header octets flow, for
    /// monitors that must not observe message bodies. The payload always
    /// ends with CRLF; the `.` terminator is the caller's.
    pub(crate) fn write_to(
        &mut self,
        sink: &mut dyn FnMut(&[u8], bool) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.body.rewind().map_err(producer_error)?;

        let mut canon = CrlfCanon::default();
        let mut stuff = DotStuff::default();
        let mut buffered = Vec::new();
        let mut chunk = [0u8; PULL_CHUNK];
        let mut eof = false;

        // Accumulate the header section: everything up to the first empty
        // line, or the whole stream if none appears.
        let split = loop {
            if let Some(at) = find_blank_line(&buffered) {
                break Some(at);
            }
            let n = self.body.pull(&mut chunk).map_err(producer_error)?;
            if n == 0 {
                canon.finish(&mut buffered);
                eof = true;
                break None;
            }
            canon.push(&chunk[..n], &mut buffered);
        };

        // A stream that opens with a header field has a header section to
        // repair; anything else is a bare body and gets the synthesized
        // header block alone.
        let (head, body_prefix): (Option<Vec<u8>>, Vec<u8>) = match split {
            Some(at) => {
                let head = buffered[..at + 2].to_vec();
                let body = buffered[at + 4..].to_vec();
                if starts_with_header(&head) {
                    (Some(head), body)
                } else {
                    (None, [head, b"\r\n".to_vec(), body].concat())
                }
            }
            None if starts_with_header(&buffered) => (Some(buffered), Vec::new()),
            None => (None, buffered),
        };

        self.emit_headers(head.as_deref(), sink)?;

        let mut ends_crlf = true;
        let mut out = Vec::with_capacity(PULL_CHUNK + 16);

        stuff.push(&body_prefix, &mut out);
        if !out.is_empty() {
            ends_crlf = out.ends_with(b"\r\n");
            sink(&out, false)?;
        }

        while !eof {
            let n = self.body.pull(&mut chunk).map_err(producer_error)?;
            if n == 0 {
                eof = true;
                break;
            }
            let mut canonical = Vec::with_capacity(n + 16);
            canon.push(&chunk[..n], &mut canonical);
            out.clear();
            stuff.push(&canonical, &mut out);
            if !out.is_empty() {
                ends_crlf = out.ends_with(b"\r\n");
                sink(&out, false)?;
            }
        }

        let mut tail = Vec::new();
        canon.finish(&mut tail);
        if !tail.is_empty() {
            out.clear();
            stuff.push(&tail, &mut out);
            ends_crlf = out.ends_with(b"\r\n");
            sink(&out, false)?;
        }

        if !ends_crlf {
            sink(b"\r\n", false)?;
        }

        Ok(())
    }

    /// Merges producer headers, the application table and the synthesized
    /// required fields, and emits the block plus the separating empty line
    fn emit_headers(
        &self,
        producer: Option<&[u8]>,
        sink: &mut dyn FnMut(&[u8], bool) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut emitted_override = vec![false; self.overrides.iter().count()];
        let mut seen_date = false;
        let mut seen_message_id = false;
        let mut seen_from = false;

        for group in HeaderGroups::new(producer.unwrap_or(b"")) {
            let name = group_name(group);
            if let Some(name) = name {
                if headers::is_reserved(name) {
                    continue;
                }
                seen_date |= name.eq_ignore_ascii_case("Date");
                seen_message_id |= name.eq_ignore_ascii_case("Message-ID");
                seen_from |= name.eq_ignore_ascii_case("From");

                let replacement = self
                    .overrides
                    .iter()
                    .enumerate()
                    .find(|(_, (n, _))| n.eq_ignore_ascii_case(name));
                if let Some((idx, (n, v))) = replacement {
                    // Replace in place the first time, drop repeats
                    if !emitted_override[idx] {
                        emitted_override[idx] = true;
                        sink(format!("{n}: {v}\r\n").as_bytes(), true)?;
                    }
                    continue;
                }
            }
            sink(group, true)?;
        }

        for (idx, (name, value)) in self.overrides.iter().enumerate() {
            if emitted_override[idx] || headers::is_reserved(name) {
                continue;
            }
            seen_date |= name.eq_ignore_ascii_case("Date");
            seen_message_id |= name.eq_ignore_ascii_case("Message-ID");
            seen_from |= name.eq_ignore_ascii_case("From");
            sink(format!("{name}: {value}\r\n").as_bytes(), true)?;
        }

        if !seen_date {
            sink(format!("Date: {}\r\n", self.synthesized.date).as_bytes(), true)?;
        }
        if !seen_message_id {
            sink(
                format!("Message-ID: {}\r\n", self.synthesized.message_id).as_bytes(),
                true,
            )?;
        }
        if !seen_from {
            if let Some(from) = &self.synthesized.from {
                sink(format!("From: <{from}>\r\n").as_bytes(), true)?;
            }
        }

        sink(b"\r\n", true)
    }
}

fn producer_error(e: io::Error) -> Error {
    error::client(e)
}

/// Finds the CRLF CRLF separating headers from body; the returned offset
/// points at the first CR
fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn starts_with_header(buf: &[u8]) -> bool {
    let line_end = buf
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(buf.len());
    match std::str::from_utf8(&buf[..line_end]) {
        Ok(line) => headers::field_name(line).is_some(),
        Err(_) => false,
    }
}

/// The name of a header group, when its first line carries one
fn group_name(group: &[u8]) -> Option<&str> {
    let line_end = group
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(group.len());
    std::str::from_utf8(&group[..line_end])
        .ok()
        .and_then(headers::field_name)
}

/// Iterates over header groups: a field line plus its folded continuation
/// lines, CRLF terminators included
struct HeaderGroups<'a> {
    rest: &'a [u8],
}

impl<'a> HeaderGroups<'a> {
    fn new(block: &'a [u8]) -> HeaderGroups<'a> {
        HeaderGroups { rest: block }
    }
}

impl<'a> Iterator for HeaderGroups<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }

        let mut end = 0;
        loop {
            let line_len = match self.rest[end..].windows(2).position(|w| w == b"\r\n") {
                Some(pos) => pos + 2,
                None => self.rest.len() - end,
            };
            end += line_len;
            // Folded continuation lines stay with their field
            match self.rest.get(end) {
                Some(&b' ') | Some(&b'\t') => continue,
                _ => break,
            }
        }

        let (group, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(group)
    }
}
