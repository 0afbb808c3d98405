//! Message header bookkeeping
//!
//! Holds the application-supplied header table for a message, recognizes
//! header lines in the producer's output, and synthesizes the fields a
//! submitted message must carry.

use std::time::SystemTime;

use httpdate::HttpDate;
use uuid::Uuid;

/// Headers the library owns; application or producer copies are dropped
const RESERVED: &[&str] = &["Return-Path", "Content-Length"];

/// An ordered header table with case-insensitive names
///
/// Values set here override headers of the same name coming from the body
/// producer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    entries: Vec<(String, String)>,
}

impl HeaderTable {
    /// Creates an empty table
    pub fn new() -> HeaderTable {
        HeaderTable::default()
    }

    /// Sets a header, replacing an existing one of the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Gets the value of the first header of this name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when a header of this name is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes all headers of this name
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// The headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extracts the field name of a header line, when the line is one.
///
/// RFC 5322 field names are printable US-ASCII except ':'; continuation
/// lines start with whitespace and have no name of their own.
pub(crate) fn field_name(line: &str) -> Option<&str> {
    let colon = line.find(':')?;
    let name = &line[..colon];
    if !name.is_empty()
        && name
            .bytes()
            .all(|b| (33..=126).contains(&b) && b != b':')
    {
        Some(name)
    } else {
        None
    }
}

pub(crate) fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// An RFC 5322 `Date` value for the given instant
///
/// The httpdate crate renders ` GMT`, but email uses `+0000` to indicate
/// UTC, so the ending is rewritten.
pub(crate) fn date_value(st: SystemTime) -> String {
    let mut val = HttpDate::from(st).to_string();
    if val.ends_with(" GMT") {
        val.truncate(val.len() - "GMT".len());
        val.push_str("+0000");
    }
    val
}

/// A fresh `<uuid@domain>` message identifier
pub(crate) fn message_id_value(domain: &str) -> String {
    // https://tools.ietf.org/html/rfc5322#section-3.6.4
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use pretty_assertions::assert_eq;

    use super::{date_value, field_name, is_reserved, message_id_value, HeaderTable};

    #[test]
    fn set_replaces_case_insensitively() {
        let mut table = HeaderTable::new();
        table.set("Subject", "one");
        table.set("subject", "two");
        assert_eq!(table.get("SUBJECT"), Some("two"));
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut table = HeaderTable::new();
        table.set("From", "a@x");
        table.set("To", "b@y");
        table.set("Subject", "hi");
        let names: Vec<&str> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["From", "To", "Subject"]);
    }

    #[test]
    fn recognizes_field_names() {
        assert_eq!(field_name("Subject: hello"), Some("Subject"));
        assert_eq!(field_name("X-Loop:"), Some("X-Loop"));
        assert_eq!(field_name(" folded continuation"), None);
        assert_eq!(field_name("not a header line"), None);
        assert_eq!(field_name(""), None);
    }

    #[test]
    fn reserved_headers() {
        assert!(is_reserved("Return-Path"));
        assert!(is_reserved("content-length"));
        assert!(!is_reserved("Subject"));
    }

    #[test]
    fn date_uses_numeric_zone() {
        // Tue, 15 Nov 1994 08:12:31 GMT
        let st = SystemTime::UNIX_EPOCH + Duration::from_secs(784_887_151);
        assert_eq!(date_value(st), "Tue, 15 Nov 1994 08:12:31 +0000");
    }

    #[test]
    fn message_id_shape() {
        let id = message_id_value("example.org");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.org>"));
    }
}
