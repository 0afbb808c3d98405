//! SMTP reply, containing a mandatory return code, an optional enhanced
//! status code and an optional text message

use std::{
    fmt::{Display, Formatter, Result},
    result,
    str::FromStr,
};

use nom::{
    branch::alt,
    bytes::{
        complete::tag as complete_tag,
        streaming::{tag, take_until},
    },
    character::complete::digit1,
    combinator::{complete, eof, map, map_res, verify},
    multi::many0,
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::{self, Error};

/// The first digit indicates severity
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Severity {
    /// 2yx
    PositiveCompletion = 2,
    /// 3yz
    PositiveIntermediate = 3,
    /// 4yz
    TransientNegativeCompletion = 4,
    /// 5yz
    PermanentNegativeCompletion = 5,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", *self as u8)
    }
}

/// Second digit
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Category {
    /// x0z
    Syntax = 0,
    /// x1z
    Information = 1,
    /// x2z
    Connections = 2,
    /// x3z
    Unspecified3 = 3,
    /// x4z
    Unspecified4 = 4,
    /// x5z
    MailSystem = 5,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", *self as u8)
    }
}

/// The detail digit of a reply code (third digit)
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Detail(pub u8);

impl Display for Detail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a 3 digit SMTP reply code
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Code {
    severity: Severity,
    category: Category,
    detail: Detail,
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}{}{}", self.severity, self.category, self.detail)
    }
}

impl Code {
    /// Creates a new `Code` structure
    pub fn new(severity: Severity, category: Category, detail: Detail) -> Code {
        Code {
            severity,
            category,
            detail,
        }
    }

    /// First digit of the reply code
    pub fn severity(self) -> Severity {
        self.severity
    }

    /// Second digit of the reply code
    pub fn category(self) -> Category {
        self.category
    }

    /// Third digit of the reply code
    pub fn detail(self) -> Detail {
        self.detail
    }

    /// Tells if the reply is positive
    pub fn is_positive(self) -> bool {
        matches!(
            self.severity,
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }
}

impl From<Code> for u16 {
    fn from(code: Code) -> Self {
        code.detail.0 as u16 + 10 * code.category as u16 + 100 * code.severity as u16
    }
}

/// An RFC 3463 enhanced status code, `class.subject.detail`
///
/// Reported by servers advertising ENHANCEDSTATUSCODES (RFC 2034) at the
/// start of the reply text.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct EnhancedCode {
    /// Status class, 2 (success), 4 (transient) or 5 (permanent)
    pub class: u8,
    /// Subject sub-code
    pub subject: u16,
    /// Detail sub-code
    pub detail: u16,
}

impl Display for EnhancedCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// Contains an SMTP reply, with separated code and message
///
/// The text message is optional, only the code is mandatory
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Response {
    /// Reply code
    code: Code,
    /// Server response string (optional)
    /// Handle multiline responses
    message: Vec<String>,
}

impl FromStr for Response {
    type Err = Error;

    fn from_str(s: &str) -> result::Result<Response, Error> {
        parse_response(s)
            .map(|(_, r)| r)
            .map_err(|e| error::response(e.to_owned()))
    }
}

impl Response {
    /// Creates a new `Response`
    pub fn new(code: Code, message: Vec<String>) -> Response {
        Response { code, message }
    }

    /// Tells if the response is positive
    pub fn is_positive(&self) -> bool {
        self.code.is_positive()
    }

    /// Tests code equality
    pub fn has_code(&self, code: u16) -> bool {
        u16::from(self.code) == code
    }

    /// Returns only the first word of the message if possible
    pub fn first_word(&self) -> Option<&str> {
        self.message
            .first()
            .and_then(|line| line.split_whitespace().next())
    }

    /// Returns only the first line of the message if possible
    pub fn first_line(&self) -> Option<&str> {
        self.message.first().map(String::as_str)
    }

    /// Reply code
    pub fn code(&self) -> Code {
        self.code
    }

    /// Server response string (array of lines)
    pub fn message(&self) -> impl Iterator<Item = &str> {
        self.message.iter().map(String::as_str)
    }

    /// The enhanced status code at the start of the reply text, if any
    ///
    /// Only meaningful when the server advertised ENHANCEDSTATUSCODES;
    /// callers gate on the capability set.
    pub fn enhanced_code(&self) -> Option<EnhancedCode> {
        let first = self.message.first()?;
        match complete(parse_enhanced_code)(first.as_str()) {
            Ok((_, code)) => Some(code),
            Err(_) => None,
        }
    }
}

// Parsers (originally from tokio-smtp)

fn parse_code(i: &str) -> IResult<&str, Code> {
    let (i, severity) = parse_severity(i)?;
    let (i, category) = parse_category(i)?;
    let (i, detail) = parse_detail(i)?;
    Ok((
        i,
        Code {
            severity,
            category,
            detail,
        },
    ))
}

fn parse_severity(i: &str) -> IResult<&str, Severity> {
    alt((
        map(tag("2"), |_| Severity::PositiveCompletion),
        map(tag("3"), |_| Severity::PositiveIntermediate),
        map(tag("4"), |_| Severity::TransientNegativeCompletion),
        map(tag("5"), |_| Severity::PermanentNegativeCompletion),
    ))(i)
}

fn parse_category(i: &str) -> IResult<&str, Category> {
    alt((
        map(tag("0"), |_| Category::Syntax),
        map(tag("1"), |_| Category::Information),
        map(tag("2"), |_| Category::Connections),
        map(tag("3"), |_| Category::Unspecified3),
        map(tag("4"), |_| Category::Unspecified4),
        map(tag("5"), |_| Category::MailSystem),
    ))(i)
}

fn parse_detail(i: &str) -> IResult<&str, Detail> {
    alt((
        map(tag("0"), |_| Detail(0)),
        map(tag("1"), |_| Detail(1)),
        map(tag("2"), |_| Detail(2)),
        map(tag("3"), |_| Detail(3)),
        map(tag("4"), |_| Detail(4)),
        map(tag("5"), |_| Detail(5)),
        map(tag("6"), |_| Detail(6)),
        map(tag("7"), |_| Detail(7)),
        map(tag("8"), |_| Detail(8)),
        map(tag("9"), |_| Detail(9)),
    ))(i)
}

fn parse_enhanced_code(i: &str) -> IResult<&str, EnhancedCode> {
    let (i, class) = map_res(
        verify(digit1, |d: &str| matches!(d, "2" | "4" | "5")),
        str::parse::<u8>,
    )(i)?;
    let (i, _) = complete_tag(".")(i)?;
    let (i, subject) = map_res(digit1, str::parse::<u16>)(i)?;
    let (i, _) = complete_tag(".")(i)?;
    let (i, detail) = map_res(digit1, str::parse::<u16>)(i)?;
    // the triple must stand alone at the start of the text
    let (i, _) = alt((complete_tag(" "), eof))(i)?;
    Ok((
        i,
        EnhancedCode {
            class,
            subject,
            detail,
        },
    ))
}

pub(crate) fn parse_response(i: &str) -> IResult<&str, Response> {
    let (i, lines) = many0(tuple((
        parse_code,
        preceded(tag("-"), take_until("\r\n")),
        tag("\r\n"),
    )))(i)?;
    let (i, (last_code, last_line)) =
        tuple((parse_code, preceded(tag(" "), take_until("\r\n"))))(i)?;
    let (i, _) = complete(tag("\r\n"))(i)?;

    // Check that all codes are equal.
    if !lines.iter().all(|&(code, _, _)| code == last_code) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            "",
            nom::error::ErrorKind::Not,
        )));
    }

    // Extract text from lines, and append last line.
    let mut lines: Vec<String> = lines.into_iter().map(|(_, text, _)| text.into()).collect();
    lines.push(last_line.into());

    Ok((
        i,
        Response {
            code: last_code,
            message: lines,
        },
    ))
}
