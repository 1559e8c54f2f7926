//! Control-channel replies.
//!
//! A reply is `<3-digit code><sep><message>` on its first line, where
//! `sep` is a space for single-line replies and `-` when continuation
//! lines follow. Only the first line's code is authoritative.

use std::fmt;

/// Category of a reply, taken from the first digit of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// `1xx`: the action is starting, expect another reply.
    PositivePreliminary,
    /// `2xx`: the action completed.
    PositiveCompletion,
    /// `3xx`: the command was accepted, more input is needed.
    PositiveIntermediate,
    /// `4xx`: the action failed, retrying later may succeed.
    TransientNegative,
    /// `5xx`: the action failed permanently.
    PermanentNegative,
}

impl ReplyClass {
    fn from_code(code: u16) -> Option<Self> {
        match code / 100 {
            1 => Some(Self::PositivePreliminary),
            2 => Some(Self::PositiveCompletion),
            3 => Some(Self::PositiveIntermediate),
            4 => Some(Self::TransientNegative),
            5 => Some(Self::PermanentNegative),
            _ => None,
        }
    }
}

/// A parsed reply. Immutable once built.
///
/// `code` is `None` when the first line does not start with a valid
/// code; callers must treat that as a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: Option<u16>,
    message: String,
    raw: String,
}

impl Reply {
    /// Parses raw reply text (one or more lines).
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let first = raw.lines().next().unwrap_or("").trim_end_matches('\r');

        let code = leading_code(first);
        let message = match code {
            Some(_) => first.get(4..).unwrap_or("").trim_end().to_string(),
            None => first.trim().to_string(),
        };

        Self { code, message, raw }
    }

    /// The numeric code, if the reply is well formed.
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    /// Text after the code and separator on the first line.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The reply exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All reply lines, first line included.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.raw.lines().map(|l| l.trim_end_matches('\r'))
    }

    /// Category of the reply, `None` when malformed.
    pub fn class(&self) -> Option<ReplyClass> {
        self.code.and_then(ReplyClass::from_code)
    }

    pub fn is_malformed(&self) -> bool {
        self.code.is_none()
    }

    /// `1xx`.
    pub fn is_positive_preliminary(&self) -> bool {
        self.class() == Some(ReplyClass::PositivePreliminary)
    }

    /// `2xx`.
    pub fn is_positive(&self) -> bool {
        self.class() == Some(ReplyClass::PositiveCompletion)
    }

    /// `3xx`.
    pub fn is_positive_intermediate(&self) -> bool {
        self.class() == Some(ReplyClass::PositiveIntermediate)
    }

    /// `4xx` or `5xx`.
    pub fn is_error(&self) -> bool {
        matches!(
            self.class(),
            Some(ReplyClass::TransientNegative | ReplyClass::PermanentNegative)
        )
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code} {}", self.message),
            None => write!(f, "malformed reply: {:?}", self.message),
        }
    }
}

/// Returns the code if `line` starts with three digits forming 100-599.
fn leading_code(line: &str) -> Option<u16> {
    let digits = line.as_bytes().get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code: u16 = line[..3].parse().ok()?;
    ReplyClass::from_code(code).map(|_| code)
}

/// Returns `true` if `line` closes a multi-line reply opened with `code`:
/// the same code followed by a space or end of line.
pub fn is_final_line(line: &str, code: u16) -> bool {
    leading_code(line) == Some(code) && line.as_bytes().get(3).is_none_or(|b| *b == b' ')
}

/// Returns `true` if `line` opens a multi-line reply (`ddd-`).
pub fn opens_multiline(line: &str) -> bool {
    leading_code(line).is_some() && line.as_bytes().get(3) == Some(&b'-')
}
