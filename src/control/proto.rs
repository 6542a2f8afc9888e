//! Reply encoding onto a client's outbound buffer.
//!
//! A reply line is `CCCsP\r\n`: a three-digit status code, one
//! terminator character, and the payload.

use std::fmt::Arguments;

use super::conn::ControlConn;
use super::fmt::write_escaped;

/// Terminator character after the status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyLine {
    /// `' '`: the last line of a reply.
    Final,
    /// `'-'`: a continuation line.
    Mid,
    /// `'+'`: introduces an escaped-data payload.
    Data,
}

impl ReplyLine {
    const fn as_char(self) -> char {
        match self {
            ReplyLine::Final => ' ',
            ReplyLine::Mid => '-',
            ReplyLine::Data => '+',
        }
    }
}

impl ControlConn {
    /// Append a string verbatim.
    pub fn write_str(&self, s: &str) {
        self.append(s.as_bytes());
    }

    /// Append one reply line.
    pub fn write_reply(&self, code: u16, line: ReplyLine, payload: &str) {
        self.append(format!("{code:03}{}{payload}\r\n", line.as_char()).as_bytes());
    }

    pub fn write_reply_fmt(&self, code: u16, line: ReplyLine, payload: Arguments<'_>) {
        self.write_reply(code, line, &payload.to_string());
    }

    /// A single-line (final) reply.
    pub fn write_onereply(&self, code: u16, payload: &str) {
        self.write_reply(code, ReplyLine::Final, payload);
    }

    pub fn write_onereply_fmt(&self, code: u16, payload: Arguments<'_>) {
        self.write_reply_fmt(code, ReplyLine::Final, payload);
    }

    /// A middle line of a multi-line reply.
    pub fn write_midreply(&self, code: u16, payload: &str) {
        self.write_reply(code, ReplyLine::Mid, payload);
    }

    pub fn write_midreply_fmt(&self, code: u16, payload: Arguments<'_>) {
        self.write_reply_fmt(code, ReplyLine::Mid, payload);
    }

    /// The initial line of an escaped-data reply.
    pub fn write_datareply(&self, code: u16, payload: &str) {
        self.write_reply(code, ReplyLine::Data, payload);
    }

    pub fn write_datareply_fmt(&self, code: u16, payload: Arguments<'_>) {
        self.write_reply_fmt(code, ReplyLine::Data, payload);
    }

    /// Append `data` as an escaped-data block, terminator included.
    pub fn write_data(&self, data: &str) {
        self.append(&write_escaped(data.as_bytes()));
    }

    pub fn send_done(&self) {
        self.write_str("250 OK\r\n");
    }
}
