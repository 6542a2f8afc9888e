//! Escaped-data and quoted-string codecs for the control protocol.
//!
//! Data payloads travel as dot-stuffed CRLF blocks terminated by a lone
//! `.\r\n` line; command arguments may carry double-quoted strings with
//! backslash escapes. Both directions live here.

use tracing::warn;

/// Ceiling on escaped-data input. Anything larger gets the sentinel.
const ESCAPED_DATA_MAX: usize = usize::MAX / 2;

/// Copy `data` into a fresh buffer, doubling any period that starts a
/// line, promoting bare LF to CRLF, and appending the `.\r\n`
/// terminator (plus a final CRLF if the payload lacks one).
pub fn write_escaped(data: &[u8]) -> Vec<u8> {
    if data.len() >= ESCAPED_DATA_MAX {
        warn!("input to write_escaped was too long");
        return b".\r\n".to_vec();
    }
    let mut out = Vec::with_capacity(data.len() + 9);
    let mut start_of_line = true;
    for (i, &byte) in data.iter().enumerate() {
        if byte == b'\n' {
            if i > 0 && data[i - 1] != b'\r' {
                out.push(b'\r');
            }
            start_of_line = true;
        } else if byte == b'.' {
            if start_of_line {
                start_of_line = false;
                out.push(b'.');
            }
        } else {
            start_of_line = false;
        }
        out.push(byte);
    }
    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}

/// Inverse of [`write_escaped`]: strip one leading period per line,
/// fold CRLF back to LF, and stop at the terminator line. Well-defined
/// on truncated input; the terminator is not part of the output.
pub fn read_escaped(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;
    while !rest.is_empty() {
        // At the start of a line.
        if rest[0] == b'.' {
            rest = &rest[1..];
            let terminator = rest.is_empty()
                || rest.starts_with(b"\n")
                || rest.starts_with(b"\r\n")
                || rest == b"\r";
            if terminator {
                break;
            }
        }
        match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                let mut line = &rest[..nl];
                if line.ends_with(b"\r") {
                    line = &line[..line.len() - 1];
                }
                out.extend_from_slice(line);
                out.push(b'\n');
                rest = &rest[nl + 1..];
            }
            None => {
                out.extend_from_slice(rest);
                return out;
            }
        }
    }
    out
}

/// Measure the quoted string starting at `buf[pos]`. Returns the
/// encoded length (quotes included) and the decoded character count, or
/// `None` if no well-formed quoted string starts there.
fn quoted_string_length(buf: &[u8], pos: usize) -> Option<(usize, usize)> {
    if buf.get(pos) != Some(&b'"') {
        return None;
    }
    let mut cp = pos + 1;
    let mut chars = 0;
    loop {
        match buf.get(cp) {
            None => return None,
            Some(b'\\') => {
                // The escape must have a continuation byte.
                if cp + 1 >= buf.len() {
                    return None;
                }
                cp += 2;
                chars += 1;
            }
            Some(b'"') => break,
            Some(_) => {
                cp += 1;
                chars += 1;
            }
        }
    }
    Some((cp - pos + 1, chars))
}

/// Return the raw quoted string (quotes and escapes included) starting
/// at `buf[pos]`, plus the index just past the closing quote.
pub fn extract_quoted(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let (len, _) = quoted_string_length(buf, pos)?;
    Some((&buf[pos..pos + len], pos + len))
}

/// Decode the quoted string starting at `buf[pos]`: `\x` yields the
/// literal byte `x`. Returns the payload and the index just past the
/// closing quote.
pub fn decode_quoted(buf: &[u8], pos: usize) -> Option<(Vec<u8>, usize)> {
    let (len, chars) = quoted_string_length(buf, pos)?;
    let end = pos + len - 1;
    let mut out = Vec::with_capacity(chars);
    let mut cp = pos + 1;
    while cp < end {
        if buf[cp] == b'\\' {
            cp += 1;
        }
        out.push(buf[cp]);
        cp += 1;
    }
    debug_assert_eq!(out.len(), chars);
    Some((out, pos + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_escaped_dot_stuffs_and_terminates() {
        assert_eq!(write_escaped(b".hi\n..\nbye\n"), b"..hi\r\n...\r\nbye\r\n.\r\n");
    }

    #[test]
    fn write_escaped_appends_missing_newline() {
        assert_eq!(write_escaped(b"abc"), b"abc\r\n.\r\n");
        assert_eq!(write_escaped(b""), b"\r\n.\r\n");
    }

    #[test]
    fn write_escaped_keeps_existing_crlf() {
        assert_eq!(write_escaped(b"a\r\nb\r\n"), b"a\r\nb\r\n.\r\n");
    }

    #[test]
    fn write_escaped_only_doubles_leading_dots() {
        assert_eq!(write_escaped(b"a.b\n.c\n"), b"a.b\r\n..c\r\n.\r\n");
    }

    #[test]
    fn read_escaped_strips_stuffing_and_terminator() {
        assert_eq!(read_escaped(b"..hi\r\n...\r\nbye\r\n.\r\n"), b".hi\n..\nbye\n");
    }

    #[test]
    fn read_escaped_folds_crlf() {
        assert_eq!(read_escaped(b"a\r\nb\r\n.\r\n"), b"a\nb\n");
    }

    #[test]
    fn read_escaped_handles_truncation() {
        assert_eq!(read_escaped(b"abc"), b"abc");
        assert_eq!(read_escaped(b".abc"), b"abc");
        assert_eq!(read_escaped(b"a\r\n."), b"a\n");
        assert_eq!(read_escaped(b""), b"");
    }

    #[test]
    fn escaped_round_trip() {
        let docs: &[&[u8]] = &[
            b"plain\n",
            b".leading dot\n",
            b"..two dots\n",
            b"x\n",
            b"multi\nline\nwith . inner dots\n",
        ];
        for doc in docs {
            assert_eq!(read_escaped(&write_escaped(doc)), *doc);
        }
    }

    #[test]
    fn round_trip_normalizes_bare_lf() {
        // CRLF input comes back as LF.
        assert_eq!(read_escaped(&write_escaped(b"a\r\nb\r\n")), b"a\nb\n");
    }

    #[test]
    fn extract_quoted_keeps_encoding() {
        let buf = b"\"a\\\"b\" tail";
        let (raw, next) = extract_quoted(buf, 0).unwrap();
        assert_eq!(raw, b"\"a\\\"b\"");
        assert_eq!(next, 6);
        assert_eq!(&buf[next..], b" tail");
    }

    #[test]
    fn decode_quoted_unescapes() {
        let buf = b"\"a\\\"b\" tail";
        let (payload, next) = decode_quoted(buf, 0).unwrap();
        assert_eq!(payload, b"a\"b");
        assert_eq!(next, 6);
    }

    #[test]
    fn decode_quoted_empty_string() {
        let (payload, next) = decode_quoted(b"\"\"x", 0).unwrap();
        assert!(payload.is_empty());
        assert_eq!(next, 2);
    }

    #[test]
    fn quoted_scans_from_offset() {
        let buf = b"ab \"cd\"";
        let (payload, next) = decode_quoted(buf, 3).unwrap();
        assert_eq!(payload, b"cd");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn quoted_rejects_malformed() {
        assert!(extract_quoted(b"no quote", 0).is_none());
        assert!(extract_quoted(b"\"unterminated", 0).is_none());
        assert!(extract_quoted(b"\"escape at end\\", 0).is_none());
        assert!(extract_quoted(b"\"escape at end\\\"", 0).is_none());
        assert!(extract_quoted(b"", 0).is_none());
        assert!(extract_quoted(b"\"x\"", 3).is_none());
    }

    #[test]
    fn decoded_backslash_escapes_any_byte() {
        let (payload, _) = decode_quoted(b"\"\\\\\\n\"", 0).unwrap();
        // "\\" -> backslash, "\n" -> literal 'n'.
        assert_eq!(payload, b"\\n");
    }
}
