//! Reply classification for the command channel
//!
//! The device answers commands in several shapes and never says which one
//! it is using:
//!
//! | First datagram | Second datagram | Classified as |
//! |----------------|-----------------|---------------|
//! | (none) | - | [`Reply::Missing`] |
//! | `ok` | (none) | [`Reply::Ok`] |
//! | `ok` | any text | [`Reply::OkWithMessage`] |
//! | `ok <text>` | - | [`Reply::OkWithMessage`] |
//! | `error` | `ok` | [`Reply::ErrorThenOk`] |
//! | `error` | anything else / none | [`Reply::Error`] |
//! | `error <text>`, empty | - | [`Reply::Ambiguous`] |
//! | anything else | - | [`Reply::Data`] |
//!
//! Payloads are compared after trimming surrounding whitespace; some
//! firmware versions append `\r\n` to data replies.

use crate::core::types::Reply;

/// Literal token the device sends when it refuses a command
pub const ERROR_TOKEN: &str = "error";

/// Literal token the device sends when it accepts a command
pub const OK_TOKEN: &str = "ok";

/// Classify the (up to two) datagrams received for one command
pub fn classify(first: Option<&str>, second: Option<&str>) -> Reply {
    let Some(first) = first else {
        return Reply::Missing;
    };
    let first = first.trim();
    let second = second.map(str::trim).filter(|s| !s.is_empty());

    if first == ERROR_TOKEN {
        return match second {
            Some(OK_TOKEN) => Reply::ErrorThenOk,
            _ => Reply::Error,
        };
    }

    if first == OK_TOKEN {
        return match second {
            Some(message) => Reply::OkWithMessage(message.to_string()),
            None => Reply::Ok,
        };
    }

    if let Some(message) = first.strip_prefix("ok ") {
        return Reply::OkWithMessage(message.trim().to_string());
    }

    if first.is_empty() || first.starts_with(ERROR_TOKEN) {
        return Reply::Ambiguous(first.to_string());
    }

    Reply::Data(first.to_string())
}

/// Decode a reply datagram, replacing invalid UTF-8 sequences
pub fn decode(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// Extract the leading number from a query reply
///
/// Handles bare values (`87`), values with units (`10dm`, `42s`) and
/// decimals (`100.0`).
pub fn parse_numeric(reply: &str) -> Option<f64> {
    let reply = reply.trim();
    let end = reply
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (c == '-' && i == 0)))
        .map_or(reply.len(), |(i, _)| i);
    reply[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_datagram_is_missing() {
        assert_eq!(classify(None, None), Reply::Missing);
    }

    #[test]
    fn test_plain_ok() {
        assert_eq!(classify(Some("ok"), None), Reply::Ok);
    }

    #[test]
    fn test_ok_then_delayed_message() {
        assert_eq!(
            classify(Some("ok"), Some("ok")),
            Reply::OkWithMessage("ok".to_string())
        );
    }

    #[test]
    fn test_ok_with_inline_message() {
        assert_eq!(
            classify(Some("ok speed set"), None),
            Reply::OkWithMessage("speed set".to_string())
        );
    }

    #[test]
    fn test_error_token() {
        assert_eq!(classify(Some("error"), None), Reply::Error);
        assert_eq!(classify(Some("error"), Some("  ")), Reply::Error);
    }

    #[test]
    fn test_error_then_ok() {
        assert_eq!(classify(Some("error"), Some("ok")), Reply::ErrorThenOk);
    }

    #[test]
    fn test_bare_data() {
        assert_eq!(classify(Some("87\r\n"), None), Reply::Data("87".to_string()));
        assert_eq!(classify(Some("10dm"), None), Reply::Data("10dm".to_string()));
    }

    #[test]
    fn test_unknown_shapes_are_ambiguous() {
        assert_eq!(
            classify(Some("error Motor stop"), None),
            Reply::Ambiguous("error Motor stop".to_string())
        );
        assert_eq!(classify(Some("\r\n"), None), Reply::Ambiguous(String::new()));
    }

    #[test]
    fn test_trailing_whitespace_does_not_hide_error() {
        assert_eq!(classify(Some("error\r\n"), None), Reply::Error);
    }

    #[test]
    fn test_decode_lossy() {
        assert_eq!(decode(b"ok"), "ok");
        assert_eq!(decode(&[0x6f, 0xff]), "o\u{fffd}");
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("87\r\n"), Some(87.0));
        assert_eq!(parse_numeric("10dm"), Some(10.0));
        assert_eq!(parse_numeric("100.0"), Some(100.0));
        assert_eq!(parse_numeric("-3"), Some(-3.0));
        assert_eq!(parse_numeric("error"), None);
        assert_eq!(parse_numeric(""), None);
    }
}
