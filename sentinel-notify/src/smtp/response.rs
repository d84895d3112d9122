//! SMTP response parsing.

use super::error::{ClientError, Result};

/// A complete (possibly multi-line) SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All message lines joined with newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 2xx: the command was accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: the server expects a continuation (DATA, AUTH challenges).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// 4xx: transient failure, retryable.
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// 5xx: permanent rejection.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Tries to parse one complete response from the front of `buffer`.
    ///
    /// Returns the response and the number of bytes consumed, or `None`
    /// when the buffer does not yet hold a full response.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut code = None;
        let mut consumed = 0;

        loop {
            let rest = &buffer[consumed..];
            let Some(end) = rest.iter().position(|&b| b == b'\n') else {
                return Ok(None); // incomplete line, need more data
            };

            let raw = &rest[..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = std::str::from_utf8(raw)
                .map_err(|e| ClientError::Parse(format!("invalid UTF-8 in response: {e}")))?;
            consumed += end + 1;

            let (line_code, last, text) = parse_line(line)?;
            match code {
                None => code = Some(line_code),
                Some(code) if code != line_code => {
                    return Err(ClientError::Parse(format!(
                        "status code changed mid-response: {code} then {line_code}"
                    )));
                }
                Some(_) => {}
            }
            lines.push(text.to_string());

            if last {
                let code = code.unwrap_or_default();
                return Ok(Some((Self::new(code, lines), consumed)));
            }
        }
    }
}

/// Splits one response line into (code, is-last, text).
fn parse_line(line: &str) -> Result<(u16, bool, &str)> {
    if line.len() < 3 || !line.as_bytes()[..3].iter().all(u8::is_ascii_digit) {
        return Err(ClientError::Parse(format!("malformed response line: '{line}'")));
    }

    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| ClientError::Parse(format!("invalid status code in '{line}'")))?;

    match line.as_bytes().get(3) {
        None => Ok((code, true, "")),
        Some(b' ') => Ok((code, true, &line[4..])),
        Some(b'-') => Ok((code, false, &line[4..])),
        Some(_) => Err(ClientError::Parse(format!(
            "invalid separator in response line: '{line}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_single_line_response() {
        let (response, consumed) = Response::parse(b"250 OK\r\n").unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(response.lines, vec!["OK"]);
        assert_eq!(consumed, 8);
        assert!(response.is_success());
    }

    #[test]
    fn parses_multi_line_response() {
        let data = b"250-mail.example.com\r\n250-STARTTLS\r\n250 AUTH LOGIN PLAIN\r\n";
        let (response, consumed) = Response::parse(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mail.example.com", "STARTTLS", "AUTH LOGIN PLAIN"]
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn incomplete_responses_need_more_data() {
        assert!(Response::parse(b"250-mail.example.com\r\n250-SIZ").unwrap().is_none());
        assert!(Response::parse(b"25").unwrap().is_none());
    }

    #[test]
    fn leftover_bytes_are_not_consumed() {
        let data = b"334 VXNlcm5hbWU6\r\n235 ok\r\n";
        let (response, consumed) = Response::parse(data).unwrap().unwrap();
        assert_eq!(response.code, 334);
        assert!(response.is_intermediate());
        assert_eq!(&data[consumed..], b"235 ok\r\n");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Response::parse(b"hello world\r\n").is_err());
        assert!(Response::parse(b"250-a\r\n550 b\r\n").is_err());
    }

    #[test]
    fn classification() {
        assert!(Response::new(354, vec![]).is_intermediate());
        assert!(Response::new(421, vec![]).is_temporary_error());
        assert!(Response::new(550, vec![]).is_permanent_error());
    }
}
