/// Broker frame encoding (the STOMP 1.2 subset the client uses)
use crate::error::{ChatError, Result};
use std::fmt;

/// Protocol versions offered at CONNECT
pub const ACCEPT_VERSION: &str = "1.2,1.1";

/// Frame commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "SEND" => Command::Send,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            _ => return None,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single broker frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header (repeated headers: first one wins)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, credential: &str) -> Self {
        let frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", "0,0");
        if credential.is_empty() {
            frame
        } else {
            frame.header("Authorization", &format!("Bearer {}", credential))
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, json: &str) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", &json.len().to_string())
            .with_body(json)
    }

    /// Serialize to wire text (NUL terminated)
    pub fn encode(&self) -> String {
        // CONNECT headers are sent verbatim, everything else is escaped
        let escape = self.command != Command::Connect && self.command != Command::Connected;
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Returns `Ok(None)` for a bare heart-beat (only EOLs).
    pub fn decode(data: &str) -> Result<Option<Self>> {
        let data = data.trim_start_matches(['\r', '\n']);
        if data.is_empty() {
            return Ok(None);
        }

        let (head, rest) = split_head(data)
            .ok_or_else(|| ChatError::Protocol("Frame has no header terminator".to_string()))?;

        let mut lines = head.lines();
        let command_line = lines.next().unwrap_or("").trim_end_matches('\r');
        let command = Command::parse(command_line).ok_or_else(|| {
            ChatError::Protocol(format!("Unknown frame command: {:?}", command_line))
        })?;
        let unescape = command != Command::Connect && command != Command::Connected;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ChatError::Protocol(format!("Malformed header line: {:?}", line))
            })?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .and_then(|(_, v)| v.parse::<usize>().ok());

        let body = match content_length {
            Some(len) if len <= rest.len() && rest.is_char_boundary(len) => rest[..len].to_string(),
            Some(len) => {
                return Err(ChatError::Protocol(format!(
                    "Body shorter than content-length {}",
                    len
                )))
            }
            None => match rest.find('\0') {
                Some(end) => rest[..end].to_string(),
                None => rest.to_string(),
            },
        };

        Ok(Some(Self {
            command,
            headers,
            body,
        }))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.command)
    }
}

fn split_head(data: &str) -> Option<(&str, &str)> {
    if let Some(idx) = data.find("\n\n") {
        return Some((&data[..idx], &data[idx + 2..]));
    }
    data.find("\r\n\r\n")
        .map(|idx| (&data[..idx], &data[idx + 4..]))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::Protocol(format!(
                    "Invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_frame_encoding() {
        let frame = Frame::send("/app/chat.send", r#"{"a":1}"#);
        let wire = frame.encode();
        assert!(wire.starts_with("SEND\ndestination:/app/chat.send\n"));
        assert!(wire.contains("content-length:7\n"));
        assert!(wire.ends_with("\n\n{\"a\":1}\0"));
    }

    #[test]
    fn test_decode_message_frame() {
        let wire = "MESSAGE\nsubscription:sub-0\ndestination:/topic/conversation/3\nmessage-id:1\n\n{\"x\":true}\0";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.get("destination"), Some("/topic/conversation/3"));
        assert_eq!(frame.body, "{\"x\":true}");
    }

    #[test]
    fn test_heartbeat_is_ignored() {
        assert_eq!(Frame::decode("\n").unwrap(), None);
        assert_eq!(Frame::decode("\r\n\r\n").unwrap(), None);
    }

    #[test]
    fn test_header_escaping() {
        let frame = Frame::new(Command::Send).header("note", "a:b\nc");
        let wire = frame.encode();
        assert!(wire.contains("note:a\\cb\\nc\n"));
        let parsed = Frame::decode(&wire).unwrap().unwrap();
        assert_eq!(parsed.get("note"), Some("a:b\nc"));
    }

    #[test]
    fn test_connect_headers_are_verbatim() {
        let wire = Frame::connect("localhost", "abc.def").encode();
        assert!(wire.starts_with("CONNECT\n"));
        assert!(wire.contains("Authorization:Bearer abc.def\n"));
    }

    #[test]
    fn test_unknown_command_is_protocol_error() {
        let result = Frame::decode("BOGUS\n\n\0");
        assert!(matches!(result, Err(ChatError::Protocol(_))));
    }

    #[test]
    fn test_content_length_body() {
        let wire = "MESSAGE\ncontent-length:3\n\nabc\0";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.body, "abc");
    }
}
