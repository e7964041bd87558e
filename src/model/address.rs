//! Sender display splitting (RFC 5322 §3.4 name-addr).

/// A mailbox split into display name and address.
///
/// # Examples
/// - `"Jane Doe <jane@example.com>"` → `name = Some("Jane Doe")`, `email = "jane@example.com"`
/// - `"jane@example.com"` → `name = None`, `email = "jane@example.com"`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Mailbox {
    /// Display name, `None` when absent or identical to the address.
    pub name: Option<String>,
    /// Bare address (`user@domain`). Holds the raw text when nothing parses.
    pub email: String,
}

impl Mailbox {
    /// Split a `From`-style value into name and address.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                let email = trimmed[open + 1..close].trim().to_string();
                let name = unquote(trimmed[..open].trim());
                let name = (!name.is_empty() && name != email).then_some(name);
                return Self { name, email };
            }
        }

        Self {
            name: None,
            email: trimmed.to_string(),
        }
    }

    /// The display name when present, the address otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

fn unquote(s: &str) -> String {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
        .trim()
        .to_string()
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}
