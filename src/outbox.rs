//! Sending: hand a draft to the transmission service, then file the
//! composed message under [`store::SENT`].

use tracing::info;

use crate::compose::{self, Draft};
use crate::error::Result;
use crate::store::{self, MailStore};

/// An outbound mail service.
pub trait Transport {
    /// Transmit `draft`, returning the message id the service assigned.
    fn send(&self, draft: &Draft) -> Result<String>;
}

/// A message that went out, as filed under [`store::SENT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// Id assigned by the transport, also the record id.
    pub id: String,
    /// The stored EML bytes.
    pub eml: Vec<u8>,
}

/// Send `draft` and keep a copy in the sent folder, keyed by the returned id.
///
/// Transport errors are returned as-is and nothing is stored.
pub fn send(transport: &dyn Transport, store: &dyn MailStore, draft: &Draft) -> Result<Sent> {
    let id = transport.send(draft)?;
    let eml = compose::compose(draft, &id);
    store.put(store::SENT, &id, &eml)?;
    info!(id = %id, to = draft.to.len(), "Sent message");
    Ok(Sent { id, eml })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailError;
    use crate::parser::mime;
    use crate::store::MemoryStore;

    struct FixedId(&'static str);

    impl Transport for FixedId {
        fn send(&self, _draft: &Draft) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Down;

    impl Transport for Down {
        fn send(&self, _draft: &Draft) -> Result<String> {
            Err(MailError::Transport("service unavailable".into()))
        }
    }

    fn draft() -> Draft {
        Draft {
            from: "me@example.com".into(),
            subject: "Status".into(),
            body: "All good".into(),
            to: vec!["you@example.com".into()],
            cc: vec![],
        }
    }

    #[test]
    fn test_send_stores_composed_copy() {
        let store = MemoryStore::new();
        let sent = send(&FixedId("0100018f"), &store, &draft()).unwrap();
        assert_eq!(sent.id, "0100018f");

        let record = store.get("sent", "0100018f").unwrap();
        assert_eq!(record.raw, sent.eml);
        let raw = String::from_utf8(record.raw.clone()).unwrap();
        assert!(raw.contains("Message-ID: <0100018f@email.amazonses.com>\r\n"));

        let message = mime::decode(&record.raw).unwrap();
        assert_eq!(message.subject, "Status");
        assert_eq!(message.text, message.html);
    }

    #[test]
    fn test_transport_error_stores_nothing() {
        let store = MemoryStore::new();
        let err = send(&Down, &store, &draft()).unwrap_err();
        assert!(matches!(err, MailError::Transport(_)));
        assert!(store.count("sent").is_err());
    }
}
