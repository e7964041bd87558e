//! Read side: stored records decoded into [`Message`]s, one page at a time.

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::message::Message;
use crate::parser::mime;
use crate::store::{MailStore, StoredRecord};

/// Decodes pages of a [`MailStore`].
pub struct Pager<'a> {
    store: &'a dyn MailStore,
}

impl<'a> Pager<'a> {
    pub fn new(store: &'a dyn MailStore) -> Self {
        Self { store }
    }

    /// Page `page` (1-based) of `folder`, decoded.
    ///
    /// A record that does not decode still fills its slot with whatever
    /// headers could be read, so one bad message never hides a page.
    pub fn get_page(&self, folder: &str, page: usize, page_size: usize) -> Result<Vec<Message>> {
        Ok(self
            .get_entries(folder, page, page_size)?
            .into_iter()
            .map(|(_, message)| message)
            .collect())
    }

    /// Like [`get_page`](Self::get_page), keeping each record's id.
    pub fn get_entries(
        &self,
        folder: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<(String, Message)>> {
        let records = self.store.get_page(folder, page, page_size)?;
        debug!(folder = folder, page = page, records = records.len(), "Decoding page");
        Ok(records
            .into_iter()
            .map(|record| {
                let message = decode_record(&record);
                (record.id, message)
            })
            .collect())
    }

    /// One decoded message.
    pub fn get(&self, folder: &str, id: &str) -> Result<Message> {
        let record = self.store.get(folder, id)?;
        Ok(decode_record(&record))
    }
}

fn decode_record(record: &StoredRecord) -> Message {
    match mime::decode(&record.raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(folder = %record.folder, id = %record.id, error = %e, "Record does not decode");
            mime::decode_lenient(&record.raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailError;
    use crate::store::MemoryStore;

    fn store_with(records: &[(&str, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (id, raw) in records {
            store.put("inbox", id, raw.as_bytes()).unwrap();
        }
        store
    }

    #[test]
    fn test_page_is_decoded_in_id_order() {
        let store = store_with(&[
            ("b", "From: b@x.com\r\nSubject: second\r\n\r\ntwo"),
            ("a", "From: a@x.com\r\nSubject: first\r\n\r\none"),
        ]);
        let page = Pager::new(&store).get_page("inbox", 1, 10).unwrap();
        let subjects: Vec<_> = page.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, ["first", "second"]);
        assert_eq!(page[1].text, "two");
    }

    #[test]
    fn test_bad_record_keeps_its_slot() {
        let store = store_with(&[
            ("a", "From: a@x.com\r\nContent-Type: nonsense\r\n\r\nbody"),
            ("b", "From: b@x.com\r\n\r\nfine"),
        ]);
        let page = Pager::new(&store).get_entries("inbox", 1, 10).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].0, "a");
        assert_eq!(page[0].1.from, "a@x.com");
        assert!(page[0].1.text.is_empty());
        assert_eq!(page[1].1.text, "fine");
    }

    #[test]
    fn test_get_single_and_missing() {
        let store = store_with(&[("a", "Subject: only\r\n\r\nhi")]);
        let pager = Pager::new(&store);
        assert_eq!(pager.get("inbox", "a").unwrap().subject, "only");
        assert!(matches!(pager.get("inbox", "z"), Err(MailError::NotFound(_))));
        assert!(matches!(pager.get_page("sent", 1, 5), Err(MailError::NotFound(_))));
    }
}
