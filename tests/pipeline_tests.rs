//! Integration tests: decoding real-shaped messages, ingestion from a bucket
//! mirror into the disk store, pagination, and compose round trips.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use astromail::compose::{compose, Draft};
use astromail::error::MailError;
use astromail::ingest::source::DirSource;
use astromail::ingest::{Ingest, SETUP_NOTIFICATION_ID};
use astromail::outbox::{self, Transport};
use astromail::pager::Pager;
use astromail::parser::header::decode_encoded_words;
use astromail::parser::mime;
use astromail::store::{DiskStore, MailStore, MemoryStore};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

/// Lay out a bucket mirror: `emails/<id>` per entry, oldest first.
fn bucket(objects: &[(&str, Vec<u8>)]) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let emails = tmp.path().join("emails");
    std::fs::create_dir_all(&emails).unwrap();
    let base = SystemTime::now() - Duration::from_secs(3600);
    for (i, (id, raw)) in objects.iter().enumerate() {
        let path = emails.join(id);
        std::fs::write(&path, raw).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(base + Duration::from_secs(60 * i as u64)).unwrap();
    }
    tmp
}

// ─── Decoding ───────────────────────────────────────────────────────

#[test]
fn test_decode_msg1() {
    let message = mime::decode(&read_fixture("msg1.eml")).unwrap();
    assert_eq!(message.from, "a@b.com");
    assert_eq!(message.subject, "Hi");
    assert_eq!(message.to, ["inbox@example.com"]);
    assert_eq!(message.date, "Fri, 01 Mar 2024 12:00:00 +0000");
    assert_eq!(message.text, "hello");
    assert_eq!(message.html, "<p>hello</p>");
    assert!(message.attachments.is_empty());
    assert!(message.parsed_date().is_some());
}

#[test]
fn test_decode_attachments_fixture() {
    let message = mime::decode(&read_fixture("attachments.eml")).unwrap();

    assert_eq!(message.sender().name.as_deref(), Some("Ana Ruiz"));
    assert_eq!(message.subject, "Informe trimestral \u{2013} Q1");
    assert_eq!(message.to, ["Hello <hello@example.com>", "team@example.com"]);
    assert_eq!(
        message.text,
        "Adjunto el informe del a\u{f1}o. Un saludo muy cordial desde la oficina de Madrid."
    );
    assert!(message.html.is_empty());

    assert_eq!(message.attachments.len(), 2);
    let pdf = &message.attachments[0];
    assert_eq!(pdf.filename, "informe.pdf");
    assert_eq!(pdf.content_type, "application/pdf");
    let payload = read_fixture("payload.bin");
    assert_eq!(pdf.decoded().unwrap(), payload);
    assert_eq!(pdf.size(), payload.len());

    let png = &message.attachments[1];
    assert_eq!(png.filename, "logo.png");
    assert_eq!(png.content_type, "image/png");
    assert!(png.decoded().unwrap().starts_with(b"\x89PNG"));
}

#[test]
fn test_decode_single_part_html() {
    let message = mime::decode(&read_fixture("html_only.eml")).unwrap();
    assert_eq!(message.sender().email, "news@example.net");
    assert!(message.text.is_empty());
    assert_eq!(message.html, "<h1>Novedades</h1><p>Caf\u{e9} gratis</p>");
}

#[test]
fn test_encoded_word_header() {
    assert_eq!(decode_encoded_words("=?UTF-8?B?SGVsbG8=?="), "Hello");
    let raw = b"From: x@y.z\r\nSubject: =?UTF-8?B?SGVsbG8=?=\r\n\r\nbody";
    assert_eq!(mime::decode(raw).unwrap().subject, "Hello");
}

// ─── Compose round trip ─────────────────────────────────────────────

#[test]
fn test_compose_decode_round_trip() {
    let draft = Draft {
        from: "me@example.com".into(),
        subject: "Reuni\u{f3}n ma\u{f1}ana".into(),
        body: "<p>Nos vemos a las 10</p>".into(),
        to: vec!["a@example.com".into(), "b@example.com".into()],
        cc: vec!["c@example.com".into()],
    };
    let eml = compose(&draft, "0100018e-abcd");
    let message = mime::decode(&eml).unwrap();

    assert_eq!(message.from, draft.from);
    assert_eq!(message.subject, draft.subject);
    assert_eq!(message.to, ["a@example.com, b@example.com"]);
    assert_eq!(message.text, draft.body);
    assert_eq!(message.html, draft.body);
    assert!(message.parsed_date().is_some());
}

// ─── Ingestion ──────────────────────────────────────────────────────

#[test]
fn test_end_to_end_ingest_and_page() {
    let mirror = bucket(&[
        (SETUP_NOTIFICATION_ID, read_fixture("setup_notification.eml")),
        ("MSG1", read_fixture("msg1.eml")),
    ]);
    let data = tempfile::tempdir().unwrap();
    let store = DiskStore::open(data.path()).unwrap();
    let source = DirSource::new(mirror.path());

    let report = Ingest::new(&source, &store).run("emails/").unwrap();
    assert_eq!(report.stored, 1);
    assert_eq!(report.sentinels, 1);
    assert!(report.failures.is_empty());
    assert_eq!(store.count("inbox").unwrap(), 1);

    let page = Pager::new(&store).get_page("inbox", 1, 50).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].from, "a@b.com");
    assert_eq!(page[0].subject, "Hi");
    assert_eq!(page[0].text, "hello");
    assert_eq!(page[0].html, "<p>hello</p>");

    // Stored bytes are the object, untouched
    assert_eq!(store.get("inbox", "MSG1").unwrap().raw, read_fixture("msg1.eml"));
}

#[test]
fn test_ingest_is_idempotent() {
    let mirror = bucket(&[
        ("one", read_fixture("msg1.eml")),
        ("two", read_fixture("attachments.eml")),
        ("three", read_fixture("html_only.eml")),
    ]);
    let data = tempfile::tempdir().unwrap();
    let store = DiskStore::open(data.path()).unwrap();
    let source = DirSource::new(mirror.path());
    let ingest = Ingest::new(&source, &store);

    let first = ingest.run("emails/").unwrap();
    assert_eq!(first.stored, 3);

    let second = ingest.run("emails/").unwrap();
    assert_eq!(second.stored, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(store.count("inbox").unwrap(), 3);
}

#[test]
fn test_ingest_empty_prefix() {
    let mirror = bucket(&[]);
    let store = MemoryStore::new();
    let source = DirSource::new(mirror.path());

    let report = Ingest::new(&source, &store).run("emails/").unwrap();
    assert_eq!(report.listed, 0);
    assert_eq!(report.stored, 0);
    // Nothing was stored, so the folder was never created
    assert!(matches!(store.count("inbox"), Err(MailError::NotFound(_))));
}

// ─── Pagination ─────────────────────────────────────────────────────

#[test]
fn test_pages_are_deterministic_and_disjoint() {
    let data = tempfile::tempdir().unwrap();
    let store = DiskStore::open(data.path()).unwrap();
    let raw = read_fixture("msg1.eml");
    for i in [7, 3, 9, 1, 5, 2, 8, 4, 6, 0] {
        store.put("inbox", &format!("id-{i:02}"), &raw).unwrap();
    }

    let ids = |page| -> Vec<String> {
        store
            .get_page("inbox", page, 4)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    };

    let first = ids(1);
    assert_eq!(first, ["id-00", "id-01", "id-02", "id-03"]);
    assert_eq!(ids(1), first);
    assert_eq!(ids(2), ["id-04", "id-05", "id-06", "id-07"]);
    assert_eq!(ids(3), ["id-08", "id-09"]);
    assert!(ids(4).is_empty());
    assert!(ids(100).is_empty());
}

#[test]
fn test_page_requests_are_validated() {
    let data = tempfile::tempdir().unwrap();
    let store = DiskStore::open(data.path()).unwrap();
    store.put("inbox", "a", b"Subject: x\r\n\r\ny").unwrap();

    let pager = Pager::new(&store);
    assert!(matches!(pager.get_page("inbox", 0, 10), Err(MailError::InvalidRequest(_))));
    assert!(matches!(pager.get_page("inbox", 1, 0), Err(MailError::InvalidRequest(_))));
    assert!(matches!(pager.get_page("archive", 1, 10), Err(MailError::NotFound(_))));
}

#[test]
fn test_concurrent_put_single_winner() {
    let data = tempfile::tempdir().unwrap();
    let store = DiskStore::open(data.path()).unwrap();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8u8)
            .map(|n| {
                let store = &store;
                s.spawn(move || store.put("inbox", "race", &[n]))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(MailError::is_duplicate));
    assert_eq!(store.count("inbox").unwrap(), 1);
}

// ─── Sending ────────────────────────────────────────────────────────

struct ServiceStub;

impl Transport for ServiceStub {
    fn send(&self, _draft: &Draft) -> astromail::error::Result<String> {
        Ok("0100018f-send".to_string())
    }
}

#[test]
fn test_sent_message_is_listed() {
    let data = tempfile::tempdir().unwrap();
    let store = DiskStore::open(data.path()).unwrap();
    let draft = Draft {
        from: "me@example.com".into(),
        subject: "Out".into(),
        body: "<b>bye</b>".into(),
        to: vec!["you@example.com".into()],
        cc: vec![],
    };

    let sent = outbox::send(&ServiceStub, &store, &draft).unwrap();
    let entries = Pager::new(&store).get_entries("sent", 1, 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, sent.id);
    assert_eq!(store.get("sent", &sent.id).unwrap().raw, sent.eml);
    assert_eq!(entries[0].1.html, "<b>bye</b>");
}
