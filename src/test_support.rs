use chrono::{DateTime, TimeDelta, Utc};
use compact_str::CompactString;
use proptest::prelude::*;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;

use crate::{
    dump_parser::{Contributor, PageRecord, RevisionRecord, Sha1Hash},
    flatten::{flatten_page, FlatRevisionRow},
    tags::EXPORT_NAMESPACE,
    utils::RevisionHash,
};

pub mod prelude {
    pub(crate) use super::{
        arb_page, dummy_revision, dump_to_xml, hash_label, page_with_hashes, rows_with_hashes,
    };
    pub(crate) use proptest::prelude::*;
}

pub fn dummy_revision() -> RevisionRecord {
    RevisionRecord {
        revision_id: 1,
        parent_id: None,
        timestamp: DateTime::from_timestamp(1_100_000_000, 0).unwrap(),
        contributor: Some(Contributor::Registered {
            username: "Dummy".into(),
            user_id: Some(1),
        }),
        comment: None,
        is_minor: false,
        byte_size: Some(10),
        content_hash: None,
    }
}

/// SHA1-style content hash derived from a short alphanumeric label, so tests can write `"a"` instead of a digest.
pub fn hash_label(label: &str) -> RevisionHash {
    let padded = format!("{label:0>31}");
    RevisionHash::Sha1(Sha1Hash::parse(padded.as_bytes()).unwrap())
}

/// A page whose revisions carry the given hash labels, one minute apart, each the parent of the next.
pub fn page_with_hashes(page_id: u64, title: &str, hashes: &[Option<&str>]) -> PageRecord {
    let start = dummy_revision().timestamp;
    let revisions = hashes
        .iter()
        .enumerate()
        .map(|(i, hash)| {
            let revision_id = page_id * 1000 + i as u64 + 1;
            RevisionRecord {
                revision_id,
                parent_id: (i > 0).then(|| revision_id - 1),
                timestamp: start + TimeDelta::minutes(i as i64),
                content_hash: hash.map(hash_label),
                ..dummy_revision()
            }
        })
        .collect();

    PageRecord {
        page_id,
        title: title.into(),
        namespace_key: 0,
        is_redirect: false,
        redirect_target: None,
        revisions,
    }
}

pub fn rows_with_hashes(hashes: &[Option<&str>]) -> Vec<FlatRevisionRow> {
    flatten_page(&page_with_hashes(1, "Page", hashes)).collect()
}

fn write_element<W: std::io::Write>(writer: &mut quick_xml::Writer<W>, name: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .unwrap();
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .unwrap();
    writer.write_event(Event::End(BytesEnd::new(name))).unwrap();
}

fn write_revision<W: std::io::Write>(writer: &mut quick_xml::Writer<W>, revision: &RevisionRecord) {
    // Source: https://github.com/mediawiki-utilities/python-mwtypes/blob/523a93f98fe1372938fc15872b5abb1f267cc643/mwtypes/timestamp.py#L12
    const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";

    writer
        .write_event(Event::Start(BytesStart::new("revision")))
        .unwrap();
    write_element(writer, "id", &revision.revision_id.to_string());
    if let Some(parent_id) = revision.parent_id {
        write_element(writer, "parentid", &parent_id.to_string());
    }
    write_element(
        writer,
        "timestamp",
        &revision.timestamp.format(TIMESTAMP_FORMAT_LONG).to_string(),
    );

    match &revision.contributor {
        Some(contributor) => {
            writer
                .write_event(Event::Start(BytesStart::new("contributor")))
                .unwrap();
            match contributor {
                Contributor::Registered { username, user_id } => {
                    write_element(writer, "username", username);
                    if let Some(user_id) = user_id {
                        write_element(writer, "id", &user_id.to_string());
                    }
                }
                Contributor::Anonymous { ip } => write_element(writer, "ip", ip),
            }
            writer
                .write_event(Event::End(BytesEnd::new("contributor")))
                .unwrap();
        }
        None => {
            writer
                .write_event(Event::Empty(
                    BytesStart::new("contributor").with_attributes([("deleted", "deleted")]),
                ))
                .unwrap();
        }
    }

    if revision.is_minor {
        writer
            .write_event(Event::Empty(BytesStart::new("minor")))
            .unwrap();
    }
    if let Some(comment) = &revision.comment {
        write_element(writer, "comment", comment);
    }
    write_element(writer, "model", "wikitext");
    write_element(writer, "format", "text/x-wiki");

    let bytes_str = revision.byte_size.map(|bytes| bytes.to_string());
    let sha1_str = revision.content_hash.map(|hash| hash.to_string());
    let mut attributes = vec![("xml:space", "preserve")];
    if let Some(bytes) = &bytes_str {
        attributes.push(("bytes", bytes.as_str()));
    }
    if let Some(sha1) = &sha1_str {
        attributes.push(("sha1", sha1.as_str()));
    }
    if bytes_str.is_none() && sha1_str.is_none() {
        attributes.push(("deleted", "deleted"));
    }
    writer
        .write_event(Event::Empty(
            BytesStart::new("text").with_attributes(attributes.into_iter()),
        ))
        .unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("revision")))
        .unwrap();
}

/// Render pages as a complete export document. Content hashes must be SHA1 ones.
pub fn dump_to_xml(pages: &[PageRecord]) -> String {
    let mut xml = Vec::new();
    let mut writer = quick_xml::Writer::new(Cursor::new(&mut xml));
    writer
        .write_event(Event::Start(
            BytesStart::new("mediawiki")
                .with_attributes([("xmlns", EXPORT_NAMESPACE), ("version", "0.11")]),
        ))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("siteinfo")))
        .unwrap();
    write_element(&mut writer, "dbname", "testwiki");
    writer
        .write_event(Event::End(BytesEnd::new("siteinfo")))
        .unwrap();

    for page in pages {
        writer
            .write_event(Event::Start(BytesStart::new("page")))
            .unwrap();
        write_element(&mut writer, "title", &page.title);
        write_element(&mut writer, "ns", &page.namespace_key.to_string());
        write_element(&mut writer, "id", &page.page_id.to_string());
        if page.is_redirect {
            let mut redirect = BytesStart::new("redirect");
            if let Some(target) = &page.redirect_target {
                redirect.push_attribute(("title", target.as_str()));
            }
            writer.write_event(Event::Empty(redirect)).unwrap();
        }
        for revision in &page.revisions {
            write_revision(&mut writer, revision);
        }
        writer
            .write_event(Event::End(BytesEnd::new("page")))
            .unwrap();
    }

    writer
        .write_event(Event::End(BytesEnd::new("mediawiki")))
        .unwrap();
    String::from_utf8(xml).unwrap()
}

fn arb_text(pattern: &'static str) -> impl Strategy<Value = CompactString> {
    pattern.prop_map(CompactString::from)
}

fn arb_contributor() -> impl Strategy<Value = Option<Contributor>> {
    prop_oneof![
        1 => Just(None),
        3 => (arb_text("[A-Za-z][A-Za-z0-9_]{0,12}"), proptest::option::of(1u64..10_000_000))
            .prop_map(|(username, user_id)| Some(Contributor::Registered { username, user_id })),
        2 => arb_text("(192\\.0\\.2|198\\.51\\.100)\\.[0-9]{1,3}")
            .prop_map(|ip| Some(Contributor::Anonymous { ip })),
    ]
}

prop_compose! {
    fn arb_revision()(
        revision_id in 1u64..1_000_000_000,
        parent_id in proptest::option::of(1u64..1_000_000_000),
        seconds in 0i64..2_000_000_000,
        contributor in arb_contributor(),
        comment in proptest::option::of(arb_text("[a-z][a-z <>&]{0,20}[a-z]")),
        is_minor in any::<bool>(),
        byte_size in proptest::option::of(0u64..1_000_000),
        hash in proptest::option::of("[a-z0-9]{1,6}"),
    ) -> RevisionRecord {
        RevisionRecord {
            revision_id,
            parent_id,
            timestamp: DateTime::<Utc>::from_timestamp(seconds, 0).unwrap(),
            contributor,
            comment,
            is_minor,
            byte_size,
            content_hash: hash.as_deref().map(hash_label),
        }
    }
}

prop_compose! {
    pub fn arb_page()(
        page_id in 1u64..100_000_000,
        title in arb_text("[A-Z][A-Za-z0-9 ()]{0,24}[a-z]"),
        namespace_key in -2i32..20,
        redirect in proptest::option::of(proptest::option::of(arb_text("[A-Z][a-z]{0,10}"))),
        revisions in proptest::collection::vec(arb_revision(), 0..6),
    ) -> PageRecord {
        let is_redirect = redirect.is_some();
        let redirect_target = redirect.flatten();
        PageRecord { page_id, title, namespace_key, is_redirect, redirect_target, revisions }
    }
}
