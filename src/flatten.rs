//! Projection of page records into flat, self-contained revision rows and back.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    dump_parser::{Contributor, PageRecord, RevisionRecord},
    utils::RevisionHash,
};

/// One revision with the fields of its page repeated. Absent values are `None`, never empty strings or zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRevisionRow {
    pub page_id: u64,
    pub page_title: CompactString,
    pub is_redirect: bool,
    pub redirect_target: Option<CompactString>,
    pub revision_id: u64,
    pub parent_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub contributor_username: Option<CompactString>,
    pub contributor_id: Option<u64>,
    pub contributor_ip: Option<CompactString>,
    pub comment: Option<CompactString>,
    pub is_minor: bool,
    pub text_bytes: Option<u64>,
    pub text_sha1: Option<RevisionHash>,
}

impl FlatRevisionRow {
    fn new(page: &PageRecord, revision: &RevisionRecord) -> Self {
        let contributor = revision.contributor.as_ref();
        Self {
            page_id: page.page_id,
            page_title: page.title.clone(),
            is_redirect: page.is_redirect,
            redirect_target: page.redirect_target.clone(),
            revision_id: revision.revision_id,
            parent_id: revision.parent_id,
            timestamp: revision.timestamp,
            contributor_username: contributor.and_then(Contributor::username).map(CompactString::from),
            contributor_id: contributor.and_then(Contributor::user_id),
            contributor_ip: contributor.and_then(Contributor::ip).map(CompactString::from),
            comment: revision.comment.clone(),
            is_minor: revision.is_minor,
            text_bytes: revision.byte_size,
            text_sha1: revision.content_hash,
        }
    }

    /// Rebuild the revision this row was flattened from.
    pub fn revision(&self) -> RevisionRecord {
        let contributor = match (&self.contributor_username, &self.contributor_ip) {
            (Some(username), _) => Some(Contributor::Registered {
                username: username.clone(),
                user_id: self.contributor_id,
            }),
            (None, Some(ip)) => Some(Contributor::Anonymous { ip: ip.clone() }),
            (None, None) => None,
        };

        RevisionRecord {
            revision_id: self.revision_id,
            parent_id: self.parent_id,
            timestamp: self.timestamp,
            contributor,
            comment: self.comment.clone(),
            is_minor: self.is_minor,
            byte_size: self.text_bytes,
            content_hash: self.text_sha1,
        }
    }
}

/// Lazily project a page into one row per revision, in source order.
pub fn flatten_page(page: &PageRecord) -> impl ExactSizeIterator<Item = FlatRevisionRow> + '_ {
    page.revisions
        .iter()
        .map(move |revision| FlatRevisionRow::new(page, revision))
}

/// Flatten `page` into `rows`, consuming it.
pub fn flatten_into(page: PageRecord, rows: &mut Vec<FlatRevisionRow>) {
    rows.reserve(page.revisions.len());
    rows.extend(flatten_page(&page));
}

/// All rows of one page, in the order they were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRows {
    pub page_id: u64,
    pub rows: Vec<FlatRevisionRow>,
}

impl PageRows {
    pub fn title(&self) -> Option<&str> {
        self.rows.first().map(|row| row.page_title.as_str())
    }

    pub fn revisions(&self) -> impl Iterator<Item = RevisionRecord> + '_ {
        self.rows.iter().map(FlatRevisionRow::revision)
    }
}

/// Regroup rows by page id. Pages appear in order of their first row, rows keep their relative order.
pub fn group_by_page(rows: impl IntoIterator<Item = FlatRevisionRow>) -> Vec<PageRows> {
    let mut pages: Vec<PageRows> = Vec::new();
    let mut index: FxHashMap<u64, usize> = FxHashMap::default();

    for row in rows {
        let i = *index.entry(row.page_id).or_insert_with(|| {
            pages.push(PageRows {
                page_id: row.page_id,
                rows: Vec::new(),
            });
            pages.len() - 1
        });
        pages[i].rows.push(row);
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::prelude::*;

    #[test]
    fn test_flatten_repeats_page_fields() {
        let mut page = page_with_hashes(7, "Jane Doe", &[Some("a"), None, Some("b")]);
        page.is_redirect = true;
        page.redirect_target = Some("Elsewhere".into());
        page.revisions[1].contributor = Some(Contributor::Anonymous {
            ip: "192.0.2.1".into(),
        });
        page.revisions[2].contributor = None;

        let rows: Vec<_> = flatten_page(&page).collect();
        assert_eq!(rows.len(), 3);
        for (row, revision) in rows.iter().zip(&page.revisions) {
            assert_eq!(row.page_id, 7);
            assert_eq!(row.page_title, "Jane Doe");
            assert!(row.is_redirect);
            assert_eq!(row.redirect_target.as_deref(), Some("Elsewhere"));
            assert_eq!(row.revision_id, revision.revision_id);
        }

        assert_eq!(rows[0].contributor_username.as_deref(), Some("Dummy"));
        assert_eq!(rows[0].contributor_id, Some(1));
        assert_eq!(rows[0].contributor_ip, None);
        assert_eq!(rows[1].contributor_username, None);
        assert_eq!(rows[1].contributor_ip.as_deref(), Some("192.0.2.1"));
        assert_eq!(rows[2].contributor_username, None);
        assert_eq!(rows[2].contributor_ip, None);
        assert_eq!(rows[1].text_sha1, None);
        assert_eq!(rows[0].parent_id, None);
    }

    #[test]
    fn test_flatten_into_and_empty_page() {
        let mut rows = Vec::new();
        flatten_into(page_with_hashes(1, "A", &[Some("a"), Some("b")]), &mut rows);
        flatten_into(page_with_hashes(2, "B", &[]), &mut rows);
        assert_eq!(rows.len(), 2);

        let pages = group_by_page(rows);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title(), Some("A"));
    }

    #[test]
    fn test_group_by_page_keeps_interleaved_order() {
        let a = rows_with_hashes(&[Some("a"), Some("b"), Some("c")]);
        let b: Vec<_> = flatten_page(&page_with_hashes(2, "B", &[Some("x"), Some("y")])).collect();
        let interleaved = vec![
            a[0].clone(),
            b[0].clone(),
            a[1].clone(),
            b[1].clone(),
            a[2].clone(),
        ];

        let pages = group_by_page(interleaved);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_id, 1);
        assert_eq!(pages[0].rows, a);
        assert_eq!(pages[1].page_id, 2);
        assert_eq!(pages[1].rows, b);
    }

    proptest! {
        #[test]
        fn flatten_then_regroup_reconstructs_pages(pages in proptest::collection::vec(arb_page(), 0..6)) {
            // page ids are unique within a corpus snapshot
            let pages: Vec<_> = pages
                .into_iter()
                .enumerate()
                .map(|(i, mut page)| {
                    page.page_id = i as u64 + 1;
                    page
                })
                .collect();

            let rows: Vec<_> = pages.iter().flat_map(flatten_page).collect();
            let regrouped = group_by_page(rows);
            let non_empty: Vec<_> = pages.iter().filter(|page| !page.revisions.is_empty()).collect();

            prop_assert_eq!(regrouped.len(), non_empty.len());
            for (group, page) in regrouped.iter().zip(non_empty) {
                prop_assert_eq!(group.page_id, page.page_id);
                prop_assert_eq!(group.title(), Some(page.title.as_str()));
                prop_assert_eq!(group.revisions().collect::<Vec<_>>(), page.revisions.clone());
                for row in &group.rows {
                    prop_assert_eq!(row.is_redirect, page.is_redirect);
                    prop_assert_eq!(&row.redirect_target, &page.redirect_target);
                }
            }
        }
    }
}
