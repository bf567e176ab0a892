//! Content-hash revert detection.
//!
//! A revision whose content hash reappears after at least one intervening revision is a *restoration*:
//! everything strictly between the previous occurrence of that hash and the restoring revision is
//! classified as vandalism, however many distinct hashes those revisions carried. Only the most recent
//! prior occurrence of a hash is considered, so a page returning to a state it had long ago is matched
//! against the latest time it had that state.
//!
//! Edit-summary keywords never open an interval; they are only recorded as corroboration.

use std::ops::AddAssign;

use chrono::{DateTime, TimeDelta, Utc};
use compact_str::CompactString;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    flatten::{group_by_page, FlatRevisionRow},
    subjects::{SubjectList, DEFAULT_CATEGORY},
    utils::{self, RevisionHash},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMethod {
    #[serde(rename = "sha1_revert")]
    HashRevert,
    /// The restoring revision's edit summary also mentions reverting or vandalism.
    #[serde(rename = "both")]
    HashRevertAndKeyword,
}

/// A run of revisions between a departure from a content state and the return to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DamageInterval {
    pub page_id: u64,
    /// Last revision with the restored content before the damage.
    pub start_revision_id: u64,
    /// The restoration.
    pub end_revision_id: u64,
    /// Revisions strictly between start and end, oldest first.
    pub vandal_revision_ids: Vec<u64>,
    /// Time from the first vandal revision to the restoration.
    pub duration: TimeDelta,
    pub corroborated: bool,
}

impl DamageInterval {
    pub fn detection_method(&self) -> DetectionMethod {
        if self.corroborated {
            DetectionMethod::HashRevertAndKeyword
        } else {
            DetectionMethod::HashRevert
        }
    }
}

/// Oddities seen while classifying. Counted, never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationAnomalies {
    /// Revisions older than their predecessor in source order.
    pub non_monotonic_timestamps: usize,
    /// Parent ids that do not reference an earlier revision of the same page.
    pub unknown_parents: usize,
    pub missing_hashes: usize,
}

impl AddAssign for ClassificationAnomalies {
    fn add_assign(&mut self, rhs: Self) {
        self.non_monotonic_timestamps += rhs.non_monotonic_timestamps;
        self.unknown_parents += rhs.unknown_parents;
        self.missing_hashes += rhs.missing_hashes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageClassification {
    pub page_id: u64,
    /// Ordered by restoration.
    pub intervals: Vec<DamageInterval>,
    pub anomalies: ClassificationAnomalies,
}

fn count_anomalies(rows: &[FlatRevisionRow]) -> ClassificationAnomalies {
    let mut anomalies = ClassificationAnomalies::default();
    let mut seen = FxHashSet::default();
    let mut previous_timestamp: Option<DateTime<Utc>> = None;

    for row in rows {
        if previous_timestamp.is_some_and(|previous| row.timestamp < previous) {
            anomalies.non_monotonic_timestamps += 1;
        }
        previous_timestamp = Some(row.timestamp);

        if let Some(parent_id) = row.parent_id {
            if !seen.contains(&parent_id) {
                anomalies.unknown_parents += 1;
            }
        }
        seen.insert(row.revision_id);

        if row.text_sha1.is_none() {
            anomalies.missing_hashes += 1;
        }
    }

    anomalies
}

/// Detect damage intervals in the revisions of a single page.
///
/// `rows` may be in any order; they are classified in (timestamp, revision id) order.
pub fn classify_page(rows: &[FlatRevisionRow]) -> PageClassification {
    let page_id = rows.first().map_or(0, |row| row.page_id);
    debug_assert!(rows.iter().all(|row| row.page_id == page_id));

    let anomalies = count_anomalies(rows);
    if anomalies.non_monotonic_timestamps > 0 || anomalies.unknown_parents > 0 {
        tracing::debug!(
            page_id,
            non_monotonic_timestamps = anomalies.non_monotonic_timestamps,
            unknown_parents = anomalies.unknown_parents,
            "revision order anomalies"
        );
    }

    let mut ordered: Vec<&FlatRevisionRow> = rows.iter().collect();
    ordered.sort_by_key(|row| (row.timestamp, row.revision_id));

    // hash -> index into `ordered` of its latest occurrence
    let mut latest: FxHashMap<RevisionHash, usize> = FxHashMap::default();
    let mut intervals = Vec::new();

    for (i, row) in ordered.iter().enumerate() {
        let Some(hash) = row.text_sha1 else {
            continue;
        };

        if let Some(previous) = latest.insert(hash, i) {
            // adjacent duplicates (null edits) neither open nor close anything
            if previous + 1 == i {
                continue;
            }

            let vandals = &ordered[previous + 1..i];
            intervals.push(DamageInterval {
                page_id,
                start_revision_id: ordered[previous].revision_id,
                end_revision_id: row.revision_id,
                vandal_revision_ids: vandals.iter().map(|vandal| vandal.revision_id).collect(),
                duration: row.timestamp - vandals[0].timestamp,
                corroborated: utils::has_revert_keyword(row.comment.as_deref()),
            });
        }
    }

    PageClassification {
        page_id,
        intervals,
        anomalies,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Vandalism,
    Restoration,
}

/// One output row per vandal revision and per restoration: the revision's own fields followed by its role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VandalismEvent {
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
    pub event_type: EventType,
    pub vandalism_group_id: u64,
    /// Only set on restorations.
    pub restored_to_revision_id: Option<u64>,
    /// Only set on vandalism: seconds until this revision was undone.
    pub restoration_time_seconds: Option<f64>,
    pub detection_method: DetectionMethod,
    pub party_group: CompactString,
}

impl VandalismEvent {
    fn new(
        row: &FlatRevisionRow,
        event_type: EventType,
        interval: &DamageInterval,
        vandalism_group_id: u64,
        party_group: &str,
    ) -> Self {
        let row = row.clone();
        Self {
            page_id: row.page_id,
            page_title: row.page_title,
            is_redirect: row.is_redirect,
            redirect_target: row.redirect_target,
            revision_id: row.revision_id,
            parent_id: row.parent_id,
            timestamp: row.timestamp,
            contributor_username: row.contributor_username,
            contributor_id: row.contributor_id,
            contributor_ip: row.contributor_ip,
            comment: row.comment,
            is_minor: row.is_minor,
            text_bytes: row.text_bytes,
            text_sha1: row.text_sha1,
            event_type,
            vandalism_group_id,
            restored_to_revision_id: None,
            restoration_time_seconds: None,
            detection_method: interval.detection_method(),
            party_group: CompactString::from(party_group),
        }
    }
}

fn seconds(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

/// Expand the intervals of one page into event rows, numbering groups from `first_group_id`.
pub fn vandalism_events(
    rows: &[FlatRevisionRow],
    classification: &PageClassification,
    first_group_id: u64,
    party_group: &str,
) -> Vec<VandalismEvent> {
    let by_id: FxHashMap<u64, &FlatRevisionRow> =
        rows.iter().map(|row| (row.revision_id, row)).collect();
    let mut events = Vec::new();

    for (group_id, interval) in (first_group_id..).zip(&classification.intervals) {
        let Some(restoration) = by_id.get(&interval.end_revision_id) else {
            continue;
        };

        for vandal_id in &interval.vandal_revision_ids {
            if let Some(vandal) = by_id.get(vandal_id) {
                let mut event =
                    VandalismEvent::new(vandal, EventType::Vandalism, interval, group_id, party_group);
                event.restoration_time_seconds =
                    Some(seconds(restoration.timestamp - vandal.timestamp));
                events.push(event);
            }
        }

        let mut event = VandalismEvent::new(
            restoration,
            EventType::Restoration,
            interval,
            group_id,
            party_group,
        );
        event.restored_to_revision_id = Some(interval.start_revision_id);
        events.push(event);
    }

    events
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub pages: usize,
    pub revisions: usize,
    pub pages_with_vandalism: usize,
    pub intervals: usize,
    pub vandal_revisions: usize,
    pub corroborated_intervals: usize,
    pub anomalies: ClassificationAnomalies,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusClassification {
    pub events: Vec<VandalismEvent>,
    pub summary: ClassificationSummary,
}

/// Classify every page of a row set in parallel.
///
/// Group ids are assigned in page id order, so the result does not depend on row order or thread scheduling.
pub fn classify_corpus(
    rows: impl IntoIterator<Item = FlatRevisionRow>,
    subjects: &SubjectList,
) -> CorpusClassification {
    let mut pages = group_by_page(rows);
    pages.sort_unstable_by_key(|page| page.page_id);

    let classified: Vec<PageClassification> = pages
        .par_iter()
        .map(|page| classify_page(&page.rows))
        .collect();

    let mut summary = ClassificationSummary::default();
    let mut events = Vec::new();
    let mut next_group_id = 0u64;

    for (page, classification) in pages.iter().zip(&classified) {
        summary.pages += 1;
        summary.revisions += page.rows.len();
        summary.anomalies += classification.anomalies;
        if classification.intervals.is_empty() {
            continue;
        }

        summary.pages_with_vandalism += 1;
        summary.intervals += classification.intervals.len();
        for interval in &classification.intervals {
            summary.vandal_revisions += interval.vandal_revision_ids.len();
            summary.corroborated_intervals += usize::from(interval.corroborated);
        }

        let party_group = page
            .title()
            .and_then(|title| subjects.category(title))
            .unwrap_or(DEFAULT_CATEGORY);
        events.extend(vandalism_events(
            &page.rows,
            classification,
            next_group_id,
            party_group,
        ));
        next_group_id += classification.intervals.len() as u64;
    }

    CorpusClassification { events, summary }
}
