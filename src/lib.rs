// SPDX-License-Identifier: MPL-2.0
//! # wikirevert
//!
//! Bounded-memory extraction of selected pages' revision histories from Wikimedia XML dumps, and detection of
//! vandalism/restoration pairs from content-hash recurrence.
//!
//! ## Overview
//!
//! Full-history dumps of the English Wikipedia are several terabytes of XML once decompressed. `wikirevert`
//! streams through them one page at a time, keeps only the pages named in a subject list and writes one flat
//! row per revision. Classification then runs per page over those rows.
//!
//! **Key Features:**
//!
//! - **Bounded Memory**: At most one page is held in memory at any time, regardless of dump size or of how many
//!   revisions a single page has. Pages that do not pass the subject filter are never materialized.
//! - **Parallel Processing**: Dumps split into several files are processed as independent partitions, and
//!   classification runs per page in parallel.
//! - **Compression Agnostic**: Plain, gzip, multi-stream bzip2 and zstd inputs are detected automatically.
//! - **Resumable**: Each partition reports how many pages are durably written, and can be restarted from there.
//!
//! ## Getting Started
//!
//! ### Extracting Revisions
//!
//! ```no_run
//! use std::path::Path;
//! use wikirevert::{
//!     extract::{extract_partition, ExtractOptions},
//!     sink::CsvRowSink,
//!     source::open_dump,
//!     subjects::SubjectList,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subjects = SubjectList::from_csv_path(Path::new("politician_titles.csv"))?;
//!     let reader = open_dump(Path::new("enwiki-latest-stub-meta-history1.xml.gz"))?;
//!     let mut sink = CsvRowSink::create(Path::new("revisions_1.csv"))?;
//!
//!     let summary = extract_partition("1", reader, &subjects, &mut sink, &ExtractOptions::default())?;
//!     println!("{} of {} pages matched", summary.progress.pages_matched, summary.progress.pages_seen);
//!     Ok(())
//! }
//! ```
//!
//! ### Parsing Pages Directly
//!
//! The parser can also be used on its own. It yields one [`dump_parser::PageRecord`] at a time:
//!
//! ```no_run
//! use std::{fs::File, io::BufReader};
//! use wikirevert::dump_parser::DumpParser;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = BufReader::new(File::open("dewiktionary-20240901-pages-meta-history.xml")?);
//!     let mut parser = DumpParser::new(reader);
//!
//!     while let Some(page) = parser.parse_page()? {
//!         println!("{}: {} revisions", page.title, page.revisions.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Classifying Revisions
//!
//! ```no_run
//! use std::path::Path;
//! use wikirevert::{classifier::classify_corpus, sink::read_rows, subjects::SubjectList};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subjects = SubjectList::from_csv_path(Path::new("politician_parties.csv"))?;
//!     let rows = read_rows(Path::new("revisions_1.csv"))?.collect::<Result<Vec<_>, _>>()?;
//!
//!     let result = classify_corpus(rows, &subjects);
//!     println!("{} damage intervals", result.summary.intervals);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`source`]: Opening and decompressing dump files.
//! - [`tags`]: Namespace-independent element names.
//! - [`dump_parser`]: The streaming page parser.
//! - [`subjects`]: The subject list and the page filter interface.
//! - [`flatten`]: Flat revision rows and regrouping them by page.
//! - [`sink`]: Row destinations.
//! - [`classifier`]: Revert detection over a page's revisions.
//! - [`extract`]: Running partitions end to end.
//!
//! ## Detection Rules
//!
//! A revision whose content hash equals that of an earlier, non-adjacent revision restores that earlier state,
//! and every revision in between is classified as vandalism. See [`classifier`] for details. Edit summaries
//! containing revert keywords are recorded as corroboration only.
//!
//! ## License
//!
//! This project is licensed under the [Mozilla Public License 2.0](https://www.mozilla.org/en-US/MPL/2.0/).

pub mod classifier;
pub mod dump_parser;
pub mod extract;
pub mod flatten;
pub mod sink;
pub mod source;
pub mod subjects;
pub mod tags;
pub mod utils;

#[cfg(test)]
mod test_support;
