use std::{any::type_name_of_val, collections::HashMap, fmt::Debug, io::BufRead};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};

use crate::{
    subjects::{AcceptAll, Admission, PageFilter},
    tags::{local_name, Field},
    utils::{self, RevisionHash},
};

// we normally don't retrieve the value of the tags, so this is the most efficient backend
type TagStringInterner = string_interner::StringInterner<string_interner::backend::BucketBackend>;

/// Initial capacity of the event buffer.
pub const PARSER_BUFFER_CAPACITY: usize = 1024 * 1024;
/// The event buffer is shrunk back to [`PARSER_BUFFER_CAPACITY`] at page boundaries once a single
/// oversized element made it grow beyond this.
const PARSER_BUFFER_LIMIT: usize = 16 * PARSER_BUFFER_CAPACITY;

// one entry of the open-element stack
#[derive(Debug, PartialEq, Eq)]
enum Tag {
    MediaWiki,
    SiteInfo,
    DbName,
    Namespaces,
    Namespace(Option<i32>), // <namespace key="1">Talk</namespace>
    Page,
    Title,
    Ns,
    Id,
    Redirect(Option<CompactString>), // <redirect title="Target" />
    Revision,
    ParentId,
    Timestamp,
    Contributor,
    Username,
    Ip,
    Comment,
    Minor,
    // Text's sha1 attribute seems to be preferred over the sha1 tag (https://github.com/mediawiki-utilities/python-mwxml/blob/2b477be6aa9794064d03b5be38c7759d1570488b/mwxml/iteration/revision.py#L83-L96)
    Text(TextAttributes), // <text bytes="20" sha1="3h3w..." /> or <text bytes="20" sha1="3h3w..." deleted="deleted" />
    // Sha1 hash is base36 encoded (0-padded to 31 characters)
    Sha1,
    Unknown(string_interner::DefaultSymbol), // any other tag
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TextAttributes {
    bytes: Option<u64>,
    sha1: Option<Sha1Hash>,
    deleted: bool,
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

impl Tag {
    fn from_start_bytes(
        e: &BytesStart,
        tag_interner: &mut TagStringInterner,
    ) -> Result<Self, quick_xml::Error> {
        let qname = e.name();
        let Some(field) = Field::resolve(qname.as_ref()) else {
            let name = String::from_utf8_lossy(local_name(qname.as_ref()));
            return Ok(Tag::Unknown(tag_interner.get_or_intern(name.as_ref())));
        };

        Ok(match field {
            Field::MediaWiki => Tag::MediaWiki,
            Field::SiteInfo => Tag::SiteInfo,
            Field::DbName => Tag::DbName,
            Field::Namespaces => Tag::Namespaces,
            Field::Namespace => {
                Tag::Namespace(attribute(e, b"key")?.and_then(|key| key.trim().parse().ok()))
            }
            Field::Page => Tag::Page,
            Field::Title => Tag::Title,
            Field::Ns => Tag::Ns,
            Field::Id => Tag::Id,
            Field::Redirect => Tag::Redirect(
                attribute(e, b"title")?
                    .as_deref()
                    .and_then(utils::non_empty)
                    .map(CompactString::from),
            ),
            Field::Revision => Tag::Revision,
            Field::ParentId => Tag::ParentId,
            Field::Timestamp => Tag::Timestamp,
            Field::Contributor => Tag::Contributor,
            Field::Username => Tag::Username,
            Field::Ip => Tag::Ip,
            Field::Comment => Tag::Comment,
            Field::Minor => Tag::Minor,
            Field::Text => {
                let mut attributes = TextAttributes::default();

                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    match local_name(attr.key.as_ref()) {
                        b"bytes" => {
                            attributes.bytes = attr.unescape_value()?.trim().parse().ok();
                        }
                        b"sha1" => {
                            attributes.sha1 = Sha1Hash::parse(attr.unescape_value()?.as_bytes());
                        }
                        b"deleted" => {
                            attributes.deleted = true;
                        }
                        _ => {}
                    }
                }

                Tag::Text(attributes)
            }
            Field::Sha1 => Tag::Sha1,
        })
    }

    fn field(&self) -> Option<Field> {
        Some(match self {
            Tag::MediaWiki => Field::MediaWiki,
            Tag::SiteInfo => Field::SiteInfo,
            Tag::DbName => Field::DbName,
            Tag::Namespaces => Field::Namespaces,
            Tag::Namespace(_) => Field::Namespace,
            Tag::Page => Field::Page,
            Tag::Title => Field::Title,
            Tag::Ns => Field::Ns,
            Tag::Id => Field::Id,
            Tag::Redirect(_) => Field::Redirect,
            Tag::Revision => Field::Revision,
            Tag::ParentId => Field::ParentId,
            Tag::Timestamp => Field::Timestamp,
            Tag::Contributor => Field::Contributor,
            Tag::Username => Field::Username,
            Tag::Ip => Field::Ip,
            Tag::Comment => Field::Comment,
            Tag::Minor => Field::Minor,
            Tag::Text(_) => Field::Text,
            Tag::Sha1 => Field::Sha1,
            Tag::Unknown(_) => return None,
        })
    }

    fn name<'a>(&self, tag_interner: &'a TagStringInterner) -> &'a str {
        match (self, self.field()) {
            (_, Some(field)) => field.name(),
            (Tag::Unknown(symbol), None) => tag_interner.resolve(*symbol).unwrap_or("?"),
            _ => "?",
        }
    }

    fn matches_end_name(&self, name: &[u8], tag_interner: &TagStringInterner) -> bool {
        match (self, Field::resolve(name)) {
            (Tag::Unknown(expected), None) => {
                let name = String::from_utf8_lossy(local_name(name));
                tag_interner.get(name.as_ref()) == Some(*expected)
            }
            (tag, Some(field)) => tag.field() == Some(field),
            _ => false,
        }
    }
}

/// Digest of a revision's text as published in the dump: SHA1, base36 encoded and 0-padded to 31 characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha1Hash(pub(crate) [u8; 31]);

impl Sha1Hash {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.trim_ascii();
        if bytes.len() != 31 || !bytes.iter().all(u8::is_ascii_alphanumeric) {
            return None;
        }
        let mut sha1 = [0; 31];
        sha1.copy_from_slice(bytes);
        Some(Sha1Hash(sha1))
    }

    pub fn as_str(&self) -> &str {
        // only ever constructed from ASCII
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl Debug for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sha1Hash").field(&self.as_str()).finish()
    }
}

/// Who made an edit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Contributor {
    Registered {
        username: CompactString,
        user_id: Option<u64>,
    },
    Anonymous {
        ip: CompactString,
    },
}

impl Contributor {
    pub fn username(&self) -> Option<&str> {
        match self {
            Contributor::Registered { username, .. } => Some(username),
            Contributor::Anonymous { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<u64> {
        match self {
            Contributor::Registered { user_id, .. } => *user_id,
            Contributor::Anonymous { .. } => None,
        }
    }

    pub fn ip(&self) -> Option<&str> {
        match self {
            Contributor::Registered { .. } => None,
            Contributor::Anonymous { ip } => Some(ip),
        }
    }
}

/// One edit of a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionRecord {
    pub revision_id: u64,
    /// Absent for the first revision of a page.
    pub parent_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    /// Absent if the contributor was suppressed.
    pub contributor: Option<Contributor>,
    pub comment: Option<CompactString>,
    pub is_minor: bool,
    /// Size of the article after this edit.
    pub byte_size: Option<u64>,
    pub content_hash: Option<RevisionHash>,
}

#[derive(Debug, Default)]
struct RevisionBuilder {
    id: Option<u64>,
    parent_id: Option<u64>,
    timestamp: Option<DateTime<Utc>>,
    username: Option<CompactString>,
    user_id: Option<u64>,
    ip: Option<CompactString>,
    comment: Option<CompactString>,
    minor: bool,
    text: TextAttributes,
    sha1: Option<Sha1Hash>,
    // inline text is hashed while it streams past and never kept
    text_len: u64,
    text_hasher: Option<Box<blake3::Hasher>>,
}

#[derive(Debug, thiserror::Error)]
#[error("missing mandatory field: {0}")]
struct BuildRevisionError(&'static str, Box<RevisionBuilder>);

impl RevisionBuilder {
    fn update_text(&mut self, chunk: &[u8]) {
        self.text_len += chunk.len() as u64;
        self.text_hasher
            .get_or_insert_with(Default::default)
            .update(chunk);
    }

    fn try_build(self) -> Result<RevisionRecord, BuildRevisionError> {
        let Some(revision_id) = self.id else {
            return Err(BuildRevisionError("id", self.into()));
        };
        let Some(timestamp) = self.timestamp else {
            return Err(BuildRevisionError("timestamp", self.into()));
        };

        let contributor = match (self.username, self.ip) {
            (Some(username), _) => Some(Contributor::Registered {
                username,
                user_id: self.user_id,
            }),
            (None, Some(ip)) => Some(Contributor::Anonymous { ip }),
            (None, None) => None,
        };

        let inline_len = self.text_hasher.as_ref().map(|_| self.text_len);
        let content_hash = match (self.text.sha1.or(self.sha1), self.text_hasher) {
            (Some(sha1), _) => Some(RevisionHash::Sha1(sha1)),
            (None, Some(hasher)) => Some(RevisionHash::Blake3(hasher.finalize())),
            (None, None) => None,
        };

        Ok(RevisionRecord {
            revision_id,
            parent_id: self.parent_id,
            timestamp,
            contributor,
            comment: self.comment,
            is_minor: self.minor,
            byte_size: self.text.bytes.or(inline_len),
            content_hash,
        })
    }
}

/// One page with its full revision history, oldest first in source order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRecord {
    pub page_id: u64,
    pub title: CompactString,
    pub namespace_key: i32,
    pub is_redirect: bool,
    /// Target title of a redirect, absent when the dump does not name one.
    pub redirect_target: Option<CompactString>,
    pub revisions: Vec<RevisionRecord>,
}

impl PageRecord {
    fn empty() -> Self {
        Self {
            page_id: 0,
            title: CompactString::default(),
            namespace_key: 0,
            is_redirect: false,
            redirect_target: None,
            revisions: Vec::new(),
        }
    }
}

/// Outcome of parsing one `<page>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPage {
    /// The page passed the filter and was fully materialized.
    Retained {
        page: PageRecord,
        category: Option<CompactString>,
    },
    /// The page was rejected by the filter; its revisions were skipped over without being built.
    Discarded {
        page_id: u64,
        title: CompactString,
        revisions_skipped: usize,
    },
}

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Default,
    Named(CompactString),
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Default => write!(f, "Default"),
            Namespace::Named(name) => write!(f, "{:?}", name),
        }
    }
}

#[derive(Debug, Default)]
pub struct SiteInfo {
    pub dbname: CompactString,
    pub namespaces: HashMap<i32, Namespace>,
}

/// Malformed input. Fatal to the stream it occurred in.
#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    /// Syntax error reported by the XML reader, including I/O errors of the underlying decompressor.
    #[error("malformed XML at byte {offset}")]
    Xml {
        offset: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("mismatched closing tag at byte {offset}: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        offset: u64,
        expected: String,
        found: String,
    },
    /// The stream ended inside an element. `offset` points at the start of the innermost unterminated one.
    #[error("unexpected end of input, unterminated element at byte {offset} (open: {open_elements})")]
    UnexpectedEof { offset: u64, open_elements: String },
}

impl StructuralError {
    /// Position in the decompressed stream the error refers to.
    pub fn offset(&self) -> u64 {
        match self {
            StructuralError::Xml { offset, .. }
            | StructuralError::MismatchedTag { offset, .. }
            | StructuralError::UnexpectedEof { offset, .. } => *offset,
        }
    }
}

// everything collected for the page currently being parsed
struct PageState {
    page: PageRecord,
    admission: Option<Admission>,
    revision_builder: Option<RevisionBuilder>,
    revisions_skipped: usize,
    span: tracing::Span,
}

impl PageState {
    fn new() -> Self {
        Self {
            page: PageRecord::empty(),
            admission: None,
            revision_builder: None,
            revisions_skipped: 0,
            span: tracing::debug_span!("parse_page", title = tracing::field::Empty),
        }
    }

    fn discarding(&self) -> bool {
        matches!(self.admission, Some(Admission::Discard))
    }
}

/// Streaming parser for MediaWiki XML dumps.
///
/// Holds at most one page in memory: the one currently being built. Everything about a page is handed
/// to the caller (or dropped, if the filter rejects it) when its closing tag is read.
pub struct DumpParser<R: BufRead> {
    tag_interner: TagStringInterner,
    xml_parser: quick_xml::Reader<R>,
    buf: Vec<u8>,
    current_path: Vec<Tag>,
    // start offsets of the elements in `current_path`
    open_offsets: Vec<u64>,
    site_info: SiteInfo,
    malformed_revisions: u64,
    finished: bool,
}

impl<R: BufRead> Debug for DumpParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpParser")
            .field("tag_interner", &type_name_of_val(&self.tag_interner))
            .field("xml_parser", &type_name_of_val(&self.xml_parser))
            // print buffer length and capacity
            .field("buf.len", &self.buf.len())
            .field("buf.capacity", &self.buf.capacity())
            .field("current_path", &self.current_path)
            .field("site_info", &self.site_info)
            .field("malformed_revisions", &self.malformed_revisions)
            .finish()
    }
}

impl<R: BufRead> DumpParser<R> {
    pub fn new(reader: R) -> Self {
        // expand_empty_elements not set, take care to handle empty elements!
        let xml_parser = quick_xml::Reader::from_reader(reader);

        Self {
            tag_interner: TagStringInterner::new(),
            xml_parser,
            buf: Vec::with_capacity(PARSER_BUFFER_CAPACITY),
            current_path: Vec::new(),
            open_offsets: Vec::new(),
            site_info: SiteInfo::default(),
            malformed_revisions: 0,
            finished: false,
        }
    }

    /// Site metadata seen so far. Complete once the first page has been returned.
    pub fn site_info(&self) -> &SiteInfo {
        &self.site_info
    }

    /// Number of revisions dropped so far because a mandatory field (id, timestamp) was missing.
    pub fn malformed_revisions(&self) -> u64 {
        self.malformed_revisions
    }

    /// Number of decompressed bytes consumed so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.xml_parser.buffer_position() as u64
    }

    /// Parse the next page, materializing it regardless of its title.
    pub fn parse_page(&mut self) -> Result<Option<PageRecord>, StructuralError> {
        loop {
            match self.next_page(&AcceptAll)? {
                Some(ParsedPage::Retained { page, .. }) => return Ok(Some(page)),
                Some(ParsedPage::Discarded { .. }) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Parse the next page, consulting `filter` as soon as the title is known.
    ///
    /// Returns `Ok(None)` at the end of the document. After an error or the end of the document all further
    /// calls return `Ok(None)`.
    pub fn next_page<F: PageFilter + ?Sized>(
        &mut self,
        filter: &F,
    ) -> Result<Option<ParsedPage>, StructuralError> {
        if self.finished {
            return Ok(None);
        }

        let result = self.read_page(filter);
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }

        if self.buf.capacity() > PARSER_BUFFER_LIMIT {
            self.buf = Vec::with_capacity(PARSER_BUFFER_CAPACITY);
        }
        result
    }

    fn read_page<F: PageFilter + ?Sized>(
        &mut self,
        filter: &F,
    ) -> Result<Option<ParsedPage>, StructuralError> {
        let mut state = PageState::new();

        loop {
            self.buf.clear();
            let event_start = self.bytes_consumed();

            let event = match self.xml_parser.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(source) => {
                    tracing::error!(message = "XML error", error = %source, position = event_start, current_path = ?self.current_path);
                    return Err(StructuralError::Xml {
                        offset: event_start,
                        source,
                    });
                }
            };

            match event {
                Event::Start(ref e) => {
                    let tag = Tag::from_start_bytes(e, &mut self.tag_interner).map_err(
                        |source| StructuralError::Xml {
                            offset: event_start,
                            source,
                        },
                    )?;
                    self.open_element(tag, event_start, &mut state, filter);
                }
                Event::Empty(ref e) => {
                    let tag = Tag::from_start_bytes(e, &mut self.tag_interner).map_err(
                        |source| StructuralError::Xml {
                            offset: event_start,
                            source,
                        },
                    )?;
                    self.open_element(tag, event_start, &mut state, filter);

                    let tag = self.current_path.pop();
                    self.open_offsets.pop();
                    if let Some(page) = self.close_element(tag, event_start, &mut state, filter)
                    {
                        return Ok(Some(page));
                    }
                }
                Event::Text(ref e) => {
                    let text = e.unescape().map_err(|source| StructuralError::Xml {
                        offset: event_start,
                        source,
                    })?;

                    // unfortunately have to pass all these as arguments, because otherwise we get problems with the borrow checker
                    Self::apply_text(
                        &self.current_path,
                        &mut self.site_info,
                        &mut state,
                        filter,
                        &text,
                        event_start,
                    );
                }
                Event::CData(ref e) => {
                    if let (Some(Tag::Text(_)), Some(builder)) =
                        (self.current_path.last(), &mut state.revision_builder)
                    {
                        builder.update_text(e.as_ref());
                    }
                }
                Event::End(ref e) => {
                    let tag = Self::check_end_tag(
                        e.name().as_ref(),
                        event_start,
                        &mut self.current_path,
                        &mut self.open_offsets,
                        &self.tag_interner,
                    )?;

                    if let Some(page) = self.close_element(Some(tag), event_start, &mut state, filter)
                    {
                        return Ok(Some(page));
                    }
                }
                Event::Eof => {
                    if let Some(&offset) = self.open_offsets.last() {
                        let open_elements = self
                            .current_path
                            .iter()
                            .map(|tag| tag.name(&self.tag_interner))
                            .collect::<Vec<_>>()
                            .join("/");
                        tracing::error!(message = "Unexpected end of input", offset, open_elements, partial_page = ?state.page);
                        return Err(StructuralError::UnexpectedEof {
                            offset,
                            open_elements,
                        });
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    fn open_element<F: PageFilter + ?Sized>(
        &mut self,
        tag: Tag,
        offset: u64,
        state: &mut PageState,
        filter: &F,
    ) {
        self.current_path.push(tag);
        self.open_offsets.push(offset);

        use Tag::*;

        match self.current_path.as_slice() {
            [MediaWiki, Page, Redirect(target)] => {
                if target.is_none() {
                    tracing::warn!(
                        message = "Redirect without target title",
                        title = state.page.title.as_str(),
                        position = offset
                    );
                }
                state.page.is_redirect = true;
                state.page.redirect_target = target.clone();
            }
            [MediaWiki, Page, Revision] => {
                if state.admission.is_none() && !state.page.title.is_empty() {
                    state.admission = Some(filter.admit(&state.page.title));
                }
                if state.discarding() {
                    state.revisions_skipped += 1;
                } else {
                    state.revision_builder = Some(RevisionBuilder::default());
                }
            }
            [MediaWiki, Page, Revision, Text(attributes)] => {
                if let Some(revision_builder) = &mut state.revision_builder {
                    revision_builder.text = *attributes;
                }
            }
            [MediaWiki, Page, Revision, Minor] => {
                // minor tag is always empty
                if let Some(revision_builder) = &mut state.revision_builder {
                    revision_builder.minor = true;
                }
            }
            _ => {}
        }
    }

    // returns the finished page when `tag` closed a page
    fn close_element<F: PageFilter + ?Sized>(
        &mut self,
        tag: Option<Tag>,
        offset: u64,
        state: &mut PageState,
        filter: &F,
    ) -> Option<ParsedPage> {
        use Tag::*;

        match (self.current_path.as_slice(), tag) {
            ([MediaWiki, SiteInfo, Namespaces], Some(Namespace(Some(key)))) => {
                // <namespace key="0" /> has no name
                self.site_info.namespaces.entry(key).or_default();
                None
            }
            ([MediaWiki], Some(SiteInfo)) => {
                tracing::debug!(site_info = ?self.site_info, "parsed site info");
                None
            }
            ([MediaWiki, Page], Some(Revision)) => {
                let revision_builder = state.revision_builder.take()?;
                match revision_builder.try_build() {
                    Ok(revision) => state.page.revisions.push(revision),
                    Err(BuildRevisionError(field, revision_builder)) => {
                        self.malformed_revisions += 1;
                        tracing::warn!(
                            message = "Ignoring revision with missing mandatory field",
                            field,
                            partial_revision = ?revision_builder,
                            revision_end_position = offset
                        );
                    }
                }
                None
            }
            ([MediaWiki], Some(Page)) => {
                let state = std::mem::replace(state, PageState::new());
                let mut page = state.page;
                if page.page_id == 0 {
                    tracing::warn!(
                        message = "Page without id",
                        title = page.title.as_str(),
                        page_end_position = offset
                    );
                }

                let admission = match state.admission {
                    Some(admission) => admission,
                    None => filter.admit(&page.title),
                };

                Some(match admission {
                    Admission::Retain { category } => ParsedPage::Retained { page, category },
                    Admission::Discard => ParsedPage::Discarded {
                        page_id: page.page_id,
                        title: std::mem::take(&mut page.title),
                        revisions_skipped: state.revisions_skipped + page.revisions.len(),
                    },
                })
            }
            _ => None,
        }
    }

    fn apply_text<F: PageFilter + ?Sized>(
        current_path: &[Tag],
        site_info: &mut SiteInfo,
        state: &mut PageState,
        filter: &F,
        text: &str,
        position: u64,
    ) {
        use Tag::*;

        // inline revision text is hashed verbatim, everything else is a trimmed scalar
        if let [MediaWiki, Page, Revision, Text(_)] = current_path {
            if let Some(revision_builder) = &mut state.revision_builder {
                revision_builder.update_text(text.as_bytes());
            }
            return;
        }

        let Some(value) = utils::non_empty(text) else {
            return;
        };

        match current_path {
            [MediaWiki, SiteInfo, DbName] => {
                site_info.dbname = CompactString::from(value);
            }
            [MediaWiki, SiteInfo, Namespaces, Namespace(key)] => match key {
                Some(key) => {
                    site_info
                        .namespaces
                        .insert(*key, self::Namespace::Named(CompactString::from(value)));
                }
                None => {
                    tracing::warn!(
                        message = "Ignoring namespace with invalid key",
                        name = value,
                        position
                    );
                }
            },
            // Page tags
            [MediaWiki, Page, Title] => {
                state.page.title = CompactString::from(value);
                state.span.record("title", value);
                state.admission = Some(filter.admit(value));
            }
            [MediaWiki, Page, Ns] => {
                state.page.namespace_key = value.parse().unwrap_or_else(|_| {
                    tracing::warn!(
                        message = "Found invalid namespace key, defaulting to 0",
                        ns = value,
                        position
                    );
                    0
                });
            }
            [MediaWiki, Page, Id] => match value.parse() {
                Ok(id) => state.page.page_id = id,
                Err(_) => {
                    tracing::warn!(message = "Found invalid page id", id = value, position);
                }
            },
            // Revision tags
            [MediaWiki, Page, Revision, field @ ..] => {
                let Some(revision_builder) = &mut state.revision_builder else {
                    return;
                };

                let _entered = state.span.enter();
                match field {
                    [Id] => {
                        revision_builder.id = parse_or_warn(value, "revision id", position);
                    }
                    [ParentId] => {
                        revision_builder.parent_id = parse_or_warn(value, "parent id", position);
                    }
                    [Timestamp] => {
                        revision_builder.timestamp = utils::parse_timestamp(value);
                        if revision_builder.timestamp.is_none() {
                            tracing::warn!(
                                message = "Found invalid revision timestamp",
                                timestamp = value,
                                position
                            );
                        }
                    }
                    [Contributor, Username] => {
                        revision_builder.username = Some(CompactString::from(value));
                    }
                    [Contributor, Id] => {
                        revision_builder.user_id = parse_or_warn(value, "contributor id", position);
                    }
                    [Contributor, Ip] => {
                        revision_builder.ip = Some(CompactString::from(value));
                    }
                    [Comment] => {
                        revision_builder.comment = Some(CompactString::from(value));
                    }
                    [Sha1] => {
                        revision_builder.sha1 = Sha1Hash::parse(value.as_bytes());
                        if revision_builder.sha1.is_none() {
                            tracing::warn!(message = "Found invalid sha1 hash", sha1 = value, position);
                        }
                    }
                    [Minor] => {
                        // minor tag should be empty, but just in case it's not handle it here as well
                        revision_builder.minor = true;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn check_end_tag(
        name: &[u8],
        position: u64,
        current_path: &mut Vec<Tag>,
        open_offsets: &mut Vec<u64>,
        tag_interner: &TagStringInterner,
    ) -> Result<Tag, StructuralError> {
        let found = String::from_utf8_lossy(name).into_owned();

        let Some(tag) = current_path.pop() else {
            tracing::error!(message = "Unexpected end tag", tag = found, position);
            return Err(StructuralError::MismatchedTag {
                offset: position,
                expected: String::new(),
                found,
            });
        };
        open_offsets.pop();

        if !tag.matches_end_name(name, tag_interner) {
            let expected = tag.name(tag_interner).to_string();
            tracing::error!(
                message = "Mismatched tags",
                expected,
                actual = found,
                current_path = ?current_path,
                position
            );
            return Err(StructuralError::MismatchedTag {
                offset: position,
                expected,
                found,
            });
        }

        Ok(tag)
    }
}

fn parse_or_warn(value: &str, what: &'static str, position: u64) -> Option<u64> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(message = "Found invalid number", field = what, value, position);
            None
        }
    }
}

impl<R: BufRead> Iterator for DumpParser<R> {
    type Item = Result<PageRecord, StructuralError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parse_page().transpose()
    }
}
