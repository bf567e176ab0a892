//! Mapping between namespace-decorated element names and the fields the extractor understands.
//!
//! Dump elements live in the MediaWiki export namespace. Depending on who produced the name it can show
//! up bare (`page`), prefixed (`mw:page`) or in Clark notation (`{http://www.mediawiki.org/xml/export-0.11/}page`).
//! Everything downstream works with [`Field`] so it never has to care which.

/// Namespace of the MediaWiki export schema version 0.11.
pub const EXPORT_NAMESPACE: &str = "http://www.mediawiki.org/xml/export-0.11/";

/// Strip any namespace decoration from an element name.
pub fn local_name(decorated: &[u8]) -> &[u8] {
    if decorated.first() == Some(&b'{') {
        if let Some(end) = memchr::memchr(b'}', decorated) {
            return &decorated[end + 1..];
        }
    }
    match memchr::memrchr(b':', decorated) {
        Some(colon) => &decorated[colon + 1..],
        None => decorated,
    }
}

/// Build the Clark-notation name of `field` in `namespace`.
///
/// Inverse of [`Field::resolve`] for lookups against namespace-decorated sources.
pub fn qualify(field: Field, namespace: &str) -> String {
    if namespace.is_empty() {
        field.name().to_string()
    } else {
        format!("{{{namespace}}}{}", field.name())
    }
}

// list of all elements that are relevant for our use case,
// i.e. the elements of which we need a value and their parent elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    MediaWiki,   // <mediawiki version="0.11" ...> is the root element
    SiteInfo,    // <siteinfo><dbname>...</dbname><namespaces>...</namespaces></siteinfo>
    DbName,      // <dbname>enwiki</dbname>
    Namespaces,  // <namespaces><namespace key="0" /> ...</namespaces>
    Namespace,   // <namespace key="1">Talk</namespace>
    Page,        // <page>...</page>
    Title,       // <title>blah</title>
    Ns,          // <ns>0</ns>
    Id,          // <id>500</id>, page, revision and contributor level
    Redirect,    // <redirect title="Target" />
    Revision,    // <revision>...</revision>
    ParentId,    // <parentid>499</parentid>
    Timestamp,   // <timestamp>2003-12-05T06:41:50Z</timestamp>
    Contributor, // <contributor><username>blah</username><id>500</id></contributor> or <contributor><ip>...</ip></contributor>
    Username,    // <username>blah</username>
    Ip,          // <ip>127.0.0.1</ip>
    Comment,     // <comment>blah</comment>
    Minor,       // <minor />
    Text,        // <text bytes="20" sha1="3h3w..." /> or with inline content
    Sha1,        // <sha1>3h3w...</sha1>
}

impl Field {
    pub const ALL: [Field; 20] = [
        Field::MediaWiki,
        Field::SiteInfo,
        Field::DbName,
        Field::Namespaces,
        Field::Namespace,
        Field::Page,
        Field::Title,
        Field::Ns,
        Field::Id,
        Field::Redirect,
        Field::Revision,
        Field::ParentId,
        Field::Timestamp,
        Field::Contributor,
        Field::Username,
        Field::Ip,
        Field::Comment,
        Field::Minor,
        Field::Text,
        Field::Sha1,
    ];

    /// Canonical bare element name.
    pub fn name(self) -> &'static str {
        match self {
            Field::MediaWiki => "mediawiki",
            Field::SiteInfo => "siteinfo",
            Field::DbName => "dbname",
            Field::Namespaces => "namespaces",
            Field::Namespace => "namespace",
            Field::Page => "page",
            Field::Title => "title",
            Field::Ns => "ns",
            Field::Id => "id",
            Field::Redirect => "redirect",
            Field::Revision => "revision",
            Field::ParentId => "parentid",
            Field::Timestamp => "timestamp",
            Field::Contributor => "contributor",
            Field::Username => "username",
            Field::Ip => "ip",
            Field::Comment => "comment",
            Field::Minor => "minor",
            Field::Text => "text",
            Field::Sha1 => "sha1",
        }
    }

    /// Resolve a possibly decorated element name. Unknown elements resolve to `None` and are to be
    /// treated as unstructured content.
    pub fn resolve(decorated: &[u8]) -> Option<Field> {
        Some(match local_name(decorated) {
            b"mediawiki" => Field::MediaWiki,
            b"siteinfo" => Field::SiteInfo,
            b"dbname" => Field::DbName,
            b"namespaces" => Field::Namespaces,
            b"namespace" => Field::Namespace,
            b"page" => Field::Page,
            b"title" => Field::Title,
            b"ns" => Field::Ns,
            b"id" => Field::Id,
            b"redirect" => Field::Redirect,
            b"revision" => Field::Revision,
            b"parentid" => Field::ParentId,
            b"timestamp" => Field::Timestamp,
            b"contributor" => Field::Contributor,
            b"username" => Field::Username,
            b"ip" => Field::Ip,
            b"comment" => Field::Comment,
            b"minor" => Field::Minor,
            b"text" => Field::Text,
            b"sha1" => Field::Sha1,
            _ => return None,
        })
    }
}
