//! Streaming WXR parser
//!
//! Reads a WordPress eXtended RSS export with `quick-xml` events and yields one
//! [`Record`] each time a record element closes. Only the element being built
//! is held in memory.

use super::record::*;
use crate::types::SourceId;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Channel children that open a record
const RECORD_ELEMENTS: &[&str] = &["wp:author", "wp:category", "wp:tag", "wp:term", "item"];

/// Fields whose text is kept verbatim instead of trimmed
const VERBATIM_FIELDS: &[&str] = &["content:encoded", "excerpt:encoded", "wp:comment_content"];

/// Streaming reader over a content bundle
pub struct BundleParser {
    path: PathBuf,
    reader: Reader<BufReader<File>>,
    header: BundleHeader,
    /// Names of the currently open elements
    stack: Vec<String>,
    /// Records produced together with the last item (its comments)
    pending: VecDeque<Result<Record, ParseError>>,
    finished: bool,
}

/// Element being built from XML events
#[derive(Debug)]
struct Partial {
    element: String,
    /// Stack depth including the record element itself
    depth: usize,
    offset: u64,
    fields: HashMap<String, String>,
    meta: Vec<(String, String)>,
    meta_key: Option<String>,
    terms: Vec<TermRef>,
    /// `(domain, nicename)` of the open `<category>`
    category: Option<(String, String)>,
    comment: Option<PartialComment>,
    comments: Vec<PartialComment>,
    error: Option<ParseErrorKind>,
}

#[derive(Debug)]
struct PartialComment {
    offset: u64,
    fields: HashMap<String, String>,
}

/// Result of parsing up to the next record boundary
enum ParseResult {
    Record(Record),
    Failed(ParseError),
    Eof,
}

impl BundleParser {
    /// Open a WXR file
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let buf_reader = BufReader::with_capacity(256 * 1024, file);
        let mut reader = Reader::from_reader(buf_reader);
        // nesting is checked here so a bad element can be skipped instead of aborting
        reader.config_mut().check_end_names = false;

        Ok(Self {
            path,
            reader,
            header: BundleHeader::default(),
            stack: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Channel information seen so far (complete once the first record is read)
    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    /// Approximate number of bytes consumed
    pub fn byte_position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Lazily yield records in bundle order
    ///
    /// Recoverable errors are yielded in place of the skipped element. The
    /// sequence ends after a fatal error.
    pub fn records(&mut self) -> Records<'_> {
        Records { parser: self }
    }

    /// Restart from the beginning of the file
    pub fn rewind(&mut self) -> std::io::Result<()> {
        let header = std::mem::take(&mut self.header);
        *self = Self::open(&self.path)?;
        self.header = header;
        Ok(())
    }

    fn parse_next(&mut self) -> ParseResult {
        let mut buf = Vec::with_capacity(8192);
        let mut text = String::new();
        let mut partial: Option<Partial> = None;

        loop {
            buf.clear();
            let offset = self.reader.buffer_position() as u64;
            let event = match self.reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    self.finished = true;
                    let kind = match e {
                        quick_xml::Error::Io(io) => ParseErrorKind::Io(io.to_string()),
                        other => ParseErrorKind::Syntax(other.to_string()),
                    };
                    return ParseResult::Failed(ParseError::new(self.byte_position(), kind));
                }
            };

            match event {
                Event::Start(ref e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    text.clear();
                    let in_channel = self.stack.last().map(String::as_str) == Some("channel");
                    match partial {
                        Some(ref mut p) => p.start_child(&name, e, offset),
                        None if in_channel && RECORD_ELEMENTS.contains(&name.as_str()) => {
                            partial = Some(Partial::new(name.clone(), self.stack.len() + 1, offset));
                        }
                        None => {}
                    }
                    self.stack.push(name);
                }
                Event::Empty(ref e) => {
                    if let Some(ref mut p) = partial {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        p.end_child(&name, self.stack.last().map(String::as_str), "");
                    }
                }
                Event::Text(ref e) => match partial {
                    Some(ref mut p) => match e.unescape() {
                        Ok(t) => text.push_str(&t),
                        Err(err) => p.poison(ParseErrorKind::Encoding(err.to_string())),
                    },
                    // channel header fields
                    None if self.in_channel_field() => {
                        if let Ok(t) = e.unescape() {
                            text.push_str(&t);
                        }
                    }
                    None => {}
                },
                Event::CData(ref e) => match partial {
                    Some(ref mut p) => match std::str::from_utf8(e) {
                        Ok(t) => text.push_str(t),
                        Err(err) => p.poison(ParseErrorKind::Encoding(err.to_string())),
                    },
                    None if self.in_channel_field() => {
                        if let Ok(t) = std::str::from_utf8(e) {
                            text.push_str(t);
                        }
                    }
                    None => {}
                },
                Event::End(ref e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if !self.close(&name, partial.as_mut()) {
                        continue;
                    }

                    match partial.take() {
                        Some(p) if self.stack.len() < p.depth => return self.finish(p),
                        Some(mut p) => {
                            p.end_child(&name, self.stack.last().map(String::as_str), &text);
                            partial = Some(p);
                        }
                        None => {
                            if self.stack.last().map(String::as_str) == Some("channel") {
                                self.header_field(&name, text.trim());
                            }
                        }
                    }
                    text.clear();
                }
                Event::Eof => {
                    self.finished = true;
                    if let Some(p) = partial {
                        return ParseResult::Failed(ParseError::new(
                            p.offset,
                            ParseErrorKind::Syntax(format!(
                                "document ends inside <{}>",
                                p.element
                            )),
                        ));
                    }
                    return ParseResult::Eof;
                }
                _ => {}
            }
        }
    }

    /// Pop `name` off the element stack
    ///
    /// Returns false for a closing tag with no matching open element; such a
    /// tag is ignored. Closing an outer element implicitly closes the inner
    /// ones. Both cases poison the record being built.
    fn close(&mut self, name: &str, partial: Option<&mut Partial>) -> bool {
        let expected = self.stack.last().cloned().unwrap_or_default();
        match self.stack.iter().rposition(|open| open == name) {
            Some(pos) if pos + 1 == self.stack.len() => {
                self.stack.pop();
                true
            }
            found => {
                if let Some(p) = partial {
                    p.poison(ParseErrorKind::Mismatched {
                        expected,
                        found: name.to_string(),
                    });
                }
                match found {
                    Some(pos) => {
                        self.stack.truncate(pos);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Whether the innermost open element is a direct child of `<channel>`
    fn in_channel_field(&self) -> bool {
        let depth = self.stack.len();
        depth >= 2 && self.stack[depth - 2] == "channel"
    }

    fn header_field(&mut self, name: &str, value: &str) {
        let value = Some(value.to_string()).filter(|v| !v.is_empty());
        match name {
            "title" if self.header.title.is_none() => self.header.title = value,
            "wp:wxr_version" => self.header.wxr_version = value,
            "wp:base_site_url" => self.header.base_site_url = value,
            "wp:base_blog_url" => self.header.base_blog_url = value,
            _ => {}
        }
    }

    fn finish(&mut self, p: Partial) -> ParseResult {
        if let Some(kind) = p.error.clone() {
            return ParseResult::Failed(ParseError::new(p.offset, kind));
        }
        let offset = p.offset;
        let record = match p.element.as_str() {
            "wp:author" => author(&p),
            "wp:category" | "wp:tag" | "wp:term" => term(&p),
            _ => {
                let record = item(&p);
                if let Ok(ref parent) = record {
                    for c in &p.comments {
                        self.pending.push_back(
                            comment(c, parent.source_id())
                                .map_err(|kind| ParseError::new(c.offset, kind)),
                        );
                    }
                }
                record
            }
        };
        match record {
            Ok(record) => ParseResult::Record(record),
            Err(kind) => ParseResult::Failed(ParseError::new(offset, kind)),
        }
    }
}

impl Partial {
    fn new(element: String, depth: usize, offset: u64) -> Self {
        Self {
            element,
            depth,
            offset,
            fields: HashMap::new(),
            meta: Vec::new(),
            meta_key: None,
            terms: Vec::new(),
            category: None,
            comment: None,
            comments: Vec::new(),
            error: None,
        }
    }

    fn poison(&mut self, kind: ParseErrorKind) {
        self.error.get_or_insert(kind);
    }

    fn start_child(&mut self, name: &str, e: &BytesStart<'_>, offset: u64) {
        match name {
            "wp:comment" if self.element == "item" => {
                self.comment = Some(PartialComment {
                    offset,
                    fields: HashMap::new(),
                });
            }
            "category" => {
                let mut domain = String::new();
                let mut nicename = String::new();
                for attr in e.attributes().flatten() {
                    let value = match attr.unescape_value() {
                        Ok(v) => v.into_owned(),
                        Err(_) => continue,
                    };
                    match attr.key.as_ref() {
                        b"domain" => domain = value,
                        b"nicename" => nicename = value,
                        _ => {}
                    }
                }
                self.category = Some((domain, nicename));
            }
            _ => {}
        }
    }

    /// Store the text of a closed child element
    fn end_child(&mut self, name: &str, parent: Option<&str>, text: &str) {
        let value = if VERBATIM_FIELDS.contains(&name) {
            text.to_string()
        } else {
            text.trim().to_string()
        };

        if self.element != "item" {
            if parent == Some(self.element.as_str()) {
                self.fields.insert(name.to_string(), value);
            }
            return;
        }

        if name == "wp:comment" {
            if let Some(c) = self.comment.take() {
                self.comments.push(c);
            }
            return;
        }
        if let Some(ref mut c) = self.comment {
            if parent == Some("wp:comment") {
                c.fields.insert(name.to_string(), value);
            }
            return;
        }

        match (name, parent) {
            ("wp:meta_key", Some("wp:postmeta")) => self.meta_key = Some(value),
            ("wp:meta_value", Some("wp:postmeta")) => {
                let key = self.meta_key.take().unwrap_or_default();
                // meta values are stored verbatim; serialized payloads depend on exact bytes
                self.meta.push((key, text.to_string()));
            }
            ("category", _) => {
                if let Some((domain, slug)) = self.category.take() {
                    if !slug.is_empty() {
                        let taxonomy = if domain.is_empty() {
                            "category".to_string()
                        } else {
                            domain
                        };
                        self.terms.push(TermRef { taxonomy, slug });
                    }
                }
            }
            (_, Some("item")) => {
                self.fields.insert(name.to_string(), value);
            }
            _ => {}
        }
    }
}

fn text<'a>(fields: &'a HashMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map(String::as_str).unwrap_or("")
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ParseErrorKind> {
    match text(fields, name) {
        "" => Err(ParseErrorKind::MissingField(name.to_string())),
        value => Ok(value),
    }
}

fn required_id(fields: &HashMap<String, String>, name: &str) -> Result<SourceId, ParseErrorKind> {
    SourceId::parse_ref(required(fields, name)?)
        .ok_or_else(|| ParseErrorKind::MissingField(name.to_string()))
}

fn optional(fields: &HashMap<String, String>, name: &str) -> Option<String> {
    Some(text(fields, name).to_string()).filter(|v| !v.is_empty())
}

fn author(p: &Partial) -> Result<Record, ParseErrorKind> {
    let f = &p.fields;
    Ok(Record::Author(AuthorRecord {
        id: required_id(f, "wp:author_id")?,
        login: required(f, "wp:author_login")?.to_string(),
        email: text(f, "wp:author_email").to_string(),
        display_name: text(f, "wp:author_display_name").to_string(),
        first_name: text(f, "wp:author_first_name").to_string(),
        last_name: text(f, "wp:author_last_name").to_string(),
    }))
}

fn term(p: &Partial) -> Result<Record, ParseErrorKind> {
    let f = &p.fields;
    let (taxonomy, slug, name, parent, description) = match p.element.as_str() {
        "wp:category" => (
            "category".to_string(),
            "wp:category_nicename",
            "wp:cat_name",
            "wp:category_parent",
            "wp:category_description",
        ),
        "wp:tag" => (
            "post_tag".to_string(),
            "wp:tag_slug",
            "wp:tag_name",
            "",
            "wp:tag_description",
        ),
        _ => (
            required(f, "wp:term_taxonomy")?.to_string(),
            "wp:term_slug",
            "wp:term_name",
            "wp:term_parent",
            "wp:term_description",
        ),
    };
    let slug = required(f, slug)?.to_string();
    let name = optional(f, name).unwrap_or_else(|| slug.clone());
    Ok(Record::Term(TermRecord {
        id: required_id(f, "wp:term_id")?,
        taxonomy,
        slug,
        name,
        description: text(f, description).to_string(),
        parent_slug: optional(f, parent),
    }))
}

fn item(p: &Partial) -> Result<Record, ParseErrorKind> {
    let f = &p.fields;
    let id = required_id(f, "wp:post_id")?;
    let post_type = optional(f, "wp:post_type").unwrap_or_else(|| "post".to_string());
    let guid = text(f, "guid").to_string();
    let title = text(f, "title").to_string();
    let parent = SourceId::parse_ref(text(f, "wp:post_parent"));
    let author_login = optional(f, "dc:creator");
    let menu_order = text(f, "wp:menu_order").parse().unwrap_or(0);

    match post_type.as_str() {
        "attachment" => {
            let url = optional(f, "wp:attachment_url")
                .or_else(|| optional(f, "guid"))
                .ok_or_else(|| ParseErrorKind::MissingField("wp:attachment_url".to_string()))?;
            Ok(Record::Attachment(AttachmentRecord {
                id,
                guid,
                title,
                slug: text(f, "wp:post_name").to_string(),
                url,
                date: text(f, "wp:post_date").to_string(),
                author_login,
                parent,
                meta: p.meta.clone(),
            }))
        }
        "nav_menu_item" => {
            let meta = |key: &str| {
                p.meta
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.trim())
                    .unwrap_or("")
            };
            let object = meta("_menu_item_object").to_string();
            let object_id = SourceId::parse_ref(meta("_menu_item_object_id"));
            let target = match (meta("_menu_item_type"), object_id) {
                ("post_type", Some(id)) => MenuTarget::Post { object, id },
                ("taxonomy", Some(id)) => MenuTarget::Term { object, id },
                _ => MenuTarget::Custom {
                    url: meta("_menu_item_url").to_string(),
                },
            };
            Ok(Record::MenuItem(MenuItemRecord {
                id,
                guid,
                title,
                menu: p.terms.iter().find(|t| t.taxonomy == "nav_menu").cloned(),
                parent_item: SourceId::parse_ref(meta("_menu_item_menu_item_parent")),
                target,
                menu_order,
                status: text(f, "wp:status").to_string(),
            }))
        }
        _ => {
            let thumbnail = p
                .meta
                .iter()
                .find(|(k, _)| k == "_thumbnail_id")
                .and_then(|(_, v)| SourceId::parse_ref(v));
            Ok(Record::Post(PostRecord {
                id,
                post_type,
                guid,
                title,
                slug: text(f, "wp:post_name").to_string(),
                content: text(f, "content:encoded").to_string(),
                excerpt: text(f, "excerpt:encoded").to_string(),
                status: text(f, "wp:status").to_string(),
                date: text(f, "wp:post_date").to_string(),
                author_login,
                parent,
                menu_order,
                sticky: text(f, "wp:is_sticky") == "1",
                terms: p.terms.clone(),
                thumbnail,
                meta: p
                    .meta
                    .iter()
                    .filter(|(k, _)| k != "_thumbnail_id")
                    .cloned()
                    .collect(),
            }))
        }
    }
}

fn comment(c: &PartialComment, post: SourceId) -> Result<Record, ParseErrorKind> {
    let f = &c.fields;
    Ok(Record::Comment(CommentRecord {
        id: required_id(f, "wp:comment_id")?,
        post,
        parent: SourceId::parse_ref(text(f, "wp:comment_parent")),
        author: text(f, "wp:comment_author").to_string(),
        author_email: text(f, "wp:comment_author_email").to_string(),
        date: text(f, "wp:comment_date").to_string(),
        content: text(f, "wp:comment_content").to_string(),
        approved: text(f, "wp:comment_approved").to_string(),
        comment_type: text(f, "wp:comment_type").to_string(),
    }))
}

/// Iterator over the records of a bundle
pub struct Records<'a> {
    parser: &'a mut BundleParser,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(queued) = self.parser.pending.pop_front() {
            return Some(queued);
        }
        if self.parser.finished {
            return None;
        }
        match self.parser.parse_next() {
            ParseResult::Record(record) => Some(Ok(record)),
            ParseResult::Failed(err) => Some(Err(err)),
            ParseResult::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityKind;

    const SAMPLE_WXR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
  xmlns:excerpt="http://wordpress.org/export/1.2/excerpt/"
  xmlns:content="http://purl.org/rss/1.0/modules/content/"
  xmlns:dc="http://purl.org/dc/elements/1.1/"
  xmlns:wp="http://wordpress.org/export/1.2/">
<channel>
  <title>Demo Site</title>
  <wp:wxr_version>1.2</wp:wxr_version>
  <wp:base_site_url>https://demo.example.com</wp:base_site_url>
  <wp:base_blog_url>https://demo.example.com</wp:base_blog_url>
  <wp:author>
    <wp:author_id>1</wp:author_id>
    <wp:author_login><![CDATA[admin]]></wp:author_login>
    <wp:author_email><![CDATA[admin@example.com]]></wp:author_email>
    <wp:author_display_name><![CDATA[Site Admin]]></wp:author_display_name>
  </wp:author>
  <wp:category>
    <wp:term_id>5</wp:term_id>
    <wp:category_nicename><![CDATA[demo]]></wp:category_nicename>
    <wp:category_parent><![CDATA[]]></wp:category_parent>
    <wp:cat_name><![CDATA[Demo]]></wp:cat_name>
  </wp:category>
  <vendor:promo xmlns:vendor="urn:vendor"><vendor:banner>ignored</vendor:banner></vendor:promo>
  <wp:term>
    <wp:term_id>8</wp:term_id>
    <wp:term_taxonomy><![CDATA[nav_menu]]></wp:term_taxonomy>
    <wp:term_slug><![CDATA[main]]></wp:term_slug>
    <wp:term_name><![CDATA[Main Menu]]></wp:term_name>
  </wp:term>
  <item>
    <title>Hello &amp; welcome</title>
    <guid isPermaLink="false">https://demo.example.com/?p=12</guid>
    <dc:creator><![CDATA[admin]]></dc:creator>
    <content:encoded><![CDATA[<p>Body</p>
]]></content:encoded>
    <wp:post_id>12</wp:post_id>
    <wp:post_type><![CDATA[post]]></wp:post_type>
    <wp:post_parent>0</wp:post_parent>
    <wp:status><![CDATA[publish]]></wp:status>
    <category domain="category" nicename="demo"><![CDATA[Demo]]></category>
    <wp:postmeta>
      <wp:meta_key><![CDATA[_thumbnail_id]]></wp:meta_key>
      <wp:meta_value><![CDATA[9]]></wp:meta_value>
    </wp:postmeta>
    <wp:postmeta>
      <wp:meta_key><![CDATA[layout]]></wp:meta_key>
      <wp:meta_value><![CDATA[a:1:{s:4:"cols";i:2;}]]></wp:meta_value>
    </wp:postmeta>
    <wp:comment>
      <wp:comment_id>3</wp:comment_id>
      <wp:comment_author><![CDATA[Visitor]]></wp:comment_author>
      <wp:comment_date><![CDATA[2024-01-02 10:00:00]]></wp:comment_date>
      <wp:comment_content><![CDATA[Nice post]]></wp:comment_content>
      <wp:comment_parent>0</wp:comment_parent>
      <wp:commentmeta>
        <wp:meta_key><![CDATA[rating]]></wp:meta_key>
        <wp:meta_value><![CDATA[5]]></wp:meta_value>
      </wp:commentmeta>
    </wp:comment>
  </item>
  <item>
    <title>photo</title>
    <wp:post_id>9</wp:post_id>
    <wp:post_type><![CDATA[attachment]]></wp:post_type>
    <wp:post_parent>12</wp:post_parent>
    <wp:attachment_url><![CDATA[https://demo.example.com/wp-content/uploads/2024/01/photo.jpg]]></wp:attachment_url>
  </item>
  <item>
    <title>Home</title>
    <wp:post_id>20</wp:post_id>
    <wp:post_type><![CDATA[nav_menu_item]]></wp:post_type>
    <category domain="nav_menu" nicename="main"><![CDATA[Main Menu]]></category>
    <wp:postmeta><wp:meta_key>_menu_item_type</wp:meta_key><wp:meta_value>post_type</wp:meta_value></wp:postmeta>
    <wp:postmeta><wp:meta_key>_menu_item_object</wp:meta_key><wp:meta_value>post</wp:meta_value></wp:postmeta>
    <wp:postmeta><wp:meta_key>_menu_item_object_id</wp:meta_key><wp:meta_value>12</wp:meta_value></wp:postmeta>
    <wp:postmeta><wp:meta_key>_menu_item_menu_item_parent</wp:meta_key><wp:meta_value>0</wp:meta_value></wp:postmeta>
  </item>
</channel>
</rss>
"#;

    fn write_bundle(xml: &str) -> tempfile::NamedTempFile {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut temp_file, xml.as_bytes()).unwrap();
        temp_file
    }

    fn wrap(items: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><rss xmlns:wp="http://wordpress.org/export/1.2/"><channel>{}</channel></rss>"#,
            items
        )
    }

    #[test]
    fn test_parse_sample_bundle() {
        let file = write_bundle(SAMPLE_WXR);
        let mut parser = BundleParser::open(file.path()).unwrap();
        let records: Vec<_> = parser.records().collect::<Result<_, _>>().unwrap();

        let kinds: Vec<_> = records.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::Author,
                EntityKind::Term,
                EntityKind::Term,
                EntityKind::Post,
                EntityKind::Comment,
                EntityKind::Attachment,
                EntityKind::MenuItem,
            ]
        );

        let header = parser.header();
        assert_eq!(header.title.as_deref(), Some("Demo Site"));
        assert_eq!(header.base_site_url.as_deref(), Some("https://demo.example.com"));

        match &records[3] {
            Record::Post(post) => {
                assert_eq!(post.id, SourceId(12));
                assert_eq!(post.title, "Hello & welcome");
                assert_eq!(post.content, "<p>Body</p>\n");
                assert_eq!(post.author_login.as_deref(), Some("admin"));
                assert_eq!(post.parent, None);
                assert_eq!(
                    post.terms,
                    vec![TermRef {
                        taxonomy: "category".into(),
                        slug: "demo".into()
                    }]
                );
                assert_eq!(post.thumbnail, Some(SourceId(9)));
                assert_eq!(post.meta, vec![("layout".to_string(), r#"a:1:{s:4:"cols";i:2;}"#.to_string())]);
            }
            other => panic!("expected post, got {:?}", other),
        }

        match &records[4] {
            Record::Comment(comment) => {
                assert_eq!(comment.id, SourceId(3));
                assert_eq!(comment.post, SourceId(12));
                assert_eq!(comment.content, "Nice post");
            }
            other => panic!("expected comment, got {:?}", other),
        }

        match &records[6] {
            Record::MenuItem(item) => {
                assert_eq!(item.menu.as_ref().map(|m| m.slug.as_str()), Some("main"));
                assert_eq!(
                    item.target,
                    MenuTarget::Post {
                        object: "post".into(),
                        id: SourceId(12)
                    }
                );
                assert_eq!(item.parent_item, None);
            }
            other => panic!("expected menu item, got {:?}", other),
        }
    }

    #[test]
    fn test_rewind_replays_records() {
        let file = write_bundle(SAMPLE_WXR);
        let mut parser = BundleParser::open(file.path()).unwrap();
        let first: Vec<_> = parser.records().collect();
        parser.rewind().unwrap();
        let second: Vec<_> = parser.records().collect();
        assert_eq!(first, second);
        assert_eq!(parser.header().title.as_deref(), Some("Demo Site"));
    }

    #[test]
    fn test_channel_header_captured_before_records() {
        let xml = wrap(
            "<title>Caf&#233; &amp; Bar</title>\
             <wp:wxr_version>1.2</wp:wxr_version>\
             <wp:base_site_url><![CDATA[https://src.test]]></wp:base_site_url>\
             <wp:base_blog_url>https://src.test/blog</wp:base_blog_url>\
             <item><title>Post title</title><wp:post_id>3</wp:post_id></item>",
        );
        let file = write_bundle(&xml);
        let mut parser = BundleParser::open(file.path()).unwrap();
        let first = parser.records().next().unwrap().unwrap();

        assert_eq!(first.source_id(), SourceId(3));
        let header = parser.header();
        assert_eq!(header.title.as_deref(), Some("Café & Bar"));
        assert_eq!(header.wxr_version.as_deref(), Some("1.2"));
        assert_eq!(header.base_site_url.as_deref(), Some("https://src.test"));
        assert_eq!(header.base_blog_url.as_deref(), Some("https://src.test/blog"));
    }

    #[test]
    fn test_mismatched_element_is_skipped() {
        let xml = wrap(
            "<item><title>Broken</wp:post_id><wp:post_id>7</wp:post_id></item>\
             <item><title>Fine</title><wp:post_id>8</wp:post_id></item>",
        );
        let file = write_bundle(&xml);
        let mut parser = BundleParser::open(file.path()).unwrap();
        let results: Vec<_> = parser.records().collect();

        assert_eq!(results.len(), 2);
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Mismatched { .. }));
        assert!(!err.is_fatal());
        assert_eq!(results[1].as_ref().unwrap().source_id(), SourceId(8));
    }

    #[test]
    fn test_missing_field_and_bad_entity_are_recoverable() {
        let xml = wrap(
            "<item><title>No id</title></item>\
             <item><title>Bad &bogus; entity</title><wp:post_id>4</wp:post_id></item>\
             <wp:tag><wp:term_id>2</wp:term_id><wp:tag_slug>news</wp:tag_slug></wp:tag>",
        );
        let file = write_bundle(&xml);
        let mut parser = BundleParser::open(file.path()).unwrap();
        let results: Vec<_> = parser.records().collect();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap_err().kind,
            ParseErrorKind::MissingField("wp:post_id".into())
        );
        assert!(matches!(
            results[1].as_ref().unwrap_err().kind,
            ParseErrorKind::Encoding(_)
        ));
        match results[2].as_ref().unwrap() {
            Record::Term(term) => {
                assert_eq!(term.taxonomy, "post_tag");
                assert_eq!(term.name, "news");
            }
            other => panic!("expected term, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_bundle_is_fatal() {
        let xml = r#"<rss><channel><item><title>Cut"#;
        let file = write_bundle(xml);
        let mut parser = BundleParser::open(file.path()).unwrap();
        let results: Vec<_> = parser.records().collect();

        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_fatal());
    }
}
