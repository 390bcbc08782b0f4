//! Minimal HTML helpers for the scraped pages: table rows for the
//! labor-statistics page, attribute selectors for the job board.
//!
//! Tag names are matched ASCII case-insensitively. Searches run over an
//! ASCII-lowercased copy of the input, which keeps byte offsets identical to
//! the original so slices can be taken from either.

/// Inner HTML of every `<table>` in the document, in order.
pub fn tables(html: &str) -> Vec<&str> {
    blocks(html, "table")
}

/// Text of every cell (`td` or `th`) of every row (`tr`) in a table body.
pub fn table_rows(table: &str) -> Vec<Vec<String>> {
    blocks(table, "tr").into_iter().map(row_cells).collect()
}

/// All rows across all tables, in document order.
pub fn all_rows(html: &str) -> Vec<Vec<String>> {
    tables(html).into_iter().flat_map(table_rows).collect()
}

/// Plain text of the first element with the given tag name.
pub fn first_element_text(html: &str, tag: &str) -> Option<String> {
    blocks(html, tag).into_iter().next().map(cell_text)
}

/// The subset of CSS selectors the job-board pages need, tested against one
/// opening tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'s> {
    /// `[name="value"]`; `#id` is `Attr("id", ..)`.
    Attr(&'s str, &'s str),
    /// `.class`, matched against the whitespace-separated `class` tokens.
    Class(&'s str),
}

impl Selector<'_> {
    fn matches(&self, attrs: &str) -> bool {
        match *self {
            Self::Attr(name, value) => attr_value(attrs, name) == Some(value),
            Self::Class(class) => attr_value(attrs, "class")
                .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class)),
        }
    }
}

/// Plain text of every element matching `selector`, in document order.
pub fn select_text(html: &str, selector: Selector<'_>) -> Vec<String> {
    let lc = html.to_ascii_lowercase();
    opening_tags(html)
        .into_iter()
        .filter(|t| selector.matches(t.attrs))
        .map(|t| {
            if t.self_closing || VOID_ELEMENTS.contains(&t.name.as_str()) {
                String::new()
            } else {
                cell_text(element_inner(html, &lc, &t.name, t.end))
            }
        })
        .collect()
}

/// Number of elements matching any of `selectors`, each counted once.
pub fn count_matching(html: &str, selectors: &[Selector<'_>]) -> usize {
    opening_tags(html)
        .iter()
        .filter(|t| selectors.iter().any(|s| s.matches(t.attrs)))
        .count()
}

const VOID_ELEMENTS: [&str; 8] = ["br", "hr", "img", "input", "link", "meta", "source", "wbr"];

struct OpenTag<'a> {
    /// Lowercased.
    name: String,
    attrs: &'a str,
    /// Byte offset just past the closing `>`.
    end: usize,
    self_closing: bool,
}

fn opening_tags(s: &str) -> Vec<OpenTag<'_>> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = s.get(pos..).and_then(|h| h.find('<')) {
        let start = pos + rel;
        pos = start + 1;
        let name_len = bytes[start + 1..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        if name_len == 0 || !bytes[start + 1].is_ascii_alphabetic() {
            continue;
        }
        let name_end = start + 1 + name_len;
        let Some(close) = s[name_end..].find('>').map(|i| name_end + i) else {
            break;
        };
        let attrs = &s[name_end..close];
        out.push(OpenTag {
            name: s[start + 1..name_end].to_ascii_lowercase(),
            attrs,
            end: close + 1,
            self_closing: attrs.trim_end().ends_with('/'),
        });
        pos = close + 1;
    }
    out
}

/// Value of attribute `name` (ASCII case-insensitive) in an opening tag's
/// attribute text. Bare attributes have an empty value.
fn attr_value<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = attrs;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            return None;
        }
        let key_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        rest = rest[key_end..].trim_start();

        let mut value = "";
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(q).unwrap_or(body.len());
                    value = &body[..end];
                    rest = body.get(end + 1..).unwrap_or("");
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_ascii_whitespace())
                        .unwrap_or(after_eq.len());
                    value = &after_eq[..end];
                    rest = &after_eq[end..];
                }
            }
        }
        if !key.is_empty() && key.eq_ignore_ascii_case(name) {
            return Some(value);
        }
    }
}

/// Inner slice of the element whose opening tag ends at `open_end`, counting
/// nested elements of the same name. Unclosed elements run to end of input.
fn element_inner<'a>(s: &'a str, lc: &str, name: &str, open_end: usize) -> &'a str {
    let close_pat = format!("</{name}");
    let mut depth = 0usize;
    let mut pos = open_end;
    loop {
        let next_close = lc.get(pos..).and_then(|h| h.find(&close_pat)).map(|i| pos + i);
        let next_open = find_open_tag(lc, &[name], pos);
        match (next_open, next_close) {
            (Some(open), Some(close)) if open < close => {
                depth += 1;
                pos = open + 1;
            }
            (_, Some(close)) => {
                if depth == 0 {
                    return &s[open_end..close];
                }
                depth -= 1;
                pos = close + 1;
            }
            (_, None) => return &s[open_end..],
        }
    }
}

fn row_cells(row: &str) -> Vec<String> {
    let lc = row.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(start) = find_open_tag(&lc, &["td", "th"], pos) {
        let Some(open_end) = lc[start..].find('>').map(|i| start + i + 1) else {
            break;
        };
        let next_open = find_open_tag(&lc, &["td", "th"], open_end).unwrap_or(lc.len());
        let close = find_any(&lc, &["</td", "</th"], open_end)
            .filter(|&c| c <= next_open)
            .unwrap_or(next_open);
        out.push(cell_text(&row[open_end..close]));
        pos = close;
    }
    out
}

/// Inner slices of `<tag ...>...</tag>` blocks. A missing close tag ends the
/// block at the next opening tag of the same name (or end of input).
fn blocks<'a>(s: &'a str, tag: &str) -> Vec<&'a str> {
    let lc = s.to_ascii_lowercase();
    let close_pat = format!("</{tag}");
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(start) = find_open_tag(&lc, &[tag], pos) {
        let Some(open_end) = lc[start..].find('>').map(|i| start + i + 1) else {
            break;
        };
        let next_open = find_open_tag(&lc, &[tag], open_end).unwrap_or(lc.len());
        let close = lc[open_end..]
            .find(&close_pat)
            .map(|i| open_end + i)
            .filter(|&c| c <= next_open)
            .unwrap_or(next_open);
        out.push(&s[open_end..close]);
        pos = close.max(open_end);
    }
    out
}

/// Position of the next `<tag` whose name is followed by `>`, `/` or
/// whitespace, so `<th` does not match `<thead`.
fn find_open_tag(lc: &str, tags: &[&str], from: usize) -> Option<usize> {
    let bytes = lc.as_bytes();
    let mut pos = from;
    while let Some(rel) = lc.get(pos..)?.find('<') {
        let start = pos + rel;
        for tag in tags {
            let name_end = start + 1 + tag.len();
            if lc.get(start + 1..name_end) == Some(*tag) {
                match bytes.get(name_end) {
                    Some(b'>') | Some(b'/') => return Some(start),
                    Some(b) if b.is_ascii_whitespace() => return Some(start),
                    _ => {}
                }
            }
        }
        pos = start + 1;
    }
    None
}

fn find_any(lc: &str, pats: &[&str], from: usize) -> Option<usize> {
    let hay = lc.get(from..)?;
    pats.iter().filter_map(|p| hay.find(p)).min().map(|i| from + i)
}

/// Strip tags, decode the handful of entities the page uses, collapse whitespace.
pub fn cell_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&normalize_entities(&out))
}

fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
