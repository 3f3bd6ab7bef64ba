//! Diff URL normalization.
//!
//! Bitbucket's pull request diff links name the two revisions being compared
//! in a single path segment, `<repo>:<hash>..<repo>:<hash>`. In webhook
//! payloads the separator sometimes arrives as an encoded or literal carriage
//! return instead of `..`, and stray line breaks can also appear elsewhere in
//! the path. Sent as-is such a URL breaks the HTTP request line.
//!
//! Normalization:
//!
//! 1. Trim surrounding whitespace and split off the query string, which is
//!    never modified.
//! 2. Percent-decode the path.
//! 3. In the revision spec (everything after the last `/diff/` or `/patch/`),
//!    replace each interior run of CR/LF with `..`, and encode `:` as `%3A`.
//! 4. Elsewhere, replace each interior run of CR/LF with `/`.
//!
//! Line breaks at either end of a region are dropped rather than replaced.

/// Path markers that introduce a revision spec.
const SPEC_MARKERS: [&str; 2] = ["/diff/", "/patch/"];

/// Normalizes a diff link from a webhook payload into a requestable URL.
pub fn normalize_diff_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let (path, query) = match trimmed.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (trimmed, None),
    };

    // Invalid UTF-8 escapes become U+FFFD so the rest of the path is still decoded.
    let bytes = urlencoding::decode_binary(path.as_bytes());
    let decoded = String::from_utf8_lossy(&bytes);

    let mut normalized = match spec_start(&decoded) {
        Some(start) => {
            let (head, spec) = decoded.split_at(start);
            let mut out = replace_line_breaks(head, "/");
            out.push_str(&replace_line_breaks(spec, "..").replace(':', "%3A"));
            out
        }
        None => replace_line_breaks(&decoded, "/"),
    };

    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }
    normalized
}

/// Byte offset just past the last revision spec marker, if any.
fn spec_start(path: &str) -> Option<usize> {
    SPEC_MARKERS
        .iter()
        .filter_map(|marker| path.rfind(marker).map(|idx| idx + marker.len()))
        .max()
}

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Replaces interior runs of CR/LF with `separator` and drops leading and
/// trailing runs. A `/` separator next to an existing `/` is dropped too.
fn replace_line_breaks(s: &str, separator: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_break = false;

    for c in s.chars() {
        if is_line_break(c) {
            pending_break = true;
            continue;
        }
        if pending_break {
            let redundant = separator == "/" && (out.ends_with('/') || c == '/');
            if !out.is_empty() && !redundant {
                out.push_str(separator);
            }
            pending_break = false;
        }
        out.push(c);
    }

    out
}
