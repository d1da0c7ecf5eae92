//! Location URI parsing and path normalization.
//!
//! Analyzer locations look like `|cpp+method:///ns/Widget/draw(int)|` or
//! `|file:///C:/src/widget.cpp|(120,40,<5,0>,<7,1>)`. Parsing never fails:
//! anything unparseable comes back with the `unknown` scheme so callers can
//! skip the fact.

/// Scheme reported for locations that could not be parsed.
pub const UNKNOWN_SCHEME: &str = "unknown";

/// Scheme of physical (file system) locations.
pub const FILE_SCHEME: &str = "file";

/// A parsed location URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    pub scheme: String,
    /// Percent-decoded path, without query or fragment.
    pub path: String,
    /// Last path segment with any parameter list removed.
    pub simple_name: String,
}

impl ParsedUri {
    fn unknown(original: &str) -> Self {
        Self {
            scheme: UNKNOWN_SCHEME.to_string(),
            path: original.to_string(),
            simple_name: original.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.scheme == UNKNOWN_SCHEME
    }

    pub fn is_file(&self) -> bool {
        self.scheme == FILE_SCHEME
    }
}

/// Parses `scheme://authority/path[(params)]`, optionally wrapped in `|...|`.
pub fn parse_uri(uri: &str) -> ParsedUri {
    try_parse(uri).unwrap_or_else(|| ParsedUri::unknown(uri))
}

fn try_parse(uri: &str) -> Option<ParsedUri> {
    let clean = strip_delimiters(uri);

    let (scheme, rest) = clean.split_once(':')?;
    if !is_valid_scheme(scheme) {
        return None;
    }

    let path = match rest.strip_prefix("//") {
        // authority runs up to the first slash; the slash belongs to the path
        Some(after) => after.find('/').map(|i| &after[i..]).unwrap_or(""),
        None => rest,
    };

    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = urlencoding::decode(path).ok()?.into_owned();
    let simple_name = simple_name_of(&path);

    Some(ParsedUri {
        scheme: scheme.to_ascii_lowercase(),
        path,
        simple_name,
    })
}

/// `|file:///a.cpp|(1,2)` -> `file:///a.cpp`. Unwrapped input passes through.
fn strip_delimiters(uri: &str) -> &str {
    match uri.strip_prefix('|') {
        Some(inner) => inner.split('|').next().unwrap_or(inner),
        None => uri,
    }
}

/// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Parameter lists may themselves contain `/`, so they are cut before the
/// last segment is taken.
fn simple_name_of(path: &str) -> String {
    let head = path.split('(').next().unwrap_or(path);
    head.rsplit('/').next().unwrap_or(head).to_string()
}

/// Canonical file key: forward slashes, lower case, and no leading slash in
/// front of a drive letter (`/C:/src` -> `c:/src`).
pub fn normalize_path(path: &str) -> String {
    let p = path.replace('\\', "/").to_lowercase();
    let bytes = p.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' {
        p[1..].to_string()
    } else {
        p
    }
}
