//! Allow-list HTML sanitizer for narratives shown to the user.
//!
//! Every tag the sanitizer keeps is re-emitted in a canonical form
//! (lowercase name, double-quoted and escaped attribute values), and all
//! other text is escaped, so running the sanitizer on its own output is a
//! no-op.

use std::sync::LazyLock;

use regex::Regex;

/// Tags kept in the output.
const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "br", "hr", "strong", "b", "em", "i", "u", "s",
    "blockquote", "ul", "ol", "li", "table", "thead", "tbody", "tfoot", "tr", "th", "td",
    "caption", "a", "img", "code", "pre", "span", "div",
];

/// Tags that have no closing counterpart.
const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Tags removed together with everything up to their closing tag.
const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "frameset", "frame",
    "applet", "svg", "math", "xml",
];

/// Attributes kept on allowed tags, in addition to `data-*`.
const ALLOWED_ATTRS: &[&str] = &[
    "href", "src", "alt", "title", "class", "style", "target", "rel",
];

/// Image formats accepted in `data:` URLs on `src`.
const SAFE_DATA_IMAGES: &[&str] = &[
    "data:image/png",
    "data:image/jpeg",
    "data:image/jpg",
    "data:image/gif",
    "data:image/webp",
];

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("tag regex is valid")
});

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("attribute regex is valid")
});

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("entity regex is valid")
});

static DATA_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data-[a-z0-9_-]+$").expect("data attribute regex is valid"));

/// Remove executable content from `html`, keeping an allow-list of
/// formatting tags and attributes.
///
/// Idempotent, and the output never contains `<script` in any case.
///
/// # Examples
///
/// ```
/// use rentwise_llm::sanitize;
///
/// let clean = sanitize("<p onclick=\"steal()\">Hi<script>alert(1)</script></p>");
/// assert_eq!(clean, "<p>Hi</p>");
/// assert_eq!(sanitize(&clean), clean);
/// ```
pub fn sanitize(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(c) = rest.chars().next() {
        match c {
            '<' => rest = consume_markup(rest, &mut out),
            '>' => {
                out.push_str("&gt;");
                rest = &rest[1..];
            }
            '&' => {
                if let Some(entity) = ENTITY.find(rest) {
                    out.push_str(entity.as_str());
                    rest = &rest[entity.end()..];
                } else {
                    out.push_str("&amp;");
                    rest = &rest[1..];
                }
            }
            _ => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// Handle markup starting at `rest` (which begins with `<`) and return the
/// remaining input.
fn consume_markup<'a>(rest: &'a str, out: &mut String) -> &'a str {
    if let Some(body) = rest.strip_prefix("<!--") {
        return body.find("-->").map_or("", |end| &body[end + 3..]);
    }
    if rest.starts_with("<!") || rest.starts_with("<?") {
        return rest.find('>').map_or("", |end| &rest[end + 1..]);
    }

    let Some(caps) = TAG.captures(rest) else {
        out.push_str("&lt;");
        return &rest[1..];
    };

    let whole = caps.get(0).map_or(0, |m| m.end());
    let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
    let name = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let attrs = caps.get(3).map_or("", |m| m.as_str());
    let after = &rest[whole..];

    if DROPPED_WITH_CONTENT.contains(&name.as_str()) {
        return if closing {
            after
        } else {
            skip_past_closing(after, &name)
        };
    }

    if !ALLOWED_TAGS.contains(&name.as_str()) {
        return after;
    }

    let is_void = VOID_TAGS.contains(&name.as_str());
    if closing {
        if !is_void {
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
        }
    } else {
        out.push('<');
        out.push_str(&name);
        write_attrs(attrs, out);
        out.push('>');
    }
    after
}

/// Skip everything up to and including `</name>`, or to the end of input.
fn skip_past_closing<'a>(rest: &'a str, name: &str) -> &'a str {
    let lower = rest.to_ascii_lowercase();
    let needle = format!("</{name}");
    let mut from = 0;
    while let Some(pos) = lower[from..].find(&needle) {
        let start = from + pos;
        let tail = &lower[start + needle.len()..];
        // `</scriptx` is not a closing tag for `script`.
        if tail
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c.is_ascii_whitespace() || c == '/')
        {
            return tail
                .find('>')
                .map_or("", |end| &rest[start + needle.len() + end + 1..]);
        }
        from = start + needle.len();
    }
    ""
}

fn write_attrs(attrs: &str, out: &mut String) {
    let mut seen: Vec<String> = Vec::new();
    for caps in ATTR.captures_iter(attrs) {
        let Some(name) = caps.get(1).map(|m| m.as_str().to_ascii_lowercase()) else {
            continue;
        };
        if seen.contains(&name) {
            continue;
        }
        if !(ALLOWED_ATTRS.contains(&name.as_str()) || DATA_ATTR.is_match(&name)) {
            continue;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        if !attr_value_is_safe(&name, value) {
            continue;
        }
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
        seen.push(name);
    }
}

fn attr_value_is_safe(name: &str, value: &str) -> bool {
    let normalized = normalize(value);
    match name {
        "href" | "src" => {
            if normalized.starts_with("javascript:") || normalized.starts_with("vbscript:") {
                return false;
            }
            if normalized.starts_with("data:") {
                return name == "src" && SAFE_DATA_IMAGES.iter().any(|p| normalized.starts_with(p));
            }
            true
        }
        "style" => ![
            "expression",
            "javascript:",
            "vbscript:",
            "-moz-binding",
            "behavior",
        ]
        .iter()
        .any(|needle| normalized.contains(needle)),
        _ => true,
    }
}

/// Decode character references and strip whitespace and control characters
/// so obfuscated schemes like `jav&#x61;script:` are recognized.
fn normalize(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(c) = rest.chars().next() {
        if c == '&'
            && let Some((ch, len)) = decode_entity(rest)
        {
            decoded.push(ch);
            rest = &rest[len..];
            continue;
        }
        decoded.push(c);
        rest = &rest[c.len_utf8()..];
    }
    decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect()
}

fn decode_entity(s: &str) -> Option<(char, usize)> {
    let m = ENTITY.find(s)?;
    let body = &s[1..m.end() - 1];
    let ch = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        char::from_u32(u32::from_str_radix(hex, 16).ok()?)?
    } else if let Some(dec) = body.strip_prefix('#') {
        char::from_u32(dec.parse().ok()?)?
    } else {
        match body.to_ascii_lowercase().as_str() {
            "colon" => ':',
            "tab" => '\t',
            "newline" => '\n',
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => return None,
        }
    };
    Some((ch, m.end()))
}

fn escape_attr(value: &str, out: &mut String) {
    let mut rest = value;
    while let Some(c) = rest.chars().next() {
        match c {
            '&' => {
                if let Some(entity) = ENTITY.find(rest) {
                    out.push_str(entity.as_str());
                    rest = &rest[entity.end()..];
                    continue;
                }
                out.push_str("&amp;");
            }
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }
}
