//! Normalises raw attribute values into a placeholder expression plus the
//! symbol and string-literal maps needed to evaluate it.
//!
//! ```text
//! raw:      parent.children[0].width + 'px'
//! expr:     __x0 + __s0
//! symbols:  __x0 -> self.p.c0.width
//! literals: __s0 -> px
//! ```

use indexmap::IndexMap;

use crate::lexer::{Lexer, TokenType, KEYWORDS};
use crate::parser;
use crate::value::Value;

/// Symbol names every node can reference.
pub const IMPLICIT_KEYS: [&str; 2] = ["self", "root"];

/// Result of analysing one raw attribute value.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// The normalised expression, or the raw text for a constant.
    pub expr: String,
    /// `__xN` placeholder to dotted symbol path, in first-occurrence order.
    pub symbols: IndexMap<String, String>,
    /// `__sN` placeholder to decoded string contents.
    pub literals: IndexMap<String, String>,
    /// Set when the raw value is a self-contained literal.
    pub constant: Option<Value>,
}

impl Analysis {
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }
}

fn is_numbered(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// `__x<digits>` or `__s<digits>`.
#[must_use]
pub fn is_placeholder(name: &str) -> bool {
    is_numbered(name, "__x") || is_numbered(name, "__s")
}

/// Reserved `__` names an expression may not touch.
#[must_use]
pub fn is_forbidden_name(name: &str) -> bool {
    name.starts_with("__") && !is_placeholder(name)
}

/// A hop segment of a symbol path: `p` or `c<digits>`.
#[must_use]
pub fn is_hop(segment: &str) -> bool {
    segment.eq_ignore_ascii_case("p")
        || (segment.len() > 1
            && segment.as_bytes()[0].eq_ignore_ascii_case(&b'c')
            && segment[1..].bytes().all(|b| b.is_ascii_digit()))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn word_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    end
}

/// Analyses `raw` against the aliases visible in its root class.
/// `self` and `root` are always visible.
pub fn analyse<'a>(raw: &str, keys: impl IntoIterator<Item = &'a str>) -> Analysis {
    if let Some(value) = parser::parse(raw).ok().and_then(|e| e.literal_value()) {
        return Analysis {
            expr: raw.to_string(),
            symbols: IndexMap::new(),
            literals: IndexMap::new(),
            constant: Some(value),
        };
    }

    let mut keys: Vec<String> = keys.into_iter().map(str::to_string).collect();
    for implicit in IMPLICIT_KEYS {
        if !keys.iter().any(|k| k == implicit) {
            keys.push(implicit.to_string());
        }
    }

    let (expr, literals) = extract_strings(raw);
    let expr = insert_self(&expr, &keys, &literals);
    let expr = contract_hops(&expand_hops(&expr));
    let (expr, symbols) = extract_symbols(&expr, &keys);

    Analysis {
        expr,
        symbols,
        literals,
        constant: None,
    }
}

fn string_spans(expr: &str) -> Vec<(usize, usize)> {
    let bytes = expr.as_bytes();
    let mut spans = Vec::new();
    let mut quote: Option<&[u8]> = None;
    let mut begin = 0;
    let mut escaped = false;
    let mut n = 0;
    while n < bytes.len() {
        match quote {
            None => {
                let rest = &bytes[n..];
                if rest.starts_with(b"'''") || rest.starts_with(b"\"\"\"") {
                    quote = Some(&rest[..3]);
                    begin = n;
                    n += 3;
                    continue;
                }
                if rest[0] == b'\'' || rest[0] == b'"' {
                    quote = Some(&rest[..1]);
                    begin = n;
                }
            }
            Some(_) if escaped => escaped = false,
            Some(_) if bytes[n] == b'\\' => escaped = true,
            Some(q) if bytes[n..].starts_with(q) => {
                n += q.len();
                spans.push((begin, n));
                quote = None;
                continue;
            }
            Some(_) => {}
        }
        n += 1;
    }
    spans
}

fn extract_strings(raw: &str) -> (String, IndexMap<String, String>) {
    let mut out = String::with_capacity(raw.len());
    let mut literals = IndexMap::new();
    let mut last = 0;
    for (i, (begin, end)) in string_spans(raw).into_iter().enumerate() {
        let name = format!("__s{i}");
        out.push_str(&raw[last..begin]);
        out.push_str(&name);
        last = end;

        let span = &raw[begin..end];
        match Lexer::new(span).next_token().ttype {
            TokenType::String(text) => {
                literals.insert(name, text);
            }
            _ => log::error!("cannot decode string literal {span}"),
        }
    }
    out.push_str(&raw[last..]);
    (out, literals)
}

/// Prefixes `self.` to bare lowercase-start names that are not visible keys,
/// string placeholders or keywords.
fn insert_self(expr: &str, keys: &[String], literals: &IndexMap<String, String>) -> String {
    let bytes = expr.as_bytes();
    let mut out = String::with_capacity(expr.len() + 16);
    let mut last = 0;
    let mut n = 0;
    while n < bytes.len() {
        let b = bytes[n];
        let starts_word = (b.is_ascii_alphabetic() || b == b'_')
            && (n == 0 || !(is_word_byte(bytes[n - 1]) || bytes[n - 1] == b'.'));
        if !starts_word {
            n += 1;
            continue;
        }
        let end = word_end(bytes, n);
        let word = &expr[n..end];
        let visible = keys.iter().any(|k| k.eq_ignore_ascii_case(word))
            || literals.keys().any(|k| k.eq_ignore_ascii_case(word))
            || KEYWORDS.contains(&word);
        if !visible {
            out.push_str(&expr[last..n]);
            out.push_str("self.");
            last = n;
        }
        n = end;
    }
    out.push_str(&expr[last..]);
    out
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

/// Length of a `c<digits>.` or `children[<digits>].` run after a dot,
/// with the digits' byte range.
fn child_hop(rest: &[u8], long: bool) -> Option<(usize, usize, usize)> {
    let (open, close): (&[u8], &[u8]) = if long {
        (b"children[", b"].")
    } else {
        (b"c", b".")
    };
    if !starts_with_ignore_case(rest, open) {
        return None;
    }
    let start = open.len();
    let mut end = start;
    while end < rest.len() && rest[end].is_ascii_digit() {
        end += 1;
    }
    if end == start || !rest[end..].starts_with(close) {
        return None;
    }
    Some((start, end, end + close.len()))
}

fn rewrite_once(expr: &str) -> String {
    let bytes = expr.as_bytes();
    let mut out = String::with_capacity(expr.len());
    let mut last = 0;
    let mut n = 0;
    while n < bytes.len() {
        if bytes[n] != b'.' {
            n += 1;
            continue;
        }
        let rest = &bytes[n + 1..];
        if starts_with_ignore_case(rest, b"parent.") {
            out.push_str(&expr[last..n]);
            out.push_str(".p.");
            n += ".parent.".len();
            last = n;
        } else if let Some((start, end, len)) = child_hop(rest, true) {
            out.push_str(&expr[last..n]);
            out.push_str(".c");
            out.push_str(&expr[n + 1 + start..n + 1 + end]);
            out.push('.');
            n += 1 + len;
            last = n;
        } else {
            n += 1;
        }
    }
    out.push_str(&expr[last..]);
    out
}

/// Rewrites `.parent.` to `.p.` and `.children[N].` to `.cN.` until stable.
fn expand_hops(expr: &str) -> String {
    let mut current = expr.to_string();
    loop {
        let next = rewrite_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Contracts `.cN.p.` to `.`: stepping into a child and back out is a no-op.
fn contract_hops(expr: &str) -> String {
    let bytes = expr.as_bytes();
    let mut out = String::with_capacity(expr.len());
    let mut last = 0;
    let mut n = 0;
    while n < bytes.len() {
        if bytes[n] == b'.' {
            if let Some((_, _, len)) = child_hop(&bytes[n + 1..], false) {
                let after = n + 1 + len;
                if starts_with_ignore_case(&bytes[after..], b"p.") {
                    out.push_str(&expr[last..n]);
                    out.push('.');
                    n = after + 2;
                    last = n;
                    continue;
                }
            }
        }
        n += 1;
    }
    out.push_str(&expr[last..]);
    out
}

/// Replaces each distinct symbol path with a dense `__xN` placeholder.
fn extract_symbols(expr: &str, keys: &[String]) -> (String, IndexMap<String, String>) {
    let bytes = expr.as_bytes();
    let mut out = String::with_capacity(expr.len());
    let mut by_path: IndexMap<String, String> = IndexMap::new();
    let mut last = 0;
    let mut n = 0;
    while n < bytes.len() {
        let b = bytes[n];
        let starts_word = (b.is_ascii_alphabetic() || b == b'_')
            && (n == 0 || !(is_word_byte(bytes[n - 1]) || bytes[n - 1] == b'.'));
        if !starts_word {
            n += 1;
            continue;
        }
        let end = word_end(bytes, n);
        let Some(key) = keys.iter().find(|k| k.eq_ignore_ascii_case(&expr[n..end])) else {
            n = end;
            continue;
        };

        let mut segments: Vec<(usize, usize)> = Vec::new();
        let mut cursor = end;
        while cursor + 1 < bytes.len()
            && bytes[cursor] == b'.'
            && (bytes[cursor + 1].is_ascii_alphabetic() || bytes[cursor + 1] == b'_')
        {
            let seg_end = word_end(bytes, cursor + 1);
            segments.push((cursor + 1, seg_end));
            cursor = seg_end;
        }
        let hops = segments
            .iter()
            .take_while(|(s, e)| is_hop(&expr[*s..*e]))
            .count();
        let taken = (hops + 1).min(segments.len());

        let mut path = key.clone();
        for (i, (s, e)) in segments[..taken].iter().enumerate() {
            path.push('.');
            let segment = &expr[*s..*e];
            if i + 1 < taken {
                path.push_str(&segment.to_ascii_lowercase());
            } else {
                path.push_str(segment);
            }
        }
        let match_end = segments[..taken].last().map_or(end, |(_, e)| *e);

        let next = by_path.len();
        let name = by_path
            .entry(path)
            .or_insert_with(|| format!("__x{next}"))
            .clone();
        out.push_str(&expr[last..n]);
        out.push_str(&name);
        last = match_end;
        n = match_end;
    }
    out.push_str(&expr[last..]);

    let symbols = by_path.into_iter().map(|(path, name)| (name, path)).collect();
    (out, symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_KEYS: [&str; 0] = [];

    fn symbols(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_literal_fast_path() {
        let a = analyse("'hello'", NO_KEYS);
        assert_eq!(a.constant, Some(Value::Str("hello".to_string())));
        assert!(a.symbols.is_empty());
        assert!(a.literals.is_empty());

        let a = analyse("42", NO_KEYS);
        assert_eq!(a.constant, Some(Value::Int(42)));
        assert_eq!(a.expr, "42");

        let a = analyse("[1, -2.5, {'k': (None,)}]", NO_KEYS);
        assert!(a.is_constant());
    }

    #[test]
    fn test_single_dependency() {
        let a = analyse("p.x + 1", NO_KEYS);
        assert!(!a.is_constant());
        assert_eq!(a.expr, "__x0 + 1");
        assert_eq!(a.symbols, symbols(&[("__x0", "self.p.x")]));
    }

    #[test]
    fn test_golden_normalisation() {
        let a = analyse("parent.children[0].width + 'px'", NO_KEYS);
        assert_eq!(a.expr, "__x0 + __s0");
        assert_eq!(a.symbols, symbols(&[("__x0", "self.p.c0.width")]));
        assert_eq!(a.literals.get("__s0").map(String::as_str), Some("px"));
    }

    #[test]
    fn test_child_then_parent_contracts() {
        let a = analyse("children[1].parent.x * 2", NO_KEYS);
        assert_eq!(a.expr, "__x0 * 2");
        assert_eq!(a.symbols, symbols(&[("__x0", "self.x")]));

        let a = analyse("Parent.Parent.y", NO_KEYS);
        assert_eq!(a.symbols, symbols(&[("__x0", "self.p.p.y")]));
    }

    #[test]
    fn test_aliases_and_repeats() {
        let a = analyse("btn.text + btn.text + width", ["btn"]);
        assert_eq!(a.expr, "__x0 + __x0 + __x1");
        assert_eq!(
            a.symbols,
            symbols(&[("__x0", "btn.text"), ("__x1", "self.width")])
        );
    }

    #[test]
    fn test_bare_keys_and_hop_fields() {
        let a = analyse("root", NO_KEYS);
        assert_eq!(a.expr, "__x0");
        assert_eq!(a.symbols, symbols(&[("__x0", "root")]));

        let a = analyse("p.c1", NO_KEYS);
        assert_eq!(a.symbols, symbols(&[("__x0", "self.p.c1")]));

        let a = analyse("c[0].name", NO_KEYS);
        assert_eq!(a.expr, "__x0[0].name");
        assert_eq!(a.symbols, symbols(&[("__x0", "self.c")]));
    }

    #[test]
    fn test_keywords_and_numbers_untouched() {
        let a = analyse("not flag and True or 1e3 > size", NO_KEYS);
        assert_eq!(a.expr, "not __x0 and True or 1e3 > __x1");
        assert_eq!(
            a.symbols,
            symbols(&[("__x0", "self.flag"), ("__x1", "self.size")])
        );
    }

    #[test]
    fn test_strings_are_opaque() {
        let a = analyse(r#"'it\'s ' + name + """p.x"""#, NO_KEYS);
        assert_eq!(a.expr, "__s0 + __x0 + __s1");
        assert_eq!(a.symbols, symbols(&[("__x0", "self.name")]));
        assert_eq!(
            a.literals,
            symbols(&[("__s0", "it's "), ("__s1", "p.x")])
        );
    }

    #[test]
    fn test_idempotent() {
        let raw = "p.a + btn.children[2].w * 'x' + p.a";
        assert_eq!(analyse(raw, ["btn"]), analyse(raw, ["btn"]));
    }

    #[test]
    fn test_placeholder_names() {
        assert!(is_placeholder("__x12"));
        assert!(is_placeholder("__s0"));
        assert!(!is_placeholder("__x"));
        assert!(is_forbidden_name("__import__"));
        assert!(!is_forbidden_name("_private"));
        assert!(is_hop("c12"));
        assert!(is_hop("P"));
        assert!(!is_hop("c"));
        assert!(!is_hop("cx"));
    }
}
