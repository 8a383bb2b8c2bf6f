//! The plain, non-observing templating: `{field}` substitution, and
//! `{iter}…{/iter}` blocks repeated for every field of a record.
//! Nothing here can be updated after rendering; see `template` for
//! that.

use crate::record::{value_text, Record};

pub const ITER_START: &str = "{iter}";
pub const ITER_END: &str = "{/iter}";

#[derive(Debug, PartialEq)]
enum Piece<'s> {
    Literal(&'s str),
    /// Block body, whitespace between tags already collapsed.
    Iter(String),
}

/// `>` + whitespace + `<` becomes `><`, then the whole is trimmed.
fn collapse_between_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('>') {
        out.push_str(&rest[..=i]);
        let after = &rest[i + 1..];
        let trimmed = after.trim_start();
        if trimmed.len() < after.len() && trimmed.starts_with('<') {
            rest = trimmed;
        } else {
            rest = after;
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn pieces(markup: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut rest = markup;
    loop {
        let block = rest.find(ITER_START).and_then(|start| {
            let body_start = start + ITER_START.len();
            rest[body_start..].find(ITER_END)
                .map(|len| (start, body_start, body_start + len))
        });
        match block {
            Some((start, body_start, body_end)) => {
                pieces.push(Piece::Literal(rest[..start].trim_end()));
                pieces.push(Piece::Iter(collapse_between_tags(&rest[body_start..body_end])));
                rest = rest[body_end + ITER_END.len()..].trim_start();
            }
            None => {
                pieces.push(Piece::Literal(rest));
                return pieces
            }
        }
    }
}

/// Replace `{name}` for every name `lookup` knows, in one pass;
/// anything else in braces stays as written.
fn substitute<'v>(s: &str, out: &mut String, lookup: impl Fn(&str) -> Option<std::borrow::Cow<'v, str>>) {
    let mut rest = s;
    while let Some(i) = rest.find('{') {
        out.push_str(&rest[..i]);
        let after = &rest[i + 1..];
        match after.find(|c| c == '}' || c == '{') {
            Some(j) if after.as_bytes()[j] == b'}' => {
                match lookup(&after[..j]) {
                    Some(v) => out.push_str(&v),
                    None => out.push_str(&rest[i..i + j + 2]),
                }
                rest = &after[j + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
}

/// Render `markup` once per record and concatenate the results.
pub fn interpolate(markup: &str, records: &[Record]) -> String {
    let pieces = pieces(markup);
    let has_blocks = pieces.iter().any(|p| matches!(p, Piece::Iter(_)));
    let mut out = String::new();
    for record in records {
        if has_blocks {
            for p in &pieces {
                match p {
                    Piece::Literal(l) => out.push_str(l),
                    Piece::Iter(body) => for (k, v) in record {
                        substitute(body, &mut out, |name| match name {
                            "key" => Some(k.as_str().into()),
                            "value" => Some(value_text(v)),
                            _ => None,
                        });
                    },
                }
            }
        } else {
            substitute(markup, &mut out, |name| record.get(name).map(value_text));
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::record::records_of;

    fn records(v: serde_json::Value) -> Vec<Record> {
        records_of(v.as_array().unwrap())
    }

    #[test]
    fn t_fields() {
        let rs = records(json!([
            {"name": "Butters", "age": 9},
            {"name": "Token"},
        ]));
        assert_eq!(interpolate("<p>{name} ({age}) {x}</p>", &rs),
                   "<p>Butters (9) {x}</p><p>Token ({age}) {x}</p>");
        assert_eq!(interpolate("{ {name}{", &rs[..1]), "{ Butters{");
        assert_eq!(interpolate("<p>{name}</p>", &[]), "");
    }

    #[test]
    fn t_single_pass() {
        let rs = records(json!([{"a": "{b}", "b": "B"}]));
        assert_eq!(interpolate("{a}{b}", &rs), "{b}B");
    }

    #[test]
    fn t_iter_blocks() {
        let rs = records(json!([
            {"name": "Stan", "town": "South Park"},
            {"name": "Wendy"},
        ]));
        let markup = "<dl>\n  {iter}\n    <dt>{key}</dt>\n    <dd>{value}</dd>\n  {/iter}\n</dl>";
        assert_eq!(interpolate(markup, &rs),
                   "<dl><dt>name</dt><dd>Stan</dd><dt>town</dt><dd>South Park</dd></dl>\
                    <dl><dt>name</dt><dd>Wendy</dd></dl>");
    }

    #[test]
    fn t_unclosed_block_is_literal() {
        let rs = records(json!([{"v": 1}]));
        assert_eq!(interpolate("{iter}{v}", &rs), "{iter}1");
    }

    #[test]
    fn t_collapse() {
        assert_eq!(collapse_between_tags("  <a> \n <b>x y</b>  "), "<a><b>x y</b>");
        assert_eq!(collapse_between_tags("<a> text <b>"), "<a> text <b>");
    }
}
