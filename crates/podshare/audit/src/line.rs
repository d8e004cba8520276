//! One N-Triples style line per record:
//! `<https://podshare.dev/ns/log#ID> <https://podshare.dev/ns/data#log> "RECORD" .`

use podshare_types::AuditEntryId;

pub const LOG_ENTRY_NS: &str = "https://podshare.dev/ns/log#";
pub const LOG_PREDICATE: &str = "https://podshare.dev/ns/data#log";

pub fn format_line(id: &AuditEntryId, record: &str) -> String {
    format!(
        "<{}{}> <{}> \"{}\" .",
        LOG_ENTRY_NS,
        id,
        LOG_PREDICATE,
        escape(record)
    )
}

/// Split a stored line into its id and unescaped record. Lines without the
/// structural markers yield `None`.
pub fn parse_line(line: &str) -> Option<(AuditEntryId, String)> {
    let line = line.trim();
    let rest = line.strip_prefix('<')?.strip_prefix(LOG_ENTRY_NS)?;
    let (id, rest) = rest.split_once('>')?;
    if id.is_empty() {
        return None;
    }
    let rest = rest.trim_start().strip_prefix('<')?.strip_prefix(LOG_PREDICATE)?;
    let rest = rest.strip_prefix('>')?.trim_start();
    let literal = rest
        .strip_suffix('.')?
        .trim_end()
        .strip_prefix('"')?
        .strip_suffix('"')?;
    Some((AuditEntryId(id.to_string()), unescape(literal)?))
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn line_carries_id_and_record() {
        let id = AuditEntryId("0001714564800000-000001-abcd1234".to_string());
        let line = format_line(&id, "{\"v\":\"1\",\"note\":\"a\\b\"}");
        assert_eq!(
            line,
            "<https://podshare.dev/ns/log#0001714564800000-000001-abcd1234> \
             <https://podshare.dev/ns/data#log> \"{\\\"v\\\":\\\"1\\\",\\\"note\\\":\\\"a\\\\b\\\"}\" ."
        );
        let (parsed_id, record) = parse_line(&line).unwrap();
        assert_eq!(parsed_id, id);
        assert_eq!(record, "{\"v\":\"1\",\"note\":\"a\\b\"}");
    }

    #[test]
    fn foreign_lines_are_ignored() {
        assert!(parse_line("@prefix ex: <https://example.org/> .").is_none());
        assert!(parse_line("<https://podshare.dev/ns/log#x> <https://other/p> \"r\" .").is_none());
        assert!(parse_line("<https://podshare.dev/ns/log#x> <https://podshare.dev/ns/data#log> \"bad\\q\" .").is_none());
        assert!(parse_line("").is_none());
    }

    proptest! {
        #[test]
        fn escaping_is_reversible(raw in ".*") {
            prop_assert_eq!(unescape(&escape(&raw)), Some(raw));
        }
    }
}
