//! Small helpers over tree-sitter Python nodes.

use tree_sitter::Node;

/// Source text covered by a node. Invalid UTF-8 boundaries yield "".
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Dotted path of an identifier/attribute chain, e.g. `app.api.get`.
///
/// Returns `None` for anything that is not a plain name chain (calls,
/// subscripts, literals).
pub fn dotted_path(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attribute = node.child_by_field_name("attribute")?;
            let prefix = dotted_path(object, source)?;
            Some(format!("{prefix}.{}", node_text(attribute, source)))
        }
        "parenthesized_expression" => dotted_path(node.named_child(0)?, source),
        _ => None,
    }
}

/// Dotted path of a call's callee, or of the expression itself when it is
/// not a call. `app.route("/")` and `app.route` both yield `app.route`.
pub fn callee_path(node: Node<'_>, source: &str) -> Option<String> {
    if node.kind() == "call" {
        return dotted_path(node.child_by_field_name("function")?, source);
    }
    dotted_path(node, source)
}

/// Named children of a node, collected so callers can iterate freely.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Whether a name is a Python identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Upper-case names follow the settings convention (`DEBUG`, `SECRET_KEY`).
pub fn is_settings_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && !name.starts_with('_')
        && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Strip one leading `/` from the body of a Python string literal, keeping
/// any prefix and quote style: `"/count/"` becomes `"count/"`.
pub fn strip_leading_slash(literal: &str) -> String {
    let prefix_len = literal
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .count();
    let (prefix, rest) = literal.split_at(prefix_len);
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(body) = rest.strip_prefix(quote) {
            if let Some(stripped) = body.strip_prefix('/') {
                return format!("{prefix}{quote}{stripped}");
            }
            return literal.to_string();
        }
    }
    literal.to_string()
}

/// Body of a simple string literal (`"abc"` gives `abc`), if it is one.
pub fn string_literal_value(literal: &str) -> Option<String> {
    let trimmed = literal.trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(body) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Some(body.to_string());
        }
    }
    None
}

/// Value of a plain `string` or implicitly `concatenated_string` node.
///
/// f-strings and bytes have no static text value and give `None`.
pub fn string_value(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "concatenated_string" => named_children(node)
            .into_iter()
            .filter(|part| part.kind() != "comment")
            .map(|part| string_value(part, source))
            .collect(),
        "string" => {
            let start = node.child(0).filter(|c| c.kind() == "string_start")?;
            let end = node
                .child(node.child_count().checked_sub(1)?)
                .filter(|c| c.kind() == "string_end")?;
            let prefix = node_text(start, source)
                .trim_end_matches(['"', '\''])
                .to_ascii_lowercase();
            if prefix.contains('f') || prefix.contains('b') {
                return None;
            }
            let body = source.get(start.end_byte()..end.start_byte())?;
            if prefix.contains('r') {
                Some(body.to_string())
            } else {
                unescape(body)
            }
        }
        _ => None,
    }
}

/// Resolve backslash escapes in the body of a non-raw string literal.
/// Unknown escapes keep their backslash. `\N{...}` is not supported.
fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        match escaped {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(escaped),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut digits = String::from(escaped);
                while digits.len() < 3 && chars.peek().is_some_and(|d| ('0'..='7').contains(d)) {
                    digits.extend(chars.next());
                }
                out.push(char::from_u32(u32::from_str_radix(&digits, 8).ok()?)?);
            }
            'x' | 'u' | 'U' => {
                let width = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                if digits.len() != width {
                    return None;
                }
                out.push(char::from_u32(u32::from_str_radix(&digits, 16).ok()?)?);
            }
            'N' => return None,
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::parser::parse_python;

    fn first_value(expr: &str) -> Option<String> {
        let tree = parse_python(expr).unwrap();
        let statement = tree.root_node().named_child(0).unwrap();
        string_value(statement.named_child(0).unwrap(), expr)
    }

    #[test]
    fn test_string_value_decodes_literals() {
        assert_eq!(first_value("\"a\\n\\tb\"").as_deref(), Some("a\n\tb"));
        assert_eq!(first_value("'it\\'s \\x41\\u00e9'").as_deref(), Some("it's A\u{e9}"));
        assert_eq!(first_value("r\"\\d+\"").as_deref(), Some("\\d+"));
        assert_eq!(
            first_value("\"\"\"<p>\n  {{ x }}\n</p>\"\"\"").as_deref(),
            Some("<p>\n  {{ x }}\n</p>")
        );
        assert_eq!(first_value("\"<a>\" '</a>'").as_deref(), Some("<a></a>"));
        assert_eq!(first_value("\"line \\\ncontinued\"").as_deref(), Some("line continued"));
        assert_eq!(first_value("\"\\q\"").as_deref(), Some("\\q"));
    }

    #[test]
    fn test_string_value_rejects_dynamic_strings() {
        assert_eq!(first_value("f\"{x}\""), None);
        assert_eq!(first_value("b\"raw\""), None);
        assert_eq!(first_value("NAME"), None);
        assert_eq!(first_value("\"a\" + \"b\""), None);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("app"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("my-app"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_is_settings_name() {
        assert!(is_settings_name("DEBUG"));
        assert!(is_settings_name("A"));
        assert!(is_settings_name("SECRET_KEY_2"));
        assert!(!is_settings_name("app"));
        assert!(!is_settings_name("_HIDDEN"));
        assert!(!is_settings_name("Model"));
        assert!(!is_settings_name("__"));
    }

    #[test]
    fn test_strip_leading_slash() {
        assert_eq!(strip_leading_slash("\"/\""), "\"\"");
        assert_eq!(strip_leading_slash("'/count/'"), "'count/'");
        assert_eq!(strip_leading_slash("r\"/^x$\""), "r\"^x$\"");
        assert_eq!(strip_leading_slash("\"api/\""), "\"api/\"");
        assert_eq!(strip_leading_slash("PATTERN"), "PATTERN");
    }

    #[test]
    fn test_string_literal_value() {
        assert_eq!(string_literal_value("\"admin/\"").as_deref(), Some("admin/"));
        assert_eq!(string_literal_value("'x'").as_deref(), Some("x"));
        assert_eq!(string_literal_value("NAME"), None);
    }
}
