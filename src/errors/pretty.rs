use crate::parser::ParseError;
use crate::CompileError;

pub fn underline(line: &str, column: usize) -> String {
    let marker: String = " ".repeat(column.saturating_sub(1));
    format!("{}\n{}^", line, marker)
}

/// Renders a parse error as `label:line:column: message` followed by the
/// offending source line with a caret under the column.
pub fn format_parse_error(label: &str, source: &str, err: &ParseError) -> String {
    let header = format!("{}:{}:{}: {}", label, err.line, err.column, err);
    match source.lines().nth(err.line.saturating_sub(1)) {
        Some(line) => format!("{}\n{}", header, underline(line, err.column)),
        None => header,
    }
}

pub fn format_compile_error(label: &str, source: &str, err: &CompileError) -> String {
    match err {
        CompileError::Syntax(parse) => format_parse_error(label, source, parse),
        other => format!("{}: {}", label, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_sits_under_column() {
        assert_eq!(underline("abc", 3), "abc\n  ^");
        assert_eq!(underline("abc", 0), "abc\n^");
    }

    #[test]
    fn parse_error_shows_source_line() {
        let err = ParseError {
            message: "unexpected token".to_string(),
            token: "')'".to_string(),
            line: 2,
            column: 5,
        };
        let rendered = format_parse_error("t.tn", "one = 1\ntwo )\n", &err);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with("t.tn:2:5: syntax error"));
        assert_eq!(lines[1], "two )");
        assert_eq!(lines[2], "    ^");
    }
}
