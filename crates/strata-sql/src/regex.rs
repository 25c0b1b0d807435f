//! Translation of query regular expressions into PostgreSQL regex literals.
//!
//! Patterns may quote literal text with `\Q...\E`. PostgreSQL has no such
//! syntax, so quoted spans are expanded into escaped characters. The result
//! is bound as a parameter.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Ordinary regex syntax.
    Pattern,

    /// Inside `\Q...\E`: every character is literal.
    Quoted,
}

/// Expands `\Q...\E` spans into escaped characters.
pub fn literalize(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut state = State::Pattern;

    while let Some(c) = chars.next() {
        match (state, c) {
            (_, '\\') if chars.peek() == Some(&'E') => {
                chars.next();
                state = State::Pattern;
            }
            (State::Pattern, '\\') => match chars.next() {
                Some('Q') => state = State::Quoted,
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => out.push('\\'),
            },
            (State::Pattern, c) => out.push(c),
            (State::Quoted, c) => push_literal(&mut out, c),
        }
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c.is_alphabetic() || c.is_ascii_digit() || c == ' ' || c == '\'' {
        out.push(c);
    } else {
        out.push('\\');
        out.push(c);
    }
}

/// Applies the `x` option: drops unescaped whitespace and `#` comments.
pub fn strip_extended(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '#' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }

    out
}

/// `true` for `^\Q...\E` patterns, the form prefix matches are sent as.
pub fn is_starts_with(pattern: &str) -> bool {
    pattern
        .strip_prefix("^\\Q")
        .is_some_and(|rest| rest.contains("\\E"))
}

/// Rewrites a starts-with pattern into a `LIKE` prefix pattern.
///
/// Characters the literal lexer escapes stay backslash-escaped, which `LIKE`
/// treats as literal.
pub fn starts_with_to_like(pattern: &str) -> String {
    let literal = literalize(pattern);
    let prefix = literal.strip_prefix('^').unwrap_or(&literal);
    format!("{prefix}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_span_is_escaped() {
        assert_eq!(literalize("^\\Qa.b*c\\E"), "^a\\.b\\*c");
        assert_eq!(literalize("\\Qit's\\E$"), "it's$");
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        assert_eq!(literalize("x\\Q(y)"), "x\\(y\\)");
    }

    #[test]
    fn plain_pattern_passes_through() {
        assert_eq!(literalize("^[a-z]+\\d$"), "^[a-z]+\\d$");
        assert_eq!(literalize("o'clock"), "o'clock");
    }

    #[test]
    fn extended_mode() {
        assert_eq!(strip_extended("a b # comment\n c\\ d"), "abc\\ d");
    }

    #[test]
    fn starts_with() {
        assert!(is_starts_with("^\\Qabc\\E"));
        assert!(!is_starts_with("^abc"));
        assert_eq!(starts_with_to_like("^\\Qa_b\\E"), "a\\_b%");
    }
}
