//! PML annotation scanning.
//!
//! Contracts live in ordinary comments:
//!
//! ```text
//! # @requires b != 0
//! # @ensures result * b == a
//! # @invariant self.balance >= 0
//! ```
//!
//! Comments that do not carry a known keyword are ignored.

use super::common::{ClauseKind, ContractClauses};

/// A comment token with its 0-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentToken {
    /// 0-based row
    pub row: usize,
    /// 0-based column of the `#`
    pub column: usize,
    /// Comment text including the leading `#`
    pub text: String,
}

/// Recognise a single PML clause in a comment.
///
/// Accepts `#`, optional whitespace, `@keyword`, at least one whitespace
/// character, then a non-empty expression.
pub fn parse_clause(comment: &str) -> Option<(ClauseKind, String)> {
    let body = comment.trim_start().strip_prefix('#')?;
    let body = body.trim_start_matches('#').trim_start();
    let body = body.strip_prefix('@')?;

    let keyword_len = body
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(body.len());
    let (keyword, rest) = body.split_at(keyword_len);
    let kind = ClauseKind::from_keyword(keyword)?;

    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let expr = rest.trim();
    if expr.is_empty() {
        return None;
    }
    Some((kind, expr.to_string()))
}

/// Scan comment texts in order, collecting every clause found.
pub fn extract_clauses<'a, I>(comments: I) -> ContractClauses
where
    I: IntoIterator<Item = &'a str>,
{
    let mut clauses = ContractClauses::default();
    for comment in comments {
        if let Some((kind, expr)) = parse_clause(comment) {
            clauses.push(kind, expr);
        }
    }
    clauses
}

/// Collect the run of full-line comments directly above `first_row`.
///
/// Blank lines are skipped. The run ends at the first code line, or at a
/// comment indented deeper than `indent` (that comment closes the previous
/// block rather than introducing this definition).
pub fn leading_comment_lines<'a>(lines: &[&'a str], first_row: usize, indent: usize) -> Vec<&'a str> {
    let mut collected = Vec::new();
    let mut row = first_row;

    while row > 0 {
        row -= 1;
        let line = lines.get(row).copied().unwrap_or_default();
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            break;
        }
        if indentation(line) > indent {
            break;
        }
        collected.push(line);
    }

    collected.reverse();
    collected
}

/// Number of leading whitespace characters.
pub fn indentation(line: &str) -> usize {
    line.chars().take_while(|ch| ch.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_each_keyword() {
        assert_eq!(
            parse_clause("# @requires b != 0"),
            Some((ClauseKind::Requires, "b != 0".to_string()))
        );
        assert_eq!(
            parse_clause("    #@ensures   result >= lo  "),
            Some((ClauseKind::Ensures, "result >= lo".to_string()))
        );
        assert_eq!(
            parse_clause("## @invariant self.balance >= 0"),
            Some((ClauseKind::Invariant, "self.balance >= 0".to_string()))
        );
    }

    #[test]
    fn ignores_unknown_or_malformed_annotations() {
        assert_eq!(parse_clause("# @assumes x > 0"), None);
        assert_eq!(parse_clause("# @requires"), None);
        assert_eq!(parse_clause("# @requires   "), None);
        assert_eq!(parse_clause("# @requiresx > 0"), None);
        assert_eq!(parse_clause("# note: @requires x > 0"), None);
        assert_eq!(parse_clause("x = 1"), None);
    }

    #[test]
    fn extract_preserves_order_per_kind() {
        let comments = [
            "# @ensures result >= 0",
            "# plain comment",
            "# @requires x >= 0",
            "# @ensures result <= x",
        ];
        let clauses = extract_clauses(comments);
        assert_eq!(clauses.requires, vec!["x >= 0"]);
        assert_eq!(clauses.ensures, vec!["result >= 0", "result <= x"]);
        assert!(clauses.invariants.is_empty());
    }

    #[test]
    fn leading_run_skips_blank_lines_and_stops_at_code() {
        let source = "x = 1\n# header\n# @requires a > 0\n\n# @ensures result > 0\n\ndef f(a):\n    return a\n";
        let lines: Vec<&str> = source.lines().collect();
        let run = leading_comment_lines(&lines, 6, 0);
        assert_eq!(
            run,
            vec!["# header", "# @requires a > 0", "# @ensures result > 0"]
        );
    }

    #[test]
    fn leading_run_ignores_deeper_indented_comments() {
        let source = "def g():\n    return 1\n    # @ensures result == 1\n\n# @requires x > 0\ndef f(x):\n    return x\n";
        let lines: Vec<&str> = source.lines().collect();
        let run = leading_comment_lines(&lines, 5, 0);
        assert_eq!(run, vec!["# @requires x > 0"]);
    }
}
