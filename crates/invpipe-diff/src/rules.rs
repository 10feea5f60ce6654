//! Static `field_path` → `(category, severity)` rule table, matched by
//! longest matching prefix (spec §4.4).

use crate::types::{Category, Severity};

/// One token of a compiled rule pattern.
enum Token {
    /// A literal path segment.
    Literal(String),
    /// `[*]` — matches exactly one path segment.
    Single,
    /// A trailing bare `*` — matches any number of remaining segments.
    Prefix,
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let raw: Vec<&str> = pattern.split('.').collect();
    let mut tokens = Vec::new();
    for (i, comp) in raw.iter().enumerate() {
        let is_last = i == raw.len() - 1;
        if *comp == "*" && is_last {
            tokens.push(Token::Prefix);
        } else if let Some(literal) = comp.strip_suffix("[*]") {
            tokens.push(Token::Literal(literal.to_string()));
            tokens.push(Token::Single);
        } else {
            tokens.push(Token::Literal(comp.to_string()));
        }
    }
    tokens
}

/// Matches `path` against `pattern`, returning the number of path segments
/// the pattern pins down exactly (used to pick the longest match).
fn match_specificity(pattern: &str, path_segs: &[&str]) -> Option<usize> {
    let tokens = tokenize(pattern);
    let mut pi = 0;
    let mut pinned = 0;

    for token in &tokens {
        match token {
            Token::Literal(lit) => {
                if pi >= path_segs.len() || path_segs[pi] != lit {
                    return None;
                }
                pi += 1;
                pinned += 1;
            }
            Token::Single => {
                if pi >= path_segs.len() {
                    return None;
                }
                pi += 1;
                pinned += 1;
            }
            Token::Prefix => {
                return Some(pinned);
            }
        }
    }

    if pi == path_segs.len() {
        Some(pinned)
    } else {
        None
    }
}

/// `(pattern, category, severity)`. Order doesn't matter; matching picks
/// the longest (most specific) match, not the first in this list.
const RULES: &[(&str, Category, Severity)] = &[
    ("os.release.*", Category::Os, Severity::Medium),
    ("networking.fqdn", Category::Network, Severity::High),
    ("networking.*", Category::Network, Severity::Medium),
    ("facts.cluster.fqdn", Category::Network, Severity::High),
    ("facts.cluster.public_ip", Category::Network, Severity::High),
    ("facts.modules[*].version", Category::Features, Severity::Medium),
    ("facts.nodes[*].version", Category::Os, Severity::High),
    ("hardware.*", Category::Hardware, Severity::Medium),
];

const DEFAULT_CATEGORY: Category = Category::Other;
const DEFAULT_SEVERITY: Severity = Severity::Low;

/// Classifies a `field_path` via the longest matching rule, falling back
/// to `other`/`low`.
pub fn classify(field_path: &str) -> (Category, Severity) {
    let path_segs: Vec<&str> = field_path.split('.').collect();

    let mut best: Option<(usize, Category, Severity)> = None;
    for (pattern, category, severity) in RULES {
        if let Some(specificity) = match_specificity(pattern, &path_segs) {
            if best.map(|(best_spec, ..)| specificity > best_spec).unwrap_or(true) {
                best = Some((specificity, *category, *severity));
            }
        }
    }

    best.map(|(_, category, severity)| (category, severity))
        .unwrap_or((DEFAULT_CATEGORY, DEFAULT_SEVERITY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_rule_wins() {
        assert_eq!(classify("networking.fqdn"), (Category::Network, Severity::High));
    }

    #[test]
    fn test_prefix_rule_matches_variable_depth() {
        assert_eq!(classify("os.release.major"), (Category::Os, Severity::Medium));
    }

    #[test]
    fn test_bracket_wildcard_rule() {
        assert_eq!(
            classify("facts.nodes.1.version"),
            (Category::Os, Severity::High)
        );
        assert_eq!(
            classify("facts.modules.mail.version"),
            (Category::Features, Severity::Medium)
        );
    }

    #[test]
    fn test_unmatched_path_falls_back_to_default() {
        assert_eq!(classify("facts.unknown.thing"), (Category::Other, Severity::Low));
    }

    #[test]
    fn test_longest_match_wins_over_shorter_prefix() {
        // "networking.*" and "networking.fqdn" both match "networking.fqdn";
        // the exact (more specific) rule should win.
        let (category, severity) = classify("networking.fqdn");
        assert_eq!(category, Category::Network);
        assert_eq!(severity, Severity::High);
    }
}
