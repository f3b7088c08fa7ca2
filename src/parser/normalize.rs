use anyhow::{bail, Result};
use serde::Deserialize;

/// Garbled tokens produced where the building name overlaps the "Room:" label
/// in the source catalog. Observed in the Fall 2024 document only.
const BUILTIN_FIXES: &[(&str, &str)] = &[
    ("BuiRloom:", "Building Room:"),
    (" oom:", " Building Room:"),
    ("BuildinRgoom:", "Building Room:"),
    ("R(oom:", "Building Room:"),
    ("(PharmacyR)oom:", "Building Room:"),
    ("ReseRaoom", "Building Room:"),
    ("HeaRloom", "Building Room:"),
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FixRule {
    pub from: String,
    pub to: String,
}

/// Ordered list of literal substring repairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRules {
    rules: Vec<FixRule>,
}

impl FixRules {
    /// Rejects rule lists where a second pass could find something new: an
    /// empty search or replacement text, or a replacement that overlaps any
    /// search text (contains it, sits inside it, or shares an edge with it).
    pub fn new(rules: Vec<FixRule>) -> Result<Self> {
        for rule in &rules {
            if rule.from.is_empty() {
                bail!("fix rule with empty search text (replacement {:?})", rule.to);
            }
            if rule.to.is_empty() {
                bail!("fix rule {:?} has an empty replacement", rule.from);
            }
        }
        for rule in &rules {
            if let Some(other) = rules.iter().find(|o| overlaps(&rule.to, &o.from)) {
                bail!(
                    "fix rule {:?} -> {:?} produces text matched by rule {:?}",
                    rule.from,
                    rule.to,
                    other.from
                );
            }
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Apply every rule, in order, to the whole page text.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            if out.contains(rule.from.as_str()) {
                out = out.replace(rule.from.as_str(), &rule.to);
            }
        }
        out
    }
}

/// True when `search` could match text that includes part of `output`.
fn overlaps(output: &str, search: &str) -> bool {
    if output.contains(search) || search.contains(output) {
        return true;
    }
    let suffix_starts_search =
        (1..output.len()).any(|n| output.is_char_boundary(n) && search.starts_with(&output[n..]));
    let search_ends_with_prefix =
        (1..search.len()).any(|n| search.is_char_boundary(n) && output.starts_with(&search[n..]));
    suffix_starts_search || search_ends_with_prefix
}

impl Default for FixRules {
    fn default() -> Self {
        Self {
            rules: BUILTIN_FIXES
                .iter()
                .map(|(from, to)| FixRule {
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(from: &str, to: &str) -> FixRule {
        FixRule {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn builtin_rules_pass_validation() {
        let builtin = FixRules::default();
        let rebuilt = FixRules::new(builtin.rules.clone()).unwrap();
        assert_eq!(rebuilt, builtin);
        assert_eq!(builtin.len(), BUILTIN_FIXES.len());
    }

    #[test]
    fn repairs_each_garbled_variant() {
        let fixes = FixRules::default();
        for (bad, _) in BUILTIN_FIXES {
            let text = format!("Bldg: X{} 101 Days: TR", bad);
            let fixed = fixes.apply(&text);
            assert!(!fixed.contains(bad), "{:?} survived in {:?}", bad, fixed);
            assert!(fixed.contains("Building Room:"), "{:?}", fixed);
        }
    }

    #[test]
    fn leaves_clean_labels_alone() {
        let text = "Bldg: Hamilton Room: 100 Days: MWF Time: 9:00-9:50";
        assert_eq!(FixRules::default().apply(text), text);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let text = std::fs::read_to_string("tests/fixtures/glitched_page.txt").unwrap();
        let fixes = FixRules::default();
        let once = fixes.apply(&text);
        assert_ne!(once, text);
        assert_eq!(fixes.apply(&once), once);
    }

    #[test]
    fn rules_apply_in_list_order() {
        let fixes = FixRules::new(vec![rule("ab", "x"), rule("abc", "y")]).unwrap();
        assert_eq!(fixes.apply("abc"), "xc");
    }

    #[test]
    fn rejects_rules_that_meet_at_a_replacement_edge() {
        // "cb" -> "ab" on the first pass, "x" on the second
        assert!(FixRules::new(vec![rule("ab", "x"), rule("c", "a")]).is_err());
        // replacement ends where a search text begins
        assert!(FixRules::new(vec![rule("q", "za"), rule("ab", "y")]).is_err());
        // replacement sits inside a longer search text
        assert!(FixRules::new(vec![rule("q", "b"), rule("abc", "y")]).is_err());
    }

    #[test]
    fn accepted_lists_are_stable_on_mixed_text() {
        let fixes = FixRules::new(vec![rule("ab", "x"), rule("cd", "y")]).unwrap();
        for text in ["cab", "acdb", "abcd", "ccdd", "aabb"] {
            let once = fixes.apply(text);
            assert_eq!(fixes.apply(&once), once, "{:?}", text);
        }
    }

    #[test]
    fn rejects_empty_replacement() {
        assert!(FixRules::new(vec![rule("x", "")]).is_err());
    }

    #[test]
    fn rejects_cascading_rules() {
        let err = FixRules::new(vec![rule("oom:", "Building Room:")]).unwrap_err();
        assert!(err.to_string().contains("produces text matched"));
    }

    #[test]
    fn rejects_empty_search_text() {
        assert!(FixRules::new(vec![rule("", "x")]).is_err());
    }
}
