//! Renders the rulebook into the ruleset text block injected into prompts.

use crate::store::{FeedbackEntry, FeedbackKind};

/// Renders feedback entries into the prompt-injectable ruleset block.
///
/// Empty input yields an empty string so callers can append the result
/// unconditionally. Non-empty input is prefixed with a blank line and the
/// header, one rule per line, in the order the entries were given.
pub fn render_ruleset(entries: &[FeedbackEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\nRules learned from feedback:");
    for entry in entries {
        out.push('\n');
        out.push_str(&render_rule(entry));
    }
    out
}

fn render_rule(entry: &FeedbackEntry) -> String {
    match entry.kind {
        FeedbackKind::Like => {
            format!(
                "\u{2713} The user likes responses like: \"{}\"",
                entry.original_content
            )
        }
        FeedbackKind::Dislike => {
            format!(
                "\u{2717} The user dislikes responses like: \"{}\"",
                entry.original_content
            )
        }
        FeedbackKind::Edit => {
            format!(
                "\u{1F4DD} The user prefers: \"{}\" instead of: \"{}\"",
                entry.new_content.as_deref().unwrap_or_default(),
                entry.original_content
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn entry(kind: FeedbackKind, original: &str, new: Option<&str>) -> FeedbackEntry {
        FeedbackEntry {
            id: "id".into(),
            user_id: "user-1".into(),
            chat_id: None,
            message_id: None,
            kind,
            original_content: original.into(),
            new_content: new.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_rulebook_renders_to_nothing() {
        assert_eq!(render_ruleset(&[]), "");
    }

    #[test]
    fn renders_each_kind_on_its_own_line() {
        let entries = vec![
            entry(FeedbackKind::Like, "concise answer", None),
            entry(FeedbackKind::Dislike, "rambling answer", None),
            entry(FeedbackKind::Edit, "old text", Some("new text")),
        ];
        let rendered = render_ruleset(&entries);

        assert!(rendered.starts_with("\n\nRules learned from feedback:\n"));
        assert!(rendered.contains("\u{2713} The user likes responses like: \"concise answer\""));
        assert!(rendered.contains("\u{2717} The user dislikes responses like: \"rambling answer\""));
        assert!(rendered.contains("\u{1F4DD} The user prefers: \"new text\" instead of: \"old text\""));
        assert_eq!(rendered.lines().count(), 3 + entries.len());
    }

    #[test]
    fn edit_without_replacement_renders_an_empty_preference() {
        let rendered = render_ruleset(&[entry(FeedbackKind::Edit, "old", None)]);
        assert!(rendered.contains("The user prefers: \"\" instead of: \"old\""));
    }

    proptest! {
        #[test]
        fn rendering_is_deterministic_and_ordered(
            contents in proptest::collection::vec("[a-z ]{1,20}", 1..10)
        ) {
            let entries: Vec<FeedbackEntry> = contents
                .iter()
                .map(|c| entry(FeedbackKind::Like, c, None))
                .collect();

            let a = render_ruleset(&entries);
            let b = render_ruleset(&entries);
            prop_assert_eq!(&a, &b);

            // One line per rule, in input order.
            let rule_lines: Vec<&str> =
                a.lines().skip(3).collect();
            prop_assert_eq!(rule_lines.len(), entries.len());
            for (line, content) in rule_lines.iter().zip(&contents) {
                prop_assert!(line.contains(content.as_str()));
            }
        }
    }
}
