//! Change notes collected while correcting a document, and the pull-request
//! body rendered from them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::segment::{CorrectionUnit, top_level_blocks};

/// One block inside a note group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteBlock {
    Paragraph { text: String },
    /// A quoted aside; each entry is one top-level Markdown block.
    Quote { blocks: Vec<String> },
}

/// A small structured note; rendered as one list item of the PR body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteGroup(pub Vec<NoteBlock>);

impl NoteGroup {
    pub fn text(text: impl Into<String>) -> Self {
        NoteGroup(vec![NoteBlock::Paragraph { text: text.into() }])
    }

    /// "No changes" note for a unit that was left as it was.
    pub fn no_changes(unit: &CorrectionUnit) -> Self {
        Self::text(format!("No changes for {}", unit.label()))
    }

    /// Note for a rejected candidate. The candidate is split into the same
    /// top-level blocks the document uses and quoted.
    pub fn rejected_candidate(
        unit: &CorrectionUnit,
        attempt: u32,
        limit: u32,
        candidate: &str,
    ) -> Self {
        let blocks = top_level_blocks(candidate)
            .into_iter()
            .map(|b| candidate[b.range].to_string())
            .collect();
        NoteGroup(vec![
            NoteBlock::Paragraph {
                text: format!("retry {} of {} for {}", attempt, limit, unit.label()),
            },
            NoteBlock::Quote { blocks },
        ])
    }

    /// Render as a Markdown list item.
    fn render_list_item(&self, out: &mut String) {
        let mut first = true;
        for block in &self.0 {
            let lines: Vec<String> = match block {
                NoteBlock::Paragraph { text } => text.lines().map(str::to_string).collect(),
                NoteBlock::Quote { blocks } if blocks.is_empty() => {
                    vec!["> *(empty response)*".to_string()]
                }
                NoteBlock::Quote { blocks } => {
                    let mut lines = Vec::new();
                    for (i, b) in blocks.iter().enumerate() {
                        if i > 0 {
                            lines.push(">".to_string());
                        }
                        lines.extend(b.lines().map(|l| {
                            if l.is_empty() {
                                ">".to_string()
                            } else {
                                format!("> {}", l)
                            }
                        }));
                    }
                    lines
                }
            };

            if !first {
                out.push('\n');
            }
            for (i, line) in lines.iter().enumerate() {
                let prefix = if first && i == 0 { "- " } else { "  " };
                if line.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(prefix);
                    out.push_str(line);
                    out.push('\n');
                }
            }
            first = false;
        }
    }
}

/// Format a duration as `1 h 2 min 3 s`, leaving out zero parts.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = total / 60 % 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{} h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{} min", minutes));
    }
    if seconds > 0 {
        parts.push(format!("{} s", seconds));
    }
    if parts.is_empty() {
        "0 s".to_string()
    } else {
        parts.join(" ")
    }
}

/// Pull-request body: total time, then every note group as a list item.
pub fn render_pull_request_body(notes: &[NoteGroup], elapsed: Duration) -> String {
    let mut body = format!("Time needed: **{}**\n\nNotable:\n\n", format_duration(elapsed));
    if notes.is_empty() {
        body.push_str("- nothing to report\n");
        return body;
    }
    for (i, group) in notes.iter().enumerate() {
        if i > 0 {
            body.push('\n');
        }
        group.render_list_item(&mut body);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment;

    #[test]
    fn test_format_duration_parts() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0 s");
        assert_eq!(format_duration(Duration::from_millis(999)), "0 s");
        assert_eq!(format_duration(Duration::from_secs(59)), "59 s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1 min");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1 h 2 min 3 s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2 h");
    }

    #[test]
    fn test_no_changes_note_uses_document_order_label() {
        let units = segment("One.\n\nTwo.\n\nThree.\n");
        let note = NoteGroup::no_changes(&units[0]);
        assert_eq!(note, NoteGroup::text("No changes for part 3"));
    }

    #[test]
    fn test_rejected_candidate_quotes_parsed_blocks() {
        let units = segment("A long enough paragraph.\n");
        let note = NoteGroup::rejected_candidate(&units[0], 2, 10, "# Hi\n\nShort.\n");
        assert_eq!(
            note.0,
            vec![
                NoteBlock::Paragraph {
                    text: "retry 2 of 10 for part 1".to_string()
                },
                NoteBlock::Quote {
                    blocks: vec!["# Hi".to_string(), "Short.".to_string()]
                },
            ]
        );
    }

    #[test]
    fn test_note_group_json_shape() {
        let note = NoteGroup(vec![
            NoteBlock::Paragraph {
                text: "retry 1 of 10 for part 1".to_string(),
            },
            NoteBlock::Quote {
                blocks: vec!["x".to_string()],
            },
        ]);
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"type": "paragraph", "text": "retry 1 of 10 for part 1"},
                {"type": "quote", "blocks": ["x"]}
            ])
        );
    }

    #[test]
    fn test_render_body_lists_notes_with_quotes() {
        let notes = vec![
            NoteGroup::text("No changes for part 2"),
            NoteGroup(vec![
                NoteBlock::Paragraph {
                    text: "retry 1 of 10 for part 1".to_string(),
                },
                NoteBlock::Quote {
                    blocks: vec!["Short.".to_string(), "Also short.".to_string()],
                },
            ]),
        ];
        let body = render_pull_request_body(&notes, Duration::from_secs(65));
        assert_eq!(
            body,
            "Time needed: **1 min 5 s**\n\nNotable:\n\n\
             - No changes for part 2\n\n\
             - retry 1 of 10 for part 1\n\n  > Short.\n  >\n  > Also short.\n"
        );
    }

    #[test]
    fn test_render_body_empty_quote_and_no_notes() {
        let body = render_pull_request_body(&[], Duration::ZERO);
        assert!(body.contains("- nothing to report"));

        let notes = vec![NoteGroup(vec![
            NoteBlock::Paragraph {
                text: "retry 3 of 10 for part 1".to_string(),
            },
            NoteBlock::Quote { blocks: vec![] },
        ])];
        let body = render_pull_request_body(&notes, Duration::ZERO);
        assert!(body.contains("  > *(empty response)*"));
    }
}
