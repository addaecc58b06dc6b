//! Splits a Markdown document into correction units.
//!
//! The document is parsed with `pulldown-cmark` and its top-level blocks are
//! grouped so that every non-paragraph block (heading, list, quote, code, ...)
//! travels with the paragraph that follows it. Units are returned in
//! visitation order, which is *reverse* document order: the last unit of the
//! document is visited first.
//!
//! Reverse order is what keeps offsets usable across edits. Every unit that
//! has already been rewritten lies after every unit still pending, so the
//! pending units' offsets, computed once against the base-line text, stay
//! valid in the working copy no matter how much the rewritten spans grew or
//! shrank. Checkpoint indices therefore count in visitation order.

use std::ops::Range;

use pulldown_cmark::{Event, Options, Parser};

use crate::errors::SegmentError;

/// Structural kind of a top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A paragraph: the primary text the oracle corrects.
    Paragraph,
    /// Headings, lists, quotes, code, rules, tables, html.
    Context,
}

/// One top-level block of the document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Zero-based position among the document's top-level blocks.
    pub ordinal: usize,
    /// Byte range in the source, trailing whitespace excluded.
    pub range: Range<usize>,
}

/// A contiguous span of the document that is corrected as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionUnit {
    /// Position in visitation order.
    pub index: usize,
    /// Blocks covered by this unit, in document order. Context blocks first,
    /// the closing block last.
    pub blocks: Vec<Block>,
    pub start: usize,
    pub end: usize,
    /// Markdown source of `start..end`; this is what the oracle receives.
    pub text: String,
}

impl CorrectionUnit {
    /// Human-facing label in document order, e.g. `part 4` or `parts 2 to 4`.
    pub fn label(&self) -> String {
        let first = self.blocks.first().map(|b| b.ordinal + 1).unwrap_or(0);
        let last = self.blocks.last().map(|b| b.ordinal + 1).unwrap_or(0);
        if first == last {
            format!("part {}", first)
        } else {
            format!("parts {} to {}", first, last)
        }
    }

    /// Check that `document` still holds this unit's recorded text at its
    /// offsets; anything else means the document was edited outside the
    /// pipeline.
    pub fn verify(&self, document: &str) -> Result<(), SegmentError> {
        let current = document
            .get(self.start..self.end)
            .ok_or(SegmentError::OutOfBounds {
                unit: self.index,
                start: self.start,
                end: self.end,
                len: document.len(),
            })?;
        if current != self.text {
            return Err(SegmentError::Mismatch {
                unit: self.index,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Replace this unit's span in `document` with `replacement`.
    pub fn splice(&self, document: &str, replacement: &str) -> Result<String, SegmentError> {
        self.verify(document)?;
        let mut out =
            String::with_capacity(document.len() - (self.end - self.start) + replacement.len());
        out.push_str(&document[..self.start]);
        out.push_str(replacement);
        out.push_str(&document[self.end..]);
        Ok(out)
    }
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Top-level blocks of `text` in document order.
pub fn top_level_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(BlockKind, usize)> = None;

    let push = |kind: BlockKind, range: Range<usize>, blocks: &mut Vec<Block>| {
        let trimmed = text[range.clone()].trim_end().len();
        if trimmed == 0 {
            return;
        }
        blocks.push(Block {
            kind,
            ordinal: blocks.len(),
            range: range.start..range.start + trimmed,
        });
    };

    for (event, range) in Parser::new_ext(text, markdown_options()).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    let kind = if matches!(tag, pulldown_cmark::Tag::Paragraph) {
                        BlockKind::Paragraph
                    } else {
                        BlockKind::Context
                    };
                    open = Some((kind, range.start));
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0
                    && let Some((kind, start)) = open.take()
                {
                    push(kind, start..range.end, &mut blocks);
                }
            }
            _ if depth == 0 => push(BlockKind::Context, range, &mut blocks),
            _ => {}
        }
    }

    blocks
}

/// Split `text` into correction units in visitation order.
pub fn segment(text: &str) -> Vec<CorrectionUnit> {
    let blocks = top_level_blocks(text);
    let mut units = Vec::new();

    // Walk backwards: each unit ends at `last` and absorbs every context block
    // directly preceding it.
    let mut remaining = blocks.len();
    while remaining > 0 {
        let last = remaining - 1;
        let mut first = last;
        while first > 0 && blocks[first - 1].kind != BlockKind::Paragraph {
            first -= 1;
        }

        let start = blocks[first].range.start;
        let end = blocks[last].range.end;
        units.push(CorrectionUnit {
            index: units.len(),
            blocks: blocks[first..=last].to_vec(),
            start,
            end,
            text: text[start..end].to_string(),
        });
        remaining = first;
    }

    units
}
