//! Heading-driven section segmenter.
//!
//! Turns extracted text into an ordered list of titled, size-bounded
//! [`SectionDraft`]s without relying on any structure from the source file.
//! Three passes run over the sanitized text:
//!
//! 1. **Heading split**: lines that look like headings (structural keyword,
//!    numeric outline marker, or all-caps) open a new draft.
//! 2. **Merge**: drafts shorter than `min_chars` are folded into the
//!    preceding section, with their heading kept inline as a sub-heading.
//! 3. **Split**: sections longer than `max_chars` are cut at paragraph
//!    boundaries (`\n\n`) into the fewest chunks that fit.
//!
//! Heading detection is deliberately permissive; the merge pass absorbs the
//! false positives. Lengths are counted in characters, not bytes.
//!
//! Any non-blank input yields sections with non-empty content. A document
//! shorter than `min_chars` becomes one section holding all of its text, and
//! a lone heading with no body keeps the heading as its content.
//!
//! [`build_sections`] turns the final drafts into rows with contiguous order
//! indices and a SHA-256 content hash for change detection.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::config::SegmentConfig;
use crate::models::{NewDocumentSection, SectionDraft};

/// Separator used when merged headings are joined.
pub const HEADING_JOINER: &str = " / ";

const TRAILING_PUNCTUATION: &[char] = &[':', '.', ';', ',', '-', '–', '—'];

fn outline_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(?:\.\d+)*\.?(?:\s|$)").expect("valid outline regex"))
}

/// Segment `raw_text` with the given rules. Pure and deterministic.
pub fn segment(raw_text: &str, fallback_title: &str, config: &SegmentConfig) -> Vec<SectionDraft> {
    Segmenter::new(config).segment(raw_text, fallback_title)
}

/// Reusable segmenter holding pre-lowercased keywords.
pub struct Segmenter {
    keywords: Vec<String>,
    min_chars: usize,
    max_chars: usize,
    max_heading_chars: usize,
}

impl Segmenter {
    pub fn new(config: &SegmentConfig) -> Self {
        Self {
            keywords: config
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            min_chars: config.min_chars,
            max_chars: config.max_chars.max(1),
            max_heading_chars: config.max_heading_chars,
        }
    }

    pub fn segment(&self, raw_text: &str, fallback_title: &str) -> Vec<SectionDraft> {
        let fallback_title = if fallback_title.trim().is_empty() {
            "Untitled"
        } else {
            fallback_title.trim()
        };

        let text = sanitize(raw_text);
        let drafts = self.split_on_headings(&text, fallback_title);
        let mut merged = merge_undersized(drafts, self.min_chars);

        if !text.is_empty() {
            // A document under the minimum stays whole, heading lines included.
            if merged.len() == 1 && text.chars().count() < self.min_chars {
                merged[0].content = text.clone();
            }
            for draft in merged.iter_mut().filter(|d| d.content.is_empty()) {
                draft.content = draft.heading.clone();
            }
        }

        let mut sections = Vec::with_capacity(merged.len());
        for draft in merged {
            sections.extend(split_oversized(draft, self.min_chars, self.max_chars));
        }

        if sections.is_empty() {
            sections.push(SectionDraft::new(fallback_title, text));
        }
        sections
    }

    /// Returns the heading text if `line` looks like a heading.
    pub fn detect_heading(&self, line: &str) -> Option<String> {
        let candidate = line.trim().trim_end_matches(TRAILING_PUNCTUATION).trim_end();
        if candidate.is_empty() || candidate.chars().count() > self.max_heading_chars {
            return None;
        }

        if self.starts_with_keyword(candidate)
            || outline_marker().is_match(candidate)
            || is_all_caps(candidate)
        {
            Some(candidate.to_string())
        } else {
            None
        }
    }

    fn starts_with_keyword(&self, candidate: &str) -> bool {
        let lower = candidate.to_lowercase();
        self.keywords.iter().any(|kw| {
            lower.starts_with(kw.as_str())
                && lower[kw.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !c.is_alphanumeric())
        })
    }

    fn split_on_headings(&self, text: &str, fallback_title: &str) -> Vec<SectionDraft> {
        let mut drafts = Vec::new();
        let mut heading: Option<String> = None;
        let mut lines: Vec<&str> = Vec::new();

        for line in text.split('\n') {
            if let Some(found) = self.detect_heading(line) {
                flush_draft(&mut drafts, heading.take(), &mut lines, fallback_title);
                heading = Some(found);
            } else {
                lines.push(line);
            }
        }
        flush_draft(&mut drafts, heading, &mut lines, fallback_title);

        if drafts.is_empty() {
            drafts.push(SectionDraft::new(fallback_title, text));
        }
        drafts
    }
}

fn flush_draft(
    drafts: &mut Vec<SectionDraft>,
    heading: Option<String>,
    lines: &mut Vec<&str>,
    fallback_title: &str,
) {
    let content = lines.join("\n").trim().to_string();
    lines.clear();
    match heading {
        Some(h) => drafts.push(SectionDraft::new(h, content)),
        // Preamble before the first heading.
        None if !content.is_empty() => drafts.push(SectionDraft::new(fallback_title, content)),
        None => {}
    }
}

fn is_all_caps(candidate: &str) -> bool {
    candidate.chars().count() >= 3
        && candidate.chars().any(char::is_alphabetic)
        && candidate
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase)
}

/// Normalize whitespace: unify line endings, collapse runs of spaces inside
/// lines, and collapse runs of blank lines to a single paragraph break.
pub fn sanitize(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    let mut pending_break = false;

    for line in normalized.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            pending_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_break { "\n\n" } else { "\n" });
        }
        pending_break = false;
        out.push_str(&collapsed);
    }
    out
}

/// Fold drafts shorter than `min_chars` into the previous accepted section.
///
/// The first draft has nothing before it; if it is still undersized after
/// the walk it is folded forward into the second section instead.
pub fn merge_undersized(drafts: Vec<SectionDraft>, min_chars: usize) -> Vec<SectionDraft> {
    let mut accepted: Vec<SectionDraft> = Vec::with_capacity(drafts.len());

    for draft in drafts {
        match accepted.last_mut() {
            Some(prev) if draft.len() < min_chars => {
                prev.heading = join_headings(&prev.heading, &draft.heading);
                append_block(&mut prev.content, &inline_block(&draft));
            }
            _ => accepted.push(draft),
        }
    }

    if accepted.len() > 1 && accepted[0].len() < min_chars {
        let first = accepted.remove(0);
        let next = &mut accepted[0];
        let mut content = first.content;
        append_block(&mut content, &inline_block(next));
        next.heading = join_headings(&first.heading, &next.heading);
        next.content = content;
    }

    accepted
}

fn join_headings(a: &str, b: &str) -> String {
    format!("{}{}{}", a, HEADING_JOINER, b)
}

/// A draft rendered as an inline sub-heading followed by its content.
fn inline_block(draft: &SectionDraft) -> String {
    if draft.content.is_empty() {
        draft.heading.clone()
    } else {
        format!("{}\n{}", draft.heading, draft.content)
    }
}

fn append_block(content: &mut String, block: &str) {
    if !content.is_empty() {
        content.push_str("\n\n");
    }
    content.push_str(block);
}

/// Split a section longer than `max_chars` at paragraph boundaries.
///
/// Paragraphs are packed greedily, so the chunk count is the minimum that
/// fits. A trailing chunk shorter than `min_chars` borrows paragraphs from
/// its predecessor when both stay in bounds. A single paragraph above the
/// limit is emitted whole.
pub fn split_oversized(draft: SectionDraft, min_chars: usize, max_chars: usize) -> Vec<SectionDraft> {
    if draft.len() <= max_chars {
        return vec![draft];
    }

    let paragraphs: Vec<&str> = draft
        .content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let lens: Vec<usize> = paragraphs.iter().map(|p| p.chars().count()).collect();

    let mut ranges = pack_paragraphs(&lens, max_chars);
    rebalance(&mut ranges, &lens, min_chars, max_chars);

    if ranges.len() <= 1 {
        return vec![draft];
    }

    ranges
        .iter()
        .enumerate()
        .map(|(i, &(start, end))| {
            let heading = if i == 0 {
                draft.heading.clone()
            } else {
                format!("{} (part {})", draft.heading, i + 1)
            };
            SectionDraft::new(heading, paragraphs[start..end].join("\n\n"))
        })
        .collect()
}

/// Length of paragraphs `start..end` joined by blank lines.
fn span_len(lens: &[usize], start: usize, end: usize) -> usize {
    if start >= end {
        return 0;
    }
    lens[start..end].iter().sum::<usize>() + 2 * (end - start - 1)
}

fn pack_paragraphs(lens: &[usize], max_chars: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    if lens.is_empty() {
        return ranges;
    }

    let mut start = 0;
    let mut current = lens[0];
    for (i, &len) in lens.iter().enumerate().skip(1) {
        if current + 2 + len <= max_chars {
            current += 2 + len;
        } else {
            ranges.push((start, i));
            start = i;
            current = len;
        }
    }
    ranges.push((start, lens.len()));
    ranges
}

fn rebalance(ranges: &mut [(usize, usize)], lens: &[usize], min_chars: usize, max_chars: usize) {
    for i in 1..ranges.len() {
        loop {
            let (prev_start, prev_end) = ranges[i - 1];
            let (cur_start, cur_end) = ranges[i];
            if span_len(lens, cur_start, cur_end) >= min_chars || prev_end - prev_start <= 1 {
                break;
            }
            let new_prev = span_len(lens, prev_start, prev_end - 1);
            let new_cur = span_len(lens, cur_start - 1, cur_end);
            if new_cur > max_chars || new_prev < min_chars {
                break;
            }
            ranges[i - 1].1 -= 1;
            ranges[i].0 -= 1;
        }
    }
}

/// Turn final drafts into rows: contiguous order indices, headings truncated
/// to `heading_chars`, and a SHA-256 hash of each section's content.
pub fn build_sections(drafts: &[SectionDraft], heading_chars: usize) -> Vec<NewDocumentSection> {
    drafts
        .iter()
        .enumerate()
        .map(|(i, d)| NewDocumentSection {
            order_index: i as i64,
            heading: d.heading.chars().take(heading_chars).collect(),
            content: d.content.clone(),
            content_hash: content_hash(&d.content),
        })
        .collect()
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min: usize, max: usize) -> SegmentConfig {
        SegmentConfig::with_bounds(min, max)
    }

    fn paragraph(seed: usize, len: usize) -> String {
        let base = format!("Paragraph {} talks about cell membranes and osmosis. ", seed);
        base.chars().cycle().take(len).collect::<String>().trim().to_string()
    }

    #[test]
    fn sanitize_collapses_whitespace_and_blank_runs() {
        let raw = "  Hello\t\tworld  \r\n\r\n\r\n\r\nnext   line\rlast ";
        assert_eq!(sanitize(raw), "Hello world\n\nnext line\nlast");
    }

    #[test]
    fn detects_keyword_outline_and_caps_headings() {
        let s = Segmenter::new(&SegmentConfig::default());
        assert_eq!(s.detect_heading("Chapter 3: Cells").as_deref(), Some("Chapter 3: Cells"));
        assert_eq!(s.detect_heading("Lesson one:").as_deref(), Some("Lesson one"));
        assert_eq!(s.detect_heading("Capítulo 2").as_deref(), Some("Capítulo 2"));
        assert_eq!(s.detect_heading("1.2 Methods").as_deref(), Some("1.2 Methods"));
        assert_eq!(s.detect_heading("3.4.5").as_deref(), Some("3.4.5"));
        assert_eq!(s.detect_heading("INTRODUCTION.").as_deref(), Some("INTRODUCTION"));
        assert_eq!(s.detect_heading("DNA AND RNA").as_deref(), Some("DNA AND RNA"));
    }

    #[test]
    fn rejects_ordinary_lines() {
        let s = Segmenter::new(&SegmentConfig::default());
        assert!(s.detect_heading("Particles move faster when heated.").is_none());
        assert!(s.detect_heading("Sections of the membrane").is_none());
        assert!(s.detect_heading("Sectioning is hard").is_none());
        assert!(s.detect_heading("The cell is the unit of life.").is_none());
        assert!(s.detect_heading("AB").is_none());
        assert!(s.detect_heading("---").is_none());
        assert!(s.detect_heading("1.5x faster than before").is_none());
        let long = "A".repeat(200);
        assert!(s.detect_heading(&long).is_none());
    }

    #[test]
    fn no_headings_yields_single_fallback_section() {
        let text = "just some notes without structure.\nanother line here.";
        let sections = segment(text, "My Notes", &config(10, 1000));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "My Notes");
        assert_eq!(sections[0].content, text);
    }

    #[test]
    fn empty_input_yields_one_empty_section() {
        let sections = segment("   \n\n  ", "Doc", &config(10, 100));
        assert_eq!(sections.len(), 1);
        assert!(sections[0].is_empty());
    }

    #[test]
    fn preamble_gets_fallback_title() {
        let text = format!(
            "{}\n\nCHAPTER ONE\n{}",
            paragraph(1, 80),
            paragraph(2, 80)
        );
        let sections = segment(&text, "Biology", &config(50, 1000));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, "Biology");
        assert_eq!(sections[1].heading, "CHAPTER ONE");
    }

    #[test]
    fn merge_folds_short_section_into_previous() {
        let drafts = vec![
            SectionDraft::new("Intro", paragraph(1, 120)),
            SectionDraft::new("Aside", "short note"),
            SectionDraft::new("Body", paragraph(2, 120)),
        ];
        let merged = merge_undersized(drafts, 50);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].heading, "Intro / Aside");
        assert!(merged[0].content.ends_with("\n\nAside\nshort note"));
        assert!(merged[0].content.starts_with(&paragraph(1, 120)));
        assert_eq!(merged[1].heading, "Body");
    }

    #[test]
    fn merge_folds_short_opening_section_forward() {
        let drafts = vec![
            SectionDraft::new("CHAPTER 1", "Intro text."),
            SectionDraft::new("CHAPTER 2", paragraph(2, 120)),
        ];
        let merged = merge_undersized(drafts, 50);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].heading, "CHAPTER 1 / CHAPTER 2");
        assert_eq!(
            merged[0].content,
            format!("Intro text.\n\nCHAPTER 2\n{}", paragraph(2, 120))
        );
    }

    #[test]
    fn merge_keeps_everything_when_all_tiny() {
        let drafts = vec![
            SectionDraft::new("A", "x"),
            SectionDraft::new("B", "y"),
            SectionDraft::new("C", ""),
        ];
        let merged = merge_undersized(drafts, 50);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].heading, "A / B / C");
        assert_eq!(merged[0].content, "x\n\nB\ny\n\nC");
    }

    #[test]
    fn split_reconstructs_content_exactly() {
        let paragraphs: Vec<String> = (0..9).map(|i| paragraph(i, 60 + (i * 7) % 40)).collect();
        let content = paragraphs.join("\n\n");
        let draft = SectionDraft::new("Big", content.clone());

        let parts = split_oversized(draft, 50, 200);
        assert!(parts.len() >= 2);
        for p in &parts {
            assert!(p.len() <= 200, "part too long: {}", p.len());
        }
        let rebuilt = parts
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(rebuilt, content);
        assert_eq!(parts[0].heading, "Big");
        assert_eq!(parts[1].heading, "Big (part 2)");
    }

    #[test]
    fn split_keeps_pathological_paragraph_whole() {
        let huge = paragraph(1, 500);
        let parts = split_oversized(SectionDraft::new("H", huge.clone()), 50, 200);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content, huge);
    }

    #[test]
    fn split_isolates_oversized_paragraph_between_normal_ones() {
        let content = [paragraph(1, 100), paragraph(2, 450), paragraph(3, 100)].join("\n\n");
        let parts = split_oversized(SectionDraft::new("H", content), 50, 200);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].content, paragraph(2, 450));
    }

    #[test]
    fn trailing_chunk_borrows_from_predecessor() {
        // Greedy packing would leave a 20-char tail.
        let content = [paragraph(1, 60), paragraph(2, 60), paragraph(3, 60), paragraph(4, 20)]
            .join("\n\n");
        let parts = split_oversized(SectionDraft::new("H", content.clone()), 50, 200);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.len() >= 50 && p.len() <= 200));
        let rebuilt = parts
            .iter()
            .map(|p| p.content.clone())
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn chapter_scenario_merges_and_splits() {
        let deep: Vec<String> = (0..6)
            .map(|i| format!("Deep dive text repeated to exceed maxChars, take {} of six.", i))
            .collect();
        let text = format!("CHAPTER 1\nIntro text.\n\nCHAPTER 2\n{}", deep.join("\n\n"));

        let sections = segment(&text, "Doc", &config(50, 200));
        assert!(sections.len() >= 2);
        assert!(sections.iter().all(|s| s.len() <= 200));
        assert!(sections.iter().all(|s| s.heading != "CHAPTER 1"));
        assert!(sections[0].content.starts_with("Intro text."));

        let rows = build_sections(&sections, 200);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.order_index, i as i64);
        }
    }

    #[test]
    fn sections_respect_bounds_for_structured_input() {
        let mut text = String::new();
        for chapter in 0..8 {
            text.push_str(&format!("SECTION {}\n", chapter));
            let paras = 1 + chapter % 4;
            for p in 0..paras {
                text.push_str(&paragraph(chapter * 10 + p, 70 + (p * 13) % 50));
                text.push_str("\n\n");
            }
        }
        let sections = segment(&text, "Doc", &config(60, 300));
        assert!(!sections.is_empty());
        for s in &sections {
            assert!(!s.is_empty());
            assert!(s.len() >= 60 && s.len() <= 300, "len {} for {}", s.len(), s.heading);
        }
    }

    #[test]
    fn tiny_document_is_single_section() {
        let sections = segment("HELLO\nworld", "Doc", &config(50, 200));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "HELLO");
        assert_eq!(sections[0].content, "HELLO\nworld");
    }

    #[test]
    fn lone_heading_becomes_its_own_content() {
        let sections = segment("CHAPTER 1", "Doc", &config(50, 200));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "CHAPTER 1");
        assert_eq!(sections[0].content, "CHAPTER 1");

        let title = "CHAPTER 1 THE STRUCTURE AND FUNCTION OF THE EUKARYOTIC CELL";
        let sections = segment(title, "Doc", &config(50, 200));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, title);
    }

    #[test]
    fn every_nonblank_input_yields_nonempty_sections() {
        let long_body: Vec<String> = (0..6).map(|i| paragraph(i, 70)).collect();
        let inputs = vec![
            "CHAPTER 1".to_string(),
            "INTRODUCTION TO CELL BIOLOGY".to_string(),
            "ONE\nTWO\nTHREE\nFOUR".to_string(),
            format!("CHAPTER 1\nCHAPTER 2\nCHAPTER 3\n{}", paragraph(9, 120)),
            "1. Cells\n2. Tissues\n\n3. Organs".to_string(),
            "just prose, nothing else".to_string(),
            format!("CHAPTER 1\n{}\n\nAPPENDIX", long_body.join("\n\n")),
            format!("{}\n\nSUMMARY:\nLESSON 4", paragraph(3, 90)),
            "CHAPTER 1 THE STRUCTURE AND FUNCTION OF THE EUKARYOTIC CELL".to_string(),
        ];

        for input in &inputs {
            let sections = segment(input, "Doc", &config(50, 200));
            assert!(!sections.is_empty(), "no sections for {:?}", input);
            for s in &sections {
                assert!(!s.is_empty(), "empty section {:?} for {:?}", s.heading, input);
            }

            let rows = build_sections(&sections, 200);
            for (i, row) in rows.iter().enumerate() {
                assert_eq!(row.order_index, i as i64);
            }

            for word in input.split_whitespace() {
                let word = word.trim_end_matches(TRAILING_PUNCTUATION);
                if word.is_empty() {
                    continue;
                }
                assert!(
                    sections
                        .iter()
                        .any(|s| s.heading.contains(word) || s.content.contains(word)),
                    "lost {:?} from {:?}",
                    word,
                    input
                );
            }
        }
    }

    #[test]
    fn segmentation_is_deterministic() {
        let text = "CHAPTER 1\nalpha beta\n\nCHAPTER 2\ngamma delta epsilon";
        assert_eq!(
            segment(text, "Doc", &config(5, 100)),
            segment(text, "Doc", &config(5, 100))
        );
    }

    #[test]
    fn build_sections_truncates_headings_and_hashes() {
        let drafts = vec![
            SectionDraft::new("Ünïcödé heading that is long", "body one"),
            SectionDraft::new("Two", "body two"),
        ];
        let rows = build_sections(&drafts, 7);
        assert_eq!(rows[0].heading, "Ünïcödé");
        assert_eq!(rows[1].order_index, 1);
        assert_eq!(rows[0].content_hash, content_hash("body one"));
        assert_ne!(rows[0].content_hash, rows[1].content_hash);
        assert_eq!(rows[0].content_hash.len(), 64);
    }
}
