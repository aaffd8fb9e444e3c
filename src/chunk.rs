//! Source file chunker.
//!
//! Splits a file's text into [`Chunk`]s bounded by `max_chars` and
//! `max_lines`. For languages with a bundled tree-sitter grammar, chunk
//! boundaries fall between syntax nodes: top-level items are packed
//! greedily and any node too large for one chunk is descended into. Other
//! known languages are packed line by line. A single unit that still
//! exceeds the budget is hard-sliced at a newline, space or character
//! boundary.
//!
//! Files whose extension is not in the [language table](crate::language)
//! produce no chunks.

use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::config::ChunkingConfig;
use crate::error::AnalysisError;
use crate::language::Language;
use crate::models::Chunk;

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_lines: usize,
    max_chars: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            max_lines: config.max_lines.max(1),
            max_chars: config.max_chars.max(1),
        }
    }

    /// Read and split a file. Unknown file types yield an empty sequence;
    /// an unreadable file is an error.
    pub fn split(
        &self,
        path: &Path,
        language_hint: Option<Language>,
    ) -> Result<Vec<Chunk>, AnalysisError> {
        let Some(language) = language_hint.or_else(|| Language::from_path(path)) else {
            debug!(path = %path.display(), "unsupported file type, skipping");
            return Ok(Vec::new());
        };

        let bytes = std::fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let chunks = self.split_text(path, &text, language);
        debug!(
            path = %path.display(),
            language = language.as_str(),
            chunks = chunks.len(),
            "split file"
        );
        Ok(chunks)
    }

    /// Split already-loaded text. Indices are contiguous from 0.
    pub fn split_text(&self, path: &Path, text: &str, language: Language) -> Vec<Chunk> {
        let segments = match language.grammar().and_then(|g| parse(text, &g)) {
            Some(tree) => {
                let mut segments = Vec::new();
                self.syntax_segments(tree.root_node(), text, &mut segments);
                segments
            }
            None => line_segments(text),
        };

        let lines = LineIndex::new(text);
        self.pack(text, &segments)
            .into_iter()
            .filter_map(|range| {
                let slice = &text[range.clone()];
                let body = slice.trim();
                if body.is_empty() {
                    return None;
                }
                let start = range.start + (slice.len() - slice.trim_start().len());
                let end = start + body.len();
                Some((body, lines.line_of(start), lines.line_of(end - 1)))
            })
            .enumerate()
            .map(|(index, (body, start_line, end_line))| Chunk {
                source_text: body.to_string(),
                sequence_index: index,
                origin_file: path.to_path_buf(),
                start_line,
                end_line,
            })
            .collect()
    }

    fn fits(&self, text: &str, range: Range<usize>) -> bool {
        range.len() <= self.max_chars && text[range].lines().count() <= self.max_lines
    }

    /// Collect the byte ranges of the largest nodes that fit the budget,
    /// in source order. Leaves that do not fit are kept whole and sliced
    /// later.
    fn syntax_segments(&self, node: tree_sitter::Node, text: &str, out: &mut Vec<Range<usize>>) {
        if node.child_count() == 0 || self.fits(text, node.byte_range()) {
            out.push(node.byte_range());
            return;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.syntax_segments(child, text, out);
        }
    }

    /// Greedily pack consecutive segments (and the text between them)
    /// into ranges that fit the budget. The ranges cover the whole text.
    fn pack(&self, text: &str, segments: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut end = 0;

        for seg in segments {
            if seg.end <= end {
                continue;
            }
            if self.fits(text, start..seg.end) {
                end = seg.end;
                continue;
            }
            if end > start {
                out.push(start..end);
                start = end;
            }
            if self.fits(text, start..seg.end) {
                end = seg.end;
            } else {
                self.slice(text, start..seg.end, &mut out);
                start = seg.end;
                end = seg.end;
            }
        }

        if start < text.len() {
            if self.fits(text, start..text.len()) {
                out.push(start..text.len());
            } else {
                if end > start {
                    out.push(start..end);
                }
                self.slice(text, end..text.len(), &mut out);
            }
        }
        out
    }

    /// Hard-split an oversized range, preferring newline then space
    /// boundaries.
    fn slice(&self, text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
        let mut pos = range.start;
        while pos < range.end {
            let mut cut = (pos + self.max_chars).min(range.end);
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            if let Some((i, _)) = text[pos..cut].match_indices('\n').nth(self.max_lines - 1) {
                cut = pos + i + 1;
            }
            if cut < range.end {
                let window = &text[pos..cut];
                if let Some(p) = window
                    .rfind('\n')
                    .or_else(|| window.rfind(' '))
                    .map(|p| pos + p + 1)
                {
                    cut = p;
                }
            }
            if cut <= pos {
                cut = pos + text[pos..].chars().next().map_or(1, char::len_utf8);
            }
            out.push(pos..cut);
            pos = cut;
        }
    }
}

fn parse(text: &str, grammar: &tree_sitter::Language) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    if let Err(e) = parser.set_language(grammar) {
        debug!(error = %e, "grammar rejected, falling back to line packing");
        return None;
    }
    parser.parse(text, None)
}

fn line_segments(text: &str) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices('\n') {
        segments.push(start..i + 1);
        start = i + 1;
    }
    if start < text.len() {
        segments.push(start..text.len());
    }
    segments
}

/// Byte offset → 1-based line number.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        Self {
            newlines: text.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    fn line_of(&self, byte: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < byte) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunker(max_lines: usize, max_chars: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_lines,
            max_chars,
        })
    }

    const RUST_SRC: &str = "fn alpha() {\n    let a = 1;\n}\n\nfn beta() {\n    let b = 2;\n}\n\nfn gamma() {\n    let c = 3;\n}\n";

    #[test]
    fn test_small_file_single_chunk() {
        let chunks = chunker(1000, 6000).split_text(Path::new("lib.rs"), RUST_SRC, Language::Rust);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 11);
        assert_eq!(chunks[0].source_text, RUST_SRC.trim());
    }

    #[test]
    fn test_rust_chunks_align_to_items() {
        let chunks = chunker(1000, 40).split_text(Path::new("lib.rs"), RUST_SRC, Language::Rust);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].source_text.starts_with("fn alpha"));
        assert!(chunks[1].source_text.starts_with("fn beta"));
        assert!(chunks[2].source_text.starts_with("fn gamma"));
        assert_eq!(chunks[1].start_line, 5);
        for c in &chunks {
            assert!(c.source_text.ends_with('}'));
            assert!(c.source_text.len() <= 40);
        }
    }

    #[test]
    fn test_line_packing_respects_max_lines() {
        let text = (1..=10)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunker(3, 6000).split_text(Path::new("main.go"), &text, Language::Go);
        assert_eq!(chunks.len(), 4);
        let starts: Vec<usize> = chunks.iter().map(|c| c.start_line).collect();
        assert_eq!(starts, [1, 4, 7, 10]);
        for c in &chunks {
            assert!(c.source_text.lines().count() <= 3);
        }
    }

    #[test]
    fn test_oversized_line_is_hard_split() {
        let text = "x".repeat(250);
        let chunks = chunker(1000, 100).split_text(Path::new("main.go"), &text, Language::Go);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.source_text.len() <= 100));
        let joined: String = chunks.iter().map(|c| c.source_text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_multibyte_text_never_split_inside_a_char() {
        let text = "é".repeat(100);
        let chunks = chunker(1000, 7).split_text(Path::new("main.go"), &text, Language::Go);
        let joined: String = chunks.iter().map(|c| c.source_text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_indices_contiguous_and_deterministic() {
        let text = (0..200)
            .map(|i| format!("def f{}():\n    return {}\n", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let c = chunker(40, 500);
        let first = c.split_text(Path::new("m.py"), &text, Language::Python);
        let second = c.split_text(Path::new("m.py"), &text, Language::Python);
        assert!(first.len() > 1);
        assert_eq!(first, second);
        for (i, chunk) in first.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
            assert!(chunk.source_text.len() <= 500);
            assert!(chunk.source_text.lines().count() <= 40);
        }
    }

    #[test]
    fn test_blank_file_has_no_chunks() {
        let chunks = chunker(1000, 6000).split_text(Path::new("a.rs"), "\n\n   \n", Language::Rust);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_unknown_extension_yields_nothing() {
        let chunks = chunker(1000, 6000)
            .split(Path::new("/definitely/missing/notes.md"), None)
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_language_hint_overrides_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("script");
        std::fs::write(&path, "echo hi\n").unwrap();
        let chunks = chunker(1000, 6000).split(&path, Some(Language::Shell)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].origin_file, path);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = chunker(1000, 6000)
            .split(Path::new("/definitely/missing/main.rs"), None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(_)));
    }
}
