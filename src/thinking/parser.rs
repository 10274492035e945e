//! Parser for the reasoning transcript a model embeds in its reply.
//!
//! The system prompt asks the model to answer in this shape:
//!
//! ```text
//! <thinking>
//! Step 1: Brief title
//! Detailed reasoning for this step
//!
//! Step 2: Brief title
//! Detailed reasoning for this step
//! </thinking>
//!
//! Final answer
//! ```
//!
//! Parsing happens in two phases. First the block span is located by
//! searching for the start marker and the first end marker after it,
//! then the closed block is tokenized into steps on the `Step N: `
//! marker. Nothing here can fail: a reply that ignores the format is
//! treated as a plain answer.

use serde::Serialize;

pub const THINKING_START: &str = "<thinking>";
pub const THINKING_END: &str = "</thinking>";
const STEP_PREFIX: &str = "Step ";

/// One titled step of the reasoning transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThinkingStep {
    pub title: String,
    pub content: String,
}

impl ThinkingStep {
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
        }
    }
}

/// The result of parsing a reply: the reasoning steps in source order
/// and the text that should be shown as the answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub thinking: Vec<ThinkingStep>,
    pub answer: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockSpan {
    Missing,
    // Byte offset of the start marker
    Open { start: usize },
    // `end` is the byte offset of the end marker
    Closed { start: usize, end: usize },
}

fn find_block(text: &str) -> BlockSpan {
    let Some(start) = text.find(THINKING_START) else {
        return BlockSpan::Missing;
    };
    let body_start = start + THINKING_START.len();
    match text[body_start..].find(THINKING_END) {
        Some(offset) => BlockSpan::Closed {
            start,
            end: body_start + offset,
        },
        None => BlockSpan::Open { start },
    }
}

/// Parse a complete or partially streamed reply.
///
/// An unclosed block yields no steps and an empty answer so that
/// half-written reasoning is never shown as the answer.
pub fn parse(text: &str) -> Transcript {
    match find_block(text) {
        BlockSpan::Missing => Transcript {
            thinking: Vec::new(),
            answer: text.to_string(),
        },
        BlockSpan::Open { .. } => Transcript::default(),
        BlockSpan::Closed { start, end } => {
            let block = &text[start + THINKING_START.len()..end];
            let after = &text[end + THINKING_END.len()..];
            let answer = format!("{}{}", &text[..start], after).trim().to_string();
            Transcript {
                thinking: split_steps(block),
                answer,
            }
        }
    }
}

/// Checks for a step marker (`Step <digits>: <title>`) at byte offset
/// `at` and returns the offset where the title begins.
fn step_marker_at(block: &str, at: usize) -> Option<usize> {
    let after_prefix = at + STEP_PREFIX.len();
    let digits = block[after_prefix..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 || !block[after_prefix + digits..].starts_with(": ") {
        return None;
    }
    let title_start = after_prefix + digits + 2;
    let title_line = block[title_start..].split('\n').next().unwrap_or_default();
    if title_line.trim().is_empty() {
        return None;
    }
    Some(title_start)
}

/// Split the contents of a closed thinking block into steps. Each
/// step's body runs until the next step marker or the end of the
/// block. Text before the first marker is dropped.
fn split_steps(block: &str) -> Vec<ThinkingStep> {
    // (marker offset, title offset)
    let mut markers: Vec<(usize, usize)> = Vec::new();
    let mut search_from = 0;

    while let Some(offset) = block[search_from..].find(STEP_PREFIX) {
        let at = search_from + offset;
        match step_marker_at(block, at) {
            Some(title_start) => {
                markers.push((at, title_start));
                // Anything else on the title line belongs to the title
                search_from = block[title_start..]
                    .find('\n')
                    .map_or(block.len(), |i| title_start + i);
            }
            None => search_from = at + STEP_PREFIX.len(),
        }
    }

    markers
        .iter()
        .enumerate()
        .map(|(idx, &(_, title_start))| {
            let end = markers
                .get(idx + 1)
                .map_or(block.len(), |&(next_marker, _)| next_marker);
            let segment = &block[title_start..end];
            let (title, content) = segment.split_once('\n').unwrap_or((segment, ""));
            ThinkingStep::new(title.trim(), content.trim())
        })
        .collect()
}

#[derive(Clone, Copy, Debug)]
enum ScanState {
    SeekingStart { from: usize },
    SeekingEnd { start: usize, from: usize },
    Closed,
}

/// Incremental version of [`parse`] for replies that arrive in
/// pieces.
///
/// Marker searches resume where the previous one stopped, the block is
/// split into steps once when it closes and the answer after the block
/// grows by appending, so the total work across a stream stays linear
/// in the length of the reply. After any sequence of pushes the
/// accessors agree with `parse` on the text received so far.
#[derive(Debug)]
pub struct StreamingTranscript {
    text: String,
    state: ScanState,
    thinking: Vec<ThinkingStep>,
    answer: String,
}

impl Default for StreamingTranscript {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingTranscript {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            state: ScanState::SeekingStart { from: 0 },
            thinking: Vec::new(),
            answer: String::new(),
        }
    }

    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);

        loop {
            match self.state {
                ScanState::SeekingStart { from } => match self.text[from..].find(THINKING_START) {
                    Some(offset) => {
                        let start = from + offset;
                        self.state = ScanState::SeekingEnd {
                            start,
                            from: start + THINKING_START.len(),
                        };
                    }
                    None => {
                        self.state = ScanState::SeekingStart {
                            from: resume_offset(&self.text, THINKING_START.len()),
                        };
                        return;
                    }
                },
                ScanState::SeekingEnd { start, from } => match self.text[from..].find(THINKING_END) {
                    Some(offset) => {
                        let end = from + offset;
                        let block = &self.text[start + THINKING_START.len()..end];
                        self.thinking = split_steps(block);
                        self.answer = format!(
                            "{}{}",
                            &self.text[..start],
                            &self.text[end + THINKING_END.len()..]
                        );
                        self.state = ScanState::Closed;
                        return;
                    }
                    None => {
                        let body_start = start + THINKING_START.len();
                        self.state = ScanState::SeekingEnd {
                            start,
                            from: resume_offset(&self.text, THINKING_END.len()).max(body_start),
                        };
                        return;
                    }
                },
                ScanState::Closed => {
                    self.answer.push_str(delta);
                    return;
                }
            }
        }
    }

    /// True once the thinking block has both markers.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ScanState::Closed)
    }

    /// True while a start marker has been seen without its end marker.
    pub fn is_open(&self) -> bool {
        matches!(self.state, ScanState::SeekingEnd { .. })
    }

    pub fn thinking(&self) -> &[ThinkingStep] {
        &self.thinking
    }

    pub fn answer(&self) -> &str {
        match self.state {
            ScanState::SeekingStart { .. } => &self.text,
            ScanState::SeekingEnd { .. } => "",
            ScanState::Closed => self.answer.trim(),
        }
    }

    /// Everything received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn to_transcript(&self) -> Transcript {
        Transcript {
            thinking: self.thinking.clone(),
            answer: self.answer().to_string(),
        }
    }
}

// A marker can be split across pushes, so the next search starts far
// enough back to see the beginning of one.
fn resume_offset(text: &str, marker_len: usize) -> usize {
    let mut offset = text.len().saturating_sub(marker_len - 1);
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
