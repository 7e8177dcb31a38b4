//! Reasoning extraction for complete, non-streamed text

use crate::config::MarkerPair;

/// Visible text and reasoning separated from one input string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    pub text: String,
    pub reasoning: String,
}

/// Split `text` into visible text and reasoning.
///
/// All marker-delimited spans are collected in one left-to-right pass and
/// their contents concatenated without separator. With `keep_tags` the spans
/// stay in the visible text verbatim. A start marker without matching end
/// marker turns the rest of the input into reasoning.
pub fn split_reasoning_from_string(text: &str, markers: &MarkerPair, keep_tags: bool) -> SplitResult {
    let (start_tag, end_tag) = (markers.start(), markers.end());

    if !text.contains(start_tag) {
        return SplitResult {
            text: text.to_string(),
            reasoning: String::new(),
        };
    }

    let mut output = String::with_capacity(text.len());
    let mut reasoning = String::new();
    let mut cursor = 0;

    while cursor < text.len() {
        let Some(start) = text[cursor..].find(start_tag).map(|pos| cursor + pos) else {
            output.push_str(&text[cursor..]);
            break;
        };

        output.push_str(&text[cursor..start]);
        let content_start = start + start_tag.len();

        let Some(end) = text[content_start..]
            .find(end_tag)
            .map(|pos| content_start + pos)
        else {
            // Unterminated span runs to the end of the input
            let chunk = &text[content_start..];
            reasoning.push_str(chunk);
            if keep_tags {
                output.push_str(start_tag);
                output.push_str(chunk);
            }
            return SplitResult {
                text: output,
                reasoning,
            };
        };

        let chunk = &text[content_start..end];
        reasoning.push_str(chunk);
        if keep_tags {
            output.push_str(start_tag);
            output.push_str(chunk);
            output.push_str(end_tag);
        }
        cursor = end + end_tag.len();
    }

    SplitResult {
        text: output,
        reasoning,
    }
}

/// Cut `text` into fragments of `chunk_size` characters each, the last one
/// possibly shorter. Handy for replaying a complete text as a stream.
///
/// # Panics
///
/// Panics if `chunk_size` is 0.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
