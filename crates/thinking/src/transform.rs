//! Incremental extraction of reasoning spans from streamed text
//!
//! `TagScanner` is the synchronous state machine: text goes in fragment by
//! fragment, classified segments come out. `TagTransformer` drives a scanner
//! over a stream of parts and turns the segments back into parts.

use crate::aggregate::ReasoningAggregator;
use crate::config::MarkerPair;
use crate::streaming::PartPullStream;
use crate::types::StreamPart;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Builds the stream part emitted for a reasoning fragment
pub type ReasoningPartFactory = Arc<dyn Fn(&str) -> StreamPart + Send + Sync>;

/// A classified piece of the text stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Reasoning(String),
}

/// Scanner state for one stream
#[derive(Debug)]
pub struct TagScanner {
    markers: MarkerPair,
    keep_tags: bool,
    // Text received but not yet classified
    buffer: String,
    // Whether we are between a start and an end marker
    inside: bool,
}

impl TagScanner {
    pub fn new(markers: MarkerPair, keep_tags: bool) -> Self {
        Self {
            markers,
            keep_tags,
            buffer: String::new(),
            inside: false,
        }
    }

    pub fn is_inside(&self) -> bool {
        self.inside
    }

    /// Feed the next text fragment and return everything that can be
    /// classified so far.
    ///
    /// Only a trailing piece that could still turn into the marker we are
    /// looking for is kept back; it is resolved by the next fragment or by
    /// `finish`.
    pub fn push(&mut self, delta: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        self.buffer.push_str(delta);

        while !self.buffer.is_empty() {
            if !self.inside {
                let start_tag = self.markers.start();
                let Some(pos) = self.buffer.find(start_tag) else {
                    let ready = self.buffer.len() - partial_marker_len(&self.buffer, start_tag);
                    if ready > 0 {
                        segments.push(Segment::Text(self.buffer.drain(..ready).collect()));
                    }
                    break;
                };

                if pos > 0 {
                    segments.push(Segment::Text(self.buffer[..pos].to_string()));
                }
                if self.keep_tags {
                    segments.push(Segment::Text(start_tag.to_string()));
                }
                self.buffer.drain(..pos + start_tag.len());
                self.inside = true;
            } else {
                let end_tag = self.markers.end();
                let Some(pos) = self.buffer.find(end_tag) else {
                    let ready = self.buffer.len() - partial_marker_len(&self.buffer, end_tag);
                    if ready > 0 {
                        segments.push(Segment::Reasoning(self.buffer.drain(..ready).collect()));
                    }
                    break;
                };

                // Empty spans produce no reasoning segment
                if pos > 0 {
                    segments.push(Segment::Reasoning(self.buffer[..pos].to_string()));
                }
                if self.keep_tags {
                    segments.push(Segment::Text(end_tag.to_string()));
                }
                self.buffer.drain(..pos + end_tag.len());
                self.inside = false;
            }
        }

        segments
    }

    /// Flush whatever is left at the end of the stream. An unterminated span
    /// is still reasoning.
    pub fn finish(&mut self) -> Option<Segment> {
        self.flush()
    }

    /// Release held-back text as it is, classified by the current state.
    /// A marker split across the flush point is not recognized.
    pub fn flush(&mut self) -> Option<Segment> {
        if self.buffer.is_empty() {
            return None;
        }

        let rest = std::mem::take(&mut self.buffer);
        if self.inside {
            Some(Segment::Reasoning(rest))
        } else {
            Some(Segment::Text(rest))
        }
    }
}

/// Length of the longest proper prefix of `marker` that `buffer` ends with
fn partial_marker_len(buffer: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .filter(|&len| marker.is_char_boundary(len))
        .find(|&len| buffer.ends_with(&marker[..len]))
        .unwrap_or(0)
}

/// Stream filter that splits text deltas into visible text and reasoning
/// parts. Parts other than text deltas pass through unchanged.
#[derive(Clone)]
pub struct TagTransformer {
    markers: MarkerPair,
    keep_tags: bool,
    aggregator: ReasoningAggregator,
    reasoning_part: ReasoningPartFactory,
}

impl fmt::Debug for TagTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTransformer")
            .field("markers", &self.markers)
            .field("keep_tags", &self.keep_tags)
            .finish_non_exhaustive()
    }
}

impl TagTransformer {
    pub fn new(
        markers: MarkerPair,
        keep_tags: bool,
        aggregator: ReasoningAggregator,
        reasoning_part: ReasoningPartFactory,
    ) -> Self {
        Self {
            markers,
            keep_tags,
            aggregator,
            reasoning_part,
        }
    }

    /// Transform `input` lazily. Nothing is read from `input` before the
    /// returned stream is polled, and dropping the returned stream drops
    /// `input`.
    pub fn transform(self, mut input: PartPullStream) -> PartPullStream {
        Box::pin(async_stream::stream! {
            let mut scanner = TagScanner::new(self.markers.clone(), self.keep_tags);

            while let Some(part) = input.next().await {
                let text_part = match part {
                    StreamPart::TextDelta(text_part) => text_part,
                    other => {
                        // Text before a non-text part must not move behind it
                        if let Some(segment) = scanner.flush() {
                            yield self.emit(segment);
                        }
                        yield other;
                        continue;
                    }
                };

                let delta = text_part.delta();
                if delta.is_empty() {
                    continue;
                }

                for segment in scanner.push(delta) {
                    yield self.emit(segment);
                }
            }

            if let Some(segment) = scanner.finish() {
                debug!(
                    "Flushing pending text at end of stream (inside span: {})",
                    scanner.is_inside()
                );
                yield self.emit(segment);
            }
        })
    }

    fn emit(&self, segment: Segment) -> StreamPart {
        trace!("Emitting {:?}", segment);
        match segment {
            Segment::Text(text) => StreamPart::text_delta(text),
            Segment::Reasoning(text) => {
                self.aggregator.record(&text);
                (self.reasoning_part)(&text)
            }
        }
    }
}

/// Default reasoning part shape: `{type: "reasoning", reasoning: {type:
/// "text-delta", textDelta}}`
pub fn default_reasoning_part_factory() -> ReasoningPartFactory {
    Arc::new(|text: &str| StreamPart::reasoning(text))
}
