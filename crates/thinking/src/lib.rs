//! Reasoning extraction for model responses that inline their reasoning in
//! `<thinking>...</thinking>` tags
//!
//! This crate implements:
//! - Splitting a complete response text into visible text and reasoning
//! - Incremental splitting of streamed text deltas, with markers split across
//!   arbitrary fragment boundaries
//! - Adapters between pull streams and push (channel) streams
//! - Aggregation of reasoning fragments with an optional observer
//! - A middleware that applies all of the above to a handler response


pub mod aggregate;
pub mod config;
pub mod middleware;
pub mod split;
pub mod streaming;
pub mod transform;
pub mod types;

pub use aggregate::{ReasoningAggregator, ReasoningObserver, ThinkingView};
pub use config::{MarkerPair, ThinkingConfig, DEFAULT_TAG_NAME};
pub use middleware::{Middleware, MiddlewareContext, Next, ThinkingMiddleware};
pub use split::{chunk_text, split_reasoning_from_string, SplitResult};
pub use streaming::{normalize, PartPullStream, PartStream, StreamShape};
pub use transform::{ReasoningPartFactory, Segment, TagScanner, TagTransformer};
pub use types::*;
