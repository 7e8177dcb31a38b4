//! Thinking middleware: wraps a response handler and pulls reasoning out of
//! its text and stream

use crate::aggregate::{ReasoningAggregator, ReasoningObserver};
use crate::config::{MarkerPair, ThinkingConfig};
use crate::split::split_reasoning_from_string;
use crate::streaming::normalize;
use crate::transform::{default_reasoning_part_factory, ReasoningPartFactory, TagTransformer};
use crate::types::{ModelResponse, StreamPart, ThinkingError};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Request context handed down the handler chain
pub type MiddlewareContext = Map<String, Value>;

/// Continuation that produces the response of the wrapped handler
pub type Next<'a> =
    Box<dyn FnOnce(MiddlewareContext) -> BoxFuture<'a, Result<ModelResponse>> + Send + 'a>;

/// A step wrapped around a response handler
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, context: MiddlewareContext, next: Next<'_>) -> Result<ModelResponse>;
}

/// Middleware that moves `<thinking>` spans out of a response into reasoning
pub struct ThinkingMiddleware {
    markers: MarkerPair,
    strip_reasoning_from_text: bool,
    observer: Option<ReasoningObserver>,
    reasoning_part: ReasoningPartFactory,
}

impl fmt::Debug for ThinkingMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThinkingMiddleware")
            .field("markers", &self.markers)
            .field("strip_reasoning_from_text", &self.strip_reasoning_from_text)
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ThinkingMiddleware {
    fn default() -> Self {
        Self {
            markers: MarkerPair::default(),
            strip_reasoning_from_text: true,
            observer: None,
            reasoning_part: default_reasoning_part_factory(),
        }
    }
}

impl ThinkingMiddleware {
    pub fn new(config: &ThinkingConfig) -> Result<Self, ThinkingError> {
        Ok(Self {
            markers: config.markers()?,
            strip_reasoning_from_text: config.strip_reasoning_from_text,
            ..Default::default()
        })
    }

    /// Call `observer` for every reasoning fragment. Errors it returns are
    /// logged and otherwise ignored.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Replace the shape of the reasoning parts emitted on the stream
    pub fn with_reasoning_part_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> StreamPart + Send + Sync + 'static,
    {
        self.reasoning_part = Arc::new(factory);
        self
    }

    pub fn markers(&self) -> &MarkerPair {
        &self.markers
    }

    /// Extract reasoning from a handler response.
    ///
    /// The stream is transformed lazily, so reasoning found in it only shows
    /// up in `thinking` while the stream is consumed. `reasoning` is merged
    /// right away and therefore only holds what the text contained.
    pub fn augment(&self, mut response: ModelResponse) -> Result<ModelResponse, ThinkingError> {
        let aggregator = ReasoningAggregator::new(self.observer.clone());

        if let Some(stream) = response.stream.take() {
            let (parts, shape) = normalize(stream)?;
            let transformer = TagTransformer::new(
                self.markers.clone(),
                !self.strip_reasoning_from_text,
                aggregator.clone(),
                self.reasoning_part.clone(),
            );
            response.stream = Some(shape.recreate(transformer.transform(parts)));
        }

        if let Some(text) = response.text.as_mut() {
            let split = split_reasoning_from_string(
                text,
                &self.markers,
                !self.strip_reasoning_from_text,
            );
            if self.strip_reasoning_from_text {
                *text = split.text;
            }
            aggregator.record(&split.reasoning);
        }

        if !aggregator.is_empty() {
            let collected = aggregator.snapshot();
            match response.reasoning.as_mut() {
                Some(Value::String(existing)) => existing.push_str(&collected),
                None | Some(Value::Null) => response.reasoning = Some(Value::String(collected)),
                Some(other) => {
                    debug!("Leaving non-string reasoning field untouched: {}", other);
                }
            }
        }

        if response.thinking.is_none() {
            response.thinking = Some(aggregator.view());
        }

        Ok(response)
    }
}

#[async_trait]
impl Middleware for ThinkingMiddleware {
    async fn handle(&self, context: MiddlewareContext, next: Next<'_>) -> Result<ModelResponse> {
        let response = next(context).await?;
        Ok(self.augment(response)?)
    }
}
