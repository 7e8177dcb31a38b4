//! Collects reasoning fragments of one response

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Called once per reasoning fragment as it is discovered
pub type ReasoningObserver = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

/// Running total of all reasoning found in one response, from the text and
/// from the stream alike. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct ReasoningAggregator {
    buffer: Arc<Mutex<String>>,
    observer: Option<ReasoningObserver>,
}

impl ReasoningAggregator {
    pub fn new(observer: Option<ReasoningObserver>) -> Self {
        Self {
            buffer: Arc::default(),
            observer,
        }
    }

    /// Append a fragment and notify the observer. Empty fragments are ignored.
    /// A failing observer is logged and otherwise has no effect.
    pub fn record(&self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(fragment);

        if let Some(observer) = &self.observer {
            if let Err(e) = observer(fragment) {
                warn!("Reasoning observer failed: {:#}", e);
            }
        }
    }

    pub fn snapshot(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Read-only handle on the running total
    pub fn view(&self) -> ThinkingView {
        ThinkingView {
            source: ViewSource::Live(self.buffer.clone()),
        }
    }
}

impl fmt::Debug for ReasoningAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReasoningAggregator")
            .field("reasoning", &self.snapshot())
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

/// Reasoning aggregate as exposed on a response.
///
/// A live view reads the aggregator's buffer on every access, so it keeps up
/// with fragments that arrive while the response stream is consumed and
/// cannot be set independently of them.
#[derive(Clone)]
pub struct ThinkingView {
    source: ViewSource,
}

#[derive(Clone)]
enum ViewSource {
    Live(Arc<Mutex<String>>),
    Fixed(String),
}

impl ThinkingView {
    /// A value supplied by the handler itself
    pub fn fixed(value: impl Into<String>) -> Self {
        Self {
            source: ViewSource::Fixed(value.into()),
        }
    }

    pub fn get(&self) -> String {
        match &self.source {
            ViewSource::Live(buffer) => buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            ViewSource::Fixed(value) => value.clone(),
        }
    }
}

impl fmt::Debug for ThinkingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThinkingView").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_and_notifies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let aggregator = ReasoningAggregator::new(Some(Arc::new(move |fragment: &str| {
            seen_clone.lock().unwrap().push(fragment.to_string());
            Ok(())
        })));

        aggregator.record("one ");
        aggregator.record("");
        aggregator.record("two");

        assert_eq!(aggregator.snapshot(), "one two");
        assert_eq!(*seen.lock().unwrap(), vec!["one ", "two"]);
    }

    #[test]
    fn test_observer_error_does_not_stop_aggregation() {
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let aggregator = ReasoningAggregator::new(Some(Arc::new(move |_: &str| {
            *calls_clone.lock().unwrap() += 1;
            anyhow::bail!("observer exploded")
        })));

        aggregator.record("a");
        aggregator.record("b");

        assert_eq!(aggregator.snapshot(), "ab");
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_view_tracks_later_fragments() {
        let aggregator = ReasoningAggregator::default();
        let view = aggregator.view();
        assert!(aggregator.is_empty());
        assert_eq!(view.get(), "");

        aggregator.clone().record("late");
        assert_eq!(view.get(), "late");
    }

    #[test]
    fn test_fixed_view() {
        assert_eq!(ThinkingView::fixed("given").get(), "given");
    }
}
