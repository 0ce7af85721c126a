//! Shared state handed to every API handler.

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::pipeline::MessagePipeline;
use crate::store::ChatDatabase;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct AtomicCounters {
    pub total_requests: AtomicU64,
    pub sends_started: AtomicU64,
}

impl AtomicCounters {
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send(&self) {
        self.sends_started.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ChatDatabase>,
    pub completions: Arc<CompletionClient>,
    pub pipeline: Arc<MessagePipeline>,
    pub counters: Arc<AtomicCounters>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<ChatDatabase>) -> Self {
        let completions = Arc::new(CompletionClient::new(&config));
        let pipeline = Arc::new(MessagePipeline::new(
            Arc::clone(&store),
            Arc::clone(&completions),
            config.openai_api_key.clone(),
        ));
        Self {
            config: Arc::new(config),
            store,
            completions,
            pipeline,
            counters: Arc::new(AtomicCounters::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = AtomicCounters::default();
        counters.record_request();
        counters.record_request();
        counters.record_send();

        assert_eq!(counters.total_requests.load(Ordering::Relaxed), 2);
        assert_eq!(counters.sends_started.load(Ordering::Relaxed), 1);
    }
}
