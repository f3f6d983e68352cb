use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::trace::TraceRecorder;

/// Context for sharing data between stages of a pipeline run. Values are
/// stored as JSON so stages stay decoupled from each other's concrete types.
/// The trace recorder rides along so every stage can log its exchanges.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    trace: TraceRecorder,
}

impl Context {
    pub fn new(trace: TraceRecorder) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            trace,
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) {
        let value = serde_json::to_value(value).expect("Failed to serialize value");
        self.data.insert(key.into(), value);
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub fn trace(&self) -> &TraceRecorder {
        &self.trace
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(TraceRecorder::new(Value::Null))
    }
}
