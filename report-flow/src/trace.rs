use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// One recorded step of a pipeline run: which stage, when, and optionally the
/// prompt/response exchange or structured data that the stage produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The full trace of one pipeline run. Owned by the run that produced it and
/// returned alongside the report; never shared across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input: Value,
    pub steps: Vec<TraceStep>,
}

/// Append-only recorder handed to every stage through the context. Concurrent
/// branches may interleave writes in any order; consumers order by timestamp.
#[derive(Clone, Debug)]
pub struct TraceRecorder {
    inner: Arc<Mutex<RunTrace>>,
}

impl TraceRecorder {
    pub fn new(input: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunTrace {
                started_at: Utc::now(),
                finished_at: None,
                input,
                steps: Vec::new(),
            })),
        }
    }

    pub fn record(&self, stage: &str, data: Option<Value>) {
        self.push(TraceStep {
            stage: stage.to_string(),
            timestamp: Utc::now(),
            prompt: None,
            response: None,
            data,
        });
    }

    pub fn record_exchange(&self, stage: &str, prompt: &str, response: &str) {
        self.push(TraceStep {
            stage: stage.to_string(),
            timestamp: Utc::now(),
            prompt: Some(prompt.to_string()),
            response: Some(response.to_string()),
            data: None,
        });
    }

    fn push(&self, step: TraceStep) {
        let mut trace = self.inner.lock().unwrap();
        trace.steps.push(step);
    }

    pub fn finish(&self) {
        let mut trace = self.inner.lock().unwrap();
        trace.finished_at = Some(Utc::now());
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().started_at
    }

    /// Clone out the trace, steps sorted by timestamp rather than arrival.
    pub fn snapshot(&self) -> RunTrace {
        let mut trace = self.inner.lock().unwrap().clone();
        trace.steps.sort_by_key(|s| s.timestamp);
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_steps_and_finishes() {
        let recorder = TraceRecorder::new(json!({"company": "Acme"}));
        recorder.record("plan_queries", Some(json!({"queries": 6})));
        recorder.record_exchange("select_candidates", "prompt text", "response text");
        recorder.finish();

        let trace = recorder.snapshot();
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[0].stage, "plan_queries");
        assert!(trace.steps[1].prompt.is_some());
        assert!(trace.finished_at.is_some());
    }

    #[tokio::test]
    async fn tolerates_interleaved_writes() {
        let recorder = TraceRecorder::new(Value::Null);
        let mut handles = Vec::new();
        for i in 0..8 {
            let r = recorder.clone();
            handles.push(tokio::spawn(async move {
                r.record("deep_research", Some(json!({"branch": i})));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(recorder.snapshot().steps.len(), 8);
    }
}
