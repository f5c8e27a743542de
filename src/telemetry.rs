//! Process-wide telemetry emitter slot.
//!
//! Every subsystem fires named counters through [`emit`]. The sink is a
//! single pluggable closure installed with [`set_emitter`]; when none is
//! installed the call is a no-op so the system stays operable without a
//! telemetry backend.

use std::sync::{Arc, Mutex, OnceLock};

use serde_json::Value;

/// Signature of an installed telemetry sink.
pub type Emitter = Arc<dyn Fn(&str, &Value) + Send + Sync>;

fn slot() -> &'static Mutex<Option<Emitter>> {
    static SLOT: OnceLock<Mutex<Option<Emitter>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

/// Install or clear the process-wide telemetry sink.
pub fn set_emitter(emitter: Option<Emitter>) {
    let mut guard = slot().lock().expect("telemetry slot poisoned");
    *guard = emitter;
}

/// Emit a named telemetry event with a JSON payload.
pub fn emit(name: &str, payload: Value) {
    tracing::debug!(target: "telemetry", event = name, payload = %payload);
    let sink = {
        let guard = slot().lock().expect("telemetry slot poisoned");
        guard.clone()
    };
    if let Some(sink) = sink {
        sink(name, &payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn emit_without_sink_is_noop() {
        set_emitter(None);
        emit("score.write_ms", json!({ "ms": 1 }));
    }

    #[test]
    fn emit_reaches_installed_sink() {
        let captured: Arc<StdMutex<Vec<String>>> = Arc::default();
        let sink = captured.clone();
        set_emitter(Some(Arc::new(move |name, _payload| {
            sink.lock().unwrap().push(name.to_string());
        })));
        emit("events.join", json!({ "eventId": "e1" }));
        set_emitter(None);
        assert!(
            captured
                .lock()
                .unwrap()
                .iter()
                .any(|name| name == "events.join")
        );
    }
}
