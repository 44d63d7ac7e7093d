//! Per-request join point (C5): waits for the LOCAL and REMOTE sources to
//! report, merges their value lists, and invokes the completion callback
//! exactly once.
//!
//! Grounded on `ResultMixer::set_result`/`set_failure`/`MixResult` in the
//! reference mixer service. The cyclic mixer/holder ownership the
//! original resolves with a self-deleting C++ object is instead an
//! `Arc<Mutex<MixerState>>`: holders clone the `Arc`, the mixer's
//! completion fires from whichever clone observes the last report, and
//! everything drops normally once no clone remains.

use std::sync::Mutex;

use crate::sexpr::{self, Value};

pub const NUM_SOURCES: usize = 2;
pub const LOCAL: usize = 0;
pub const REMOTE: usize = 1;

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Success(String),
    Failure(String),
}

struct MixerState {
    slots: [Slot; NUM_SOURCES],
    outstanding: usize,
}

/// Completion callback invoked exactly once, with the final merged
/// response string.
pub type Completion = Box<dyn FnOnce(String) + Send + 'static>;

pub struct ResultMixer {
    state: Mutex<MixerState>,
    completion: Mutex<Option<Completion>>,
}

impl ResultMixer {
    pub fn new(completion: Completion) -> Self {
        ResultMixer {
            state: Mutex::new(MixerState {
                slots: [Slot::Pending, Slot::Pending],
                outstanding: NUM_SOURCES,
            }),
            completion: Mutex::new(Some(completion)),
        }
    }

    pub fn set_result(&self, source: usize, response: String) {
        self.record(source, Slot::Success(response));
    }

    pub fn set_failure(&self, source: usize, reason: String) {
        self.record(source, Slot::Failure(reason));
    }

    fn record(&self, source: usize, slot: Slot) {
        let finished = {
            let mut state = self.state.lock().expect("mixer mutex poisoned");
            if !matches!(state.slots[source], Slot::Pending) {
                // A holder must report exactly once; a duplicate report
                // is a bug upstream, ignore it rather than double-count.
                return;
            }
            state.slots[source] = slot;
            state.outstanding -= 1;
            state.outstanding == 0
        };
        if finished {
            self.complete();
        }
    }

    fn complete(&self) {
        let merged = {
            let state = self.state.lock().expect("mixer mutex poisoned");
            mix(&state.slots)
        };
        if let Some(completion) = self.completion.lock().expect("mixer mutex poisoned").take() {
            completion(merged);
        }
    }
}

fn mix(slots: &[Slot; NUM_SOURCES]) -> String {
    let local_value = slot_value(&slots[LOCAL]);
    let remote_value = slot_value(&slots[REMOTE]);

    match (local_value, remote_value) {
        (None, None) => match &slots[REMOTE] {
            Slot::Failure(reason) => error_response(reason),
            Slot::Success(raw) => raw.clone(),
            Slot::Pending => error_response("no response"),
        },
        (local, remote) => {
            let mut elements = Vec::new();
            if let Some(local) = local {
                elements.extend(local.iter_list().cloned());
            }
            if let Some(remote) = remote {
                elements.extend(remote.iter_list().cloned());
            }
            sexpr::repr(&Value::list([Value::list([
                Value::symbol("value"),
                Value::list(elements),
            ])]))
        }
    }
}

/// Parses a slot's raw response and extracts its `value` list, if any.
fn slot_value(slot: &Slot) -> Option<Value> {
    let raw = match slot {
        Slot::Success(raw) => raw,
        _ => return None,
    };
    let parsed = sexpr::parse(raw).ok()?;
    sexpr::assoc_get_one(&parsed, "value").cloned()
}

fn error_response(message: &str) -> String {
    sexpr::repr(&Value::list([Value::list([
        Value::symbol("error"),
        Value::list([Value::list([Value::symbol("message"), Value::string(message)])]),
    ])]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn mixer_capturing() -> (std::sync::Arc<ResultMixer>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let mixer = std::sync::Arc::new(ResultMixer::new(Box::new(move |response| {
            let _ = tx.send(response);
        })));
        (mixer, rx)
    }

    #[test]
    fn s2_local_ranks_ahead_of_remote() {
        let (mixer, rx) = mixer_capturing();
        mixer.set_result(REMOTE, "((value (((tag cpp)))))".to_string());
        mixer.set_result(LOCAL, "((value (((tag local)))))".to_string());
        let response = rx.recv().unwrap();
        assert_eq!(response, "((value (((tag local)) ((tag cpp)))))");
    }

    #[test]
    fn s3_partial_failure_keeps_local_value() {
        let (mixer, rx) = mixer_capturing();
        mixer.set_failure(REMOTE, "connection refused".to_string());
        mixer.set_result(LOCAL, "((value (((tag local)))))".to_string());
        let response = rx.recv().unwrap();
        assert_eq!(response, "((value (((tag local)))))");
    }

    #[test]
    fn s4_total_failure_passes_through_remote_reason() {
        let (mixer, rx) = mixer_capturing();
        mixer.set_failure(REMOTE, "Failed to connect to remote services.".to_string());
        mixer.set_result(LOCAL, "((nothing here))".to_string());
        let response = rx.recv().unwrap();
        assert_eq!(response, r#"((error ((message "Failed to connect to remote services."))))"#);
    }

    #[test]
    fn completion_fires_exactly_once() {
        let (mixer, rx) = mixer_capturing();
        mixer.set_result(LOCAL, "((value nil))".to_string());
        mixer.set_result(REMOTE, "((value nil))".to_string());
        assert!(rx.recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
