//! Per-source "first-success-wins, Nth-failure-wins" latch (C6): collapses
//! `K` parallel shard replies for one logical source into a single report
//! to the mixer.
//!
//! Grounded on `ResultHolder::set_result`/`set_failure` in the reference
//! mixer service; the holder here is an ordinary `Arc`, torn down by Rust's
//! reference counting once the caller that issued the K RPCs drops its
//! clones, rather than a self-deleting object.

use std::sync::{Arc, Mutex};

use super::result_mixer::ResultMixer;

struct HolderState {
    remaining: usize,
    used: bool,
    last_failure: Option<String>,
}

pub struct ResultHolder {
    mixer: Arc<ResultMixer>,
    source: usize,
    state: Mutex<HolderState>,
}

impl ResultHolder {
    /// `shard_count` is `K`, the number of shards backing this source.
    pub fn new(mixer: Arc<ResultMixer>, source: usize, shard_count: usize) -> Arc<Self> {
        Arc::new(ResultHolder {
            mixer,
            source,
            state: Mutex::new(HolderState {
                remaining: shard_count.max(1),
                used: false,
                last_failure: None,
            }),
        })
    }

    /// Reports one shard's success. The first successful report wins and
    /// is forwarded to the mixer; later ones (a late reply from another
    /// shard in a well-behaved system) are absorbed silently.
    pub fn report_success(&self, response: String) {
        let should_forward = {
            let mut state = self.state.lock().expect("holder mutex poisoned");
            state.remaining = state.remaining.saturating_sub(1);
            if state.used {
                false
            } else {
                state.used = true;
                true
            }
        };
        if should_forward {
            self.mixer.set_result(self.source, response);
        }
    }

    /// Reports one shard's failure. Counted silently unless every shard
    /// has now reported and none succeeded, in which case the mixer sees
    /// a failure for this source.
    pub fn report_failure(&self, reason: String) {
        let to_forward = {
            let mut state = self.state.lock().expect("holder mutex poisoned");
            state.remaining = state.remaining.saturating_sub(1);
            state.last_failure = Some(reason);
            if !state.used && state.remaining == 0 {
                state.last_failure.clone()
            } else {
                None
            }
        };
        if let Some(reason) = to_forward {
            self.mixer.set_failure(self.source, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::result_mixer::{LOCAL, REMOTE};
    use std::sync::mpsc;

    fn mixer_capturing() -> (Arc<ResultMixer>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let mixer = Arc::new(ResultMixer::new(Box::new(move |r| {
            let _ = tx.send(r);
        })));
        (mixer, rx)
    }

    #[test]
    fn first_success_among_k_shards_wins() {
        let (mixer, rx) = mixer_capturing();
        let holder = ResultHolder::new(mixer.clone(), REMOTE, 3);
        mixer.set_result(LOCAL, "((value nil))".to_string());
        holder.report_success("((value (((tag a)))))".to_string());
        holder.report_success("((value (((tag b)))))".to_string());
        holder.report_failure("ignored".to_string());
        let response = rx.recv().unwrap();
        assert!(response.contains("tag a"));
        assert!(!response.contains("tag b"));
    }

    #[test]
    fn failure_only_reported_when_all_k_shards_fail() {
        let (mixer, rx) = mixer_capturing();
        let holder = ResultHolder::new(mixer.clone(), REMOTE, 2);
        mixer.set_result(LOCAL, "((value (((tag local)))))".to_string());
        holder.report_failure("shard1 down".to_string());
        assert!(rx.try_recv().is_err());
        holder.report_failure("shard2 down".to_string());
        let response = rx.recv().unwrap();
        assert!(response.contains("tag local"));
    }
}
