//! Shared fakes for integration tests: a scripted `Prober` standing in for real
//! network/database I/O, the same dependency-injection seam the core's unit
//! tests use (`sentryd::core::prober::Prober`).

use async_trait::async_trait;
use sentryd::config::Target;
use sentryd::error::ProbeError;
use std::sync::Mutex;

/// Replays a fixed queue of outcomes, one per call; repeats the last entry
/// once exhausted so a test doesn't need to size the queue exactly.
pub struct ScriptedProber {
    script: Mutex<Vec<Result<(), ProbeError>>>,
}

impl ScriptedProber {
    pub fn new(script: Vec<Result<(), ProbeError>>) -> Self {
        assert!(!script.is_empty(), "ScriptedProber needs at least one outcome");
        Self {
            script: Mutex::new(script),
        }
    }

    pub fn always_ok() -> Self {
        Self::new(vec![Ok(())])
    }
}

#[async_trait]
impl sentryd::core::prober::Prober for ScriptedProber {
    async fn attempt(&self, _target: &Target) -> Result<(), ProbeError> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}
