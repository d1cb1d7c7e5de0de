//! Form-input rendezvous.
//!
//! At most one form per root plan is live at a time. A slot is acquired
//! exclusively; concurrent attempts wait until the slot frees or the lock
//! timeout elapses. While a form is live the agent polls its gate on a
//! bounded interval with a separate, longer interruption recheck, and
//! treats interruption as timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stride_contract::tool::{GateStatus, Tool};
use stride_contract::{InterruptionRegistry, StrideConfig};
use tokio::sync::Notify;

struct FormSlot {
    tool: Arc<dyn Tool>,
    owner_plan_id: String,
}

/// Exclusive form slots keyed by root plan id.
pub struct FormInputService {
    slots: Mutex<HashMap<String, FormSlot>>,
    freed: Notify,
    lock_timeout: Duration,
}

impl FormInputService {
    pub fn new(lock_timeout_ms: u64) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            freed: Notify::new(),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
        }
    }

    /// Acquire the slot for a root plan. Waits for a busy slot up to the
    /// lock timeout; returns `false` on timeout or when the tool has no
    /// input gate.
    pub async fn store_exclusive(
        &self,
        root_plan_id: &str,
        tool: Arc<dyn Tool>,
        current_plan_id: &str,
    ) -> bool {
        if tool.input_gate().is_none() {
            return false;
        }
        let deadline = tokio::time::Instant::now() + self.lock_timeout;
        loop {
            {
                let mut slots = match self.slots.lock() {
                    Ok(slots) => slots,
                    Err(_) => return false,
                };
                if !slots.contains_key(root_plan_id) {
                    slots.insert(
                        root_plan_id.to_string(),
                        FormSlot {
                            tool,
                            owner_plan_id: current_plan_id.to_string(),
                        },
                    );
                    return true;
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::warn!(
                    root_plan_id,
                    current_plan_id,
                    "form slot acquisition timed out"
                );
                return false;
            }
            let wait = (deadline - now).min(Duration::from_millis(50));
            tokio::select! {
                _ = self.freed.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Currently live form tool for a root plan, if any.
    pub fn get(&self, root_plan_id: &str) -> Option<Arc<dyn Tool>> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(root_plan_id).map(|s| s.tool.clone()))
    }

    /// Plan that owns the live form for a root plan.
    pub fn owner(&self, root_plan_id: &str) -> Option<String> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(root_plan_id).map(|s| s.owner_plan_id.clone()))
    }

    /// Release the slot and wake any waiters.
    pub fn remove(&self, root_plan_id: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(root_plan_id);
        }
        self.freed.notify_waiters();
    }

    /// Deliver a user submission into the live form for a root plan.
    pub fn submit_input(&self, root_plan_id: &str, values: serde_json::Value) -> bool {
        match self.get(root_plan_id).and_then(|tool| {
            tool.input_gate().map(|gate| gate.receive(values.clone()))
        }) {
            Some(()) => true,
            None => false,
        }
    }
}

/// Poll a form tool's gate until input arrives or the wait times out.
/// Interruption is checked on its own interval and treated as timeout.
pub async fn wait_for_input_or_timeout(
    tool: &dyn Tool,
    interruption: &InterruptionRegistry,
    root_plan_id: &str,
    config: &StrideConfig,
) {
    let Some(gate) = tool.input_gate() else {
        return;
    };
    let start = tokio::time::Instant::now();
    let mut last_interruption_check = start;
    let timeout = Duration::from_secs(config.user_input_timeout_secs);
    let poll = Duration::from_millis(config.form_poll_interval_ms.max(1));
    let recheck = Duration::from_millis(config.interruption_recheck_ms.max(1));

    while gate.status() == GateStatus::AwaitingUserInput {
        let now = tokio::time::Instant::now();

        if now - last_interruption_check >= recheck {
            if !interruption.check_and_continue(root_plan_id) {
                tracing::info!(root_plan_id, "user input wait interrupted");
                gate.timeout();
                break;
            }
            last_interruption_check = now;
        }

        if now - start > timeout {
            tracing::warn!(root_plan_id, "timeout waiting for user input");
            gate.timeout();
            break;
        }

        tokio::time::sleep(poll).await;
    }
}
