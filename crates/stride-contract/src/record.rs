//! Recorder contract: lifecycle and think/act observability.
//!
//! Recording failures must never affect execution; callers log and
//! continue. The in-memory recorder backs tests and embedding scenarios.

use crate::plan::{Plan, Step};
use std::sync::Mutex;

/// One tool invocation inside a think/act record.
#[derive(Debug, Clone)]
pub struct ActToolParam {
    pub name: String,
    /// JSON-encoded arguments as the LLM emitted them.
    pub parameters: String,
    pub result: Option<String>,
    pub tool_call_id: String,
}

impl ActToolParam {
    pub fn new(
        name: impl Into<String>,
        parameters: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into(),
            result: None,
            tool_call_id: tool_call_id.into(),
        }
    }
}

/// One reason/act cycle as observed by the recorder.
#[derive(Debug, Clone)]
pub struct ThinkActRecord {
    pub think_act_id: String,
    pub step_id: String,
    pub think_input: String,
    pub think_output: String,
    pub error_message: Option<String>,
    pub input_chars: usize,
    pub output_chars: usize,
    pub tools: Vec<ActToolParam>,
}

/// Progress sink consumed by the executor and agents.
pub trait Recorder: Send + Sync {
    fn record_plan_start(&self, plan: &Plan);
    fn record_step_start(&self, step: &Step, plan_id: &str);
    fn record_step_end(&self, step: &Step, plan_id: &str);
    fn record_thinking_and_action(&self, step: &Step, record: ThinkActRecord);
    fn record_action_result(&self, params: &[ActToolParam]);
    fn record_complete(&self, step: &Step);
}

/// Recorder that drops everything.
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record_plan_start(&self, _plan: &Plan) {}
    fn record_step_start(&self, _step: &Step, _plan_id: &str) {}
    fn record_step_end(&self, _step: &Step, _plan_id: &str) {}
    fn record_thinking_and_action(&self, _step: &Step, _record: ThinkActRecord) {}
    fn record_action_result(&self, _params: &[ActToolParam]) {}
    fn record_complete(&self, _step: &Step) {}
}

/// Recorded event kinds, for assertions in tests.
#[derive(Debug, Clone)]
pub enum RecordedEvent {
    PlanStart { plan_id: String },
    StepStart { step_id: String, plan_id: String },
    StepEnd { step_id: String, plan_id: String },
    ThinkAct(ThinkActRecord),
    ActionResult(Vec<ActToolParam>),
    Complete { step_id: String },
}

/// Recorder that appends events to an in-memory log.
#[derive(Default)]
pub struct InMemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: RecordedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Number of think/act records observed.
    pub fn think_act_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RecordedEvent::ThinkAct(_)))
            .count()
    }
}

impl Recorder for InMemoryRecorder {
    fn record_plan_start(&self, plan: &Plan) {
        self.push(RecordedEvent::PlanStart {
            plan_id: plan.current_plan_id.clone(),
        });
    }

    fn record_step_start(&self, step: &Step, plan_id: &str) {
        self.push(RecordedEvent::StepStart {
            step_id: step.step_id.clone(),
            plan_id: plan_id.to_string(),
        });
    }

    fn record_step_end(&self, step: &Step, plan_id: &str) {
        self.push(RecordedEvent::StepEnd {
            step_id: step.step_id.clone(),
            plan_id: plan_id.to_string(),
        });
    }

    fn record_thinking_and_action(&self, _step: &Step, record: ThinkActRecord) {
        self.push(RecordedEvent::ThinkAct(record));
    }

    fn record_action_result(&self, params: &[ActToolParam]) {
        self.push(RecordedEvent::ActionResult(params.to_vec()));
    }

    fn record_complete(&self, step: &Step) {
        self.push(RecordedEvent::Complete {
            step_id: step.step_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Step;

    #[test]
    fn in_memory_recorder_keeps_order() {
        let recorder = InMemoryRecorder::new();
        let plan = Plan::new("p1", "t");
        let step = Step::new("s1", "req");
        recorder.record_plan_start(&plan);
        recorder.record_step_start(&step, "p1");
        recorder.record_step_end(&step, "p1");

        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], RecordedEvent::PlanStart { plan_id } if plan_id == "p1"));
        assert!(matches!(&events[2], RecordedEvent::StepEnd { step_id, .. } if step_id == "s1"));
    }

    #[test]
    fn think_act_count_counts_only_think_acts() {
        let recorder = InMemoryRecorder::new();
        let step = Step::new("s1", "req");
        recorder.record_action_result(&[]);
        recorder.record_thinking_and_action(
            &step,
            ThinkActRecord {
                think_act_id: "ta1".into(),
                step_id: "s1".into(),
                think_input: String::new(),
                think_output: String::new(),
                error_message: None,
                input_chars: 0,
                output_chars: 0,
                tools: vec![],
            },
        );
        assert_eq!(recorder.think_act_count(), 1);
    }
}
