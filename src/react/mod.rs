//! 推理层：通用 ReAct 循环（Think / Act / Observe / Reflect）、能力集与过程事件

pub mod actions;
pub mod events;
pub mod loop_;
pub mod step;

pub use actions::{Action, ActionSet};
pub use events::{send_event, EventSender, RunEvent};
pub use loop_::{format_history, ReActConfig, ReActLoop, ReActOutcome, DEFAULT_STOP_PHRASES};
pub use step::{ActionCall, ReActStep, ThoughtReply, FINISH_ACTION};
