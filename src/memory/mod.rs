//! 记忆层：对话消息（历史由调用方提供，本 crate 不做持久化）

pub mod conversation;

pub use conversation::{Message, Role};
