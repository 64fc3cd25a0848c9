mod claude;
mod judge;

pub use claude::{ClaudeJudge, DEFAULT_API_URL, DEFAULT_MODEL};
pub use judge::{parse_judgment, AiJudge, JudgeRequest, Judgment, AUDIT_PREFIX};
