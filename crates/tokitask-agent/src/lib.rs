//! Schedule agents and the plan pipeline around them: prompt construction,
//! reply parsing and reconciliation with local task state.

pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod reconcile;
pub mod reply;
