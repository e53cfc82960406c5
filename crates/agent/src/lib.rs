//! Agent runtime for the AR assistant.
//!
//! A turn runs a constrained loop:
//! 1. **Classification** (`guardrails`) - the AI engine labels the utterance;
//!    malformed or missing replies fall back to a keyword heuristic.
//! 2. **Intent lock** - an active invoice session can reclaim follow-ups the
//!    classifier mislabels.
//! 3. **Deterministic handlers** (`handlers`) - invoice search, PDF download,
//!    statement of account and customer analytics render fixed text from
//!    backend data.
//! 4. **Generic answer** - any other category goes to the AI engine.
//!
//! The model never produces the text of a deterministic reply. It only
//! picks the category and supplies first-turn hints.

pub mod conversation;
pub mod guardrails;
pub mod handlers;
pub mod llm;
pub mod prompts;
pub mod runtime;

#[cfg(test)]
pub(crate) mod fakes;
