//! LLM Provider implementations for RustedCode.
//!
//! All providers implement the `rustedcode_core::Provider` trait. The
//! model-backed decision provider in the agent crate sits on top of them.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
