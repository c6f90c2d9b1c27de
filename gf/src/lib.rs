//! gameforge - multi-stage LLM pipeline for small browser arcade games
//!
//! A run turns an optional seed into a playable single-canvas JavaScript game:
//!
//! ```text
//! design chain ──▶ planner ──▶ step loop ──────────────────────▶ final assembly
//!  idea, loop,       build      generate → validate → [repair]     sanity, probe,
//!  mechanics, win,   steps      → merge into the program           compliance,
//!  entities, ...                                                   feedback
//! ```
//!
//! # Modules
//!
//! - [`llm`] - provider clients and the gateway (timeouts, retries, JSON schema)
//! - [`source`] - JavaScript tokenizer and top-level statement splitter
//! - [`merge`] - folds a code fragment into the accumulated program
//! - [`validation`] - static validator and platform rule compliance
//! - [`design`] - design and planning stages
//! - [`build`] - per-step execution and final checks
//! - [`pipeline`] - the orchestrator and run state
//! - [`events`] - progress events, event bus and JSONL log
//! - [`prompts`] - Handlebars prompt templates
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod build;
pub mod cli;
pub mod config;
pub mod design;
pub mod events;
pub mod llm;
pub mod merge;
pub mod pipeline;
pub mod prompts;
pub mod source;
pub mod validation;
