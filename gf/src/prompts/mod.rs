//! Prompt Template System
//!
//! Every LLM stage renders its prompt from a `.pmt` template.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{name}.pmt` (config override)
//! 2. Embedded default compiled into the binary
//!
//! Templates use Handlebars syntax in strict mode.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
