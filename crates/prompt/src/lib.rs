//! Prompt system for docqa.
//!
//! This crate provides structured prompt management with:
//! - Built-in YAML prompt definitions (`answer.default`, `answer.correction`,
//!   `intent.classify`)
//! - Workspace overrides from `.docqa/prompts/<id>.yml`
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{list_prompts, load_prompt, prompts_dir};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec, PromptSource};
