//! LLM providers for deliberate.
//!
//! Every backend implements [`deliberate_core::Provider`]; the reasoning
//! layer never sees a wire format. [`provider_from_config`] picks the one
//! named by `default_provider`.

pub mod factory;
pub mod openai_compat;

pub use factory::provider_from_config;
pub use openai_compat::OpenAiCompatProvider;
