// Proposal generation pipeline.
// Implements: validation, fingerprint cache, rate limiting, template/prompt
// build, gateway call with retry, response normalization.
// All LLM calls go through llm_client — no direct provider calls here.

pub mod cache;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod prompt_builder;
pub mod rate_limiter;
pub mod service;
pub mod templates;
