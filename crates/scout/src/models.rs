//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - openai chat messages/tools, sent from the agent to the LLM
//! - anthropic messages, sent from the agent to the LLM
//! - tool results, produced by the executor from search backend responses
//!
//! We always immediately convert those wire formats into the internal structs using
//! to/from helpers in the providers, so the rest of the crate only deals with these.
pub mod message;
pub mod role;
pub mod tool;
