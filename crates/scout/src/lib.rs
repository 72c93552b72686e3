pub mod agent;
pub mod condense;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod rephrase;
pub mod search;
pub mod tools;
