//! Persona-consistent conversational agent: affect model, completion gateway,
//! memory, tools and the turn pipeline that sequences them.

pub mod cognition;
pub mod config;
pub mod gateway;
pub mod identity;
pub mod memory;
pub mod runtime;
pub mod tools;
pub mod types;
