pub mod appraisal;
pub mod emotion;
pub mod expression;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod reflection;
