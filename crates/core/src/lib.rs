//! Domain logic of the diagnostic interview: answer labels, the AI
//! collaborators (classifier, follow-up generator, curriculum generator),
//! topic extraction and roadmap synthesis. Nothing here talks to a database
//! or speaks HTTP.

pub mod classifier;
pub mod curriculum;
pub mod diagnostic;
pub mod followup;
pub mod label;
pub mod lesson;
pub mod llm_client;
pub mod roadmap;
pub mod topic;

pub use label::KnowledgeLabel;
