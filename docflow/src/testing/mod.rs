//! Test doubles and fixtures for exercising pipelines without a real
//! generation backend.

mod fixtures;
mod mocks;

pub use fixtures::sample_resume_document;
pub use mocks::{
    ScriptedGenerationService, ScriptedOutcome, StaticDocumentSource, StaticPreferenceStore,
};
