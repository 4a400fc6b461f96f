//! Schema-constrained answer generation over retrieved documents.

pub mod context;
pub mod generator;
pub mod schema;
pub mod types;

pub use generator::Generator;
pub use schema::{AnswerSchema, FieldSpec, FieldType, SchemaViolation};
pub use types::{
    AskOutcome, GenerationDiagnostics, GenerationOutcome, StructuredAnswer, NO_INFORMATION_ANSWER,
};
