//! swagfuzz-runner: Swagger-driven fuzzing engine
//!
//! Loads the API description, generates schema-conformant cases, sends them,
//! validates responses and shrinks the failing ones.

pub mod builder;
pub mod checks;
pub mod engine;
pub mod generator;
pub mod shrink;
pub mod spec;
pub mod transport;

pub use builder::{BuildError, build_request};
pub use checks::{CheckInput, Pipeline, Validator, ValidatorFault};
pub use engine::{CancelToken, Engine, Execution, RunContext, RunError, RunSettings};
pub use generator::{CaseGenerator, CaseInstance, Deviation};
pub use shrink::{ShrinkOutcome, shrink};
pub use spec::{SpecError, SpecModel};
pub use transport::{HttpTransport, Response, Transport, TransportError};
