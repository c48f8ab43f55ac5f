//! The mapper interface: typed call inputs/outputs, output validation,
//! and a trivial reference mapper used by tests.
//!
//! A real mapper implementation is explicitly out of scope (spec.md §1);
//! this crate only defines the seam the context calls through and the
//! validation the context applies to whatever comes back across it.

pub mod calls;
pub mod mapper_trait;
pub mod trivial;
pub mod validate;

pub use calls::*;
pub use mapper_trait::Mapper;
pub use trivial::TrivialMapper;
pub use validate::{MapperValidator, MapperViolation};
