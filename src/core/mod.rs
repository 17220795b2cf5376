//! Core experiment types

pub mod event;
pub mod model;
pub mod subject;

pub use event::{Event, EventType};
pub use model::{AudienceCriteria, NewTest, Test, TestResults, TestStatus, Variant};
pub use subject::{Subject, SubjectAttributes, SubjectContext};
