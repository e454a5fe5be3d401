//! Case report model and the pure operations on it.

pub mod identifier;
pub mod merge;
pub mod report;

pub use merge::{Merge, MatchResult};
pub use report::{
    CaseReport, CodedValue, Diagnosis, Facility, LabOrderCode, LabResult, Name, Patient, Provider,
    TypeableId,
};
