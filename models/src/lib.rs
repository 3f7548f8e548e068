// models/src/lib.rs

pub mod errors;
pub mod patient;

pub use errors::{StoreError, StoreResult, ValidationError, ValidationResult};
pub use patient::{AgeInput, NewPatient, Patient, PatientUpdate};
