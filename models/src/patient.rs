// models/src/patient.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ValidationError, ValidationResult};

/// Status assigned to records created without an explicit status.
pub const DEFAULT_STATUS: &str = "admitted";

/// A single patient record as stored and served by the API.
///
/// `id` and `admission_date` are assigned by the store when the record is
/// created and never change afterwards. All other fields are mutable
/// through partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub department: String,
    pub phone: String,
    pub address: String,
    pub notes: String,
    pub admission_date: DateTime<Utc>,
    pub status: String,
}

/// A creation payload: a record with the server-assigned fields absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub department: String,
    pub phone: String,
    pub address: String,
    pub notes: String,
    pub status: String,
}

impl Default for NewPatient {
    fn default() -> Self {
        NewPatient {
            name: String::new(),
            age: 0,
            gender: String::new(),
            department: String::new(),
            phone: String::new(),
            address: String::new(),
            notes: String::new(),
            status: DEFAULT_STATUS.to_string(),
        }
    }
}

impl NewPatient {
    /// Materializes a full record under the given id, stamping the
    /// admission date with the current time.
    pub fn into_patient(self, id: Uuid) -> Patient {
        Patient {
            id,
            name: self.name,
            age: self.age,
            gender: self.gender,
            department: self.department,
            phone: self.phone,
            address: self.address,
            notes: self.notes,
            admission_date: Utc::now(),
            status: self.status,
        }
    }
}

/// The set of fields a partial update may touch. A `None` field is left
/// alone; everything else (including the id and admission date) is not
/// representable here and therefore cannot be overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

impl PatientUpdate {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.department.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.notes.is_none()
            && self.status.is_none()
    }

    /// Applies every supplied field to the record, leaving the rest as
    /// they were.
    pub fn apply(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.clone();
        }
        if let Some(age) = self.age {
            patient.age = age;
        }
        if let Some(gender) = &self.gender {
            patient.gender = gender.clone();
        }
        if let Some(department) = &self.department {
            patient.department = department.clone();
        }
        if let Some(phone) = &self.phone {
            patient.phone = phone.clone();
        }
        if let Some(address) = &self.address {
            patient.address = address.clone();
        }
        if let Some(notes) = &self.notes {
            patient.notes = notes.clone();
        }
        if let Some(status) = &self.status {
            patient.status = status.clone();
        }
    }
}

/// An age as it arrives over the wire. Clients send ages both as JSON
/// numbers and as digit strings (CSV uploads always produce strings), so
/// all three forms are accepted and resolved to a stored integer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AgeInput {
    Number(i64),
    Float(f64),
    Text(String),
}

impl AgeInput {
    /// Coerces the input into an integer age.
    ///
    /// # Errors
    /// Returns a `ValidationError` when a textual age does not parse as an
    /// integer. Fractional ages are truncated.
    pub fn resolve(&self) -> ValidationResult<i64> {
        match self {
            AgeInput::Number(n) => Ok(*n),
            AgeInput::Float(f) => Ok(*f as i64),
            AgeInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::InvalidAge(s.clone())),
        }
    }
}
