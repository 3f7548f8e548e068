// storage/src/patient_store.rs

use std::fmt::Debug;

use async_trait::async_trait;
use uuid::Uuid;

use models::{NewPatient, Patient, PatientUpdate, StoreResult};

use crate::query::{PatientFilter, PatientQuery};

/// The persistence boundary for patient records.
///
/// Handlers hold this as a trait object, so the sled-backed store and the
/// in-memory store used by the test suite are interchangeable.
#[async_trait]
pub trait PatientStore: Send + Sync + Debug + 'static {
    /// Inserts a new record, assigning its id and admission date.
    async fn insert(&self, new: NewPatient) -> StoreResult<Patient>;

    /// Fetches a record by id.
    async fn get(&self, id: &Uuid) -> StoreResult<Option<Patient>>;

    /// Applies a partial update and returns the updated record, or `None`
    /// when no record with the id exists.
    async fn update(&self, id: &Uuid, update: PatientUpdate) -> StoreResult<Option<Patient>>;

    /// Removes a record, returning the number of records removed (0 or 1).
    async fn delete(&self, id: &Uuid) -> StoreResult<u64>;

    /// Counts the records matching a filter.
    async fn count(&self, filter: &PatientFilter) -> StoreResult<u64>;

    /// Runs a filtered, sorted, paginated query.
    async fn find(&self, query: &PatientQuery) -> StoreResult<Vec<Patient>>;

    /// Returns every record in stable key order, for exports.
    async fn all(&self) -> StoreResult<Vec<Patient>>;
}
