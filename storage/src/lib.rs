// storage/src/lib.rs

pub mod inmemory_storage;
pub mod patient_store;
pub mod query;
pub mod sled_storage;

pub use inmemory_storage::InMemoryPatientStore;
pub use patient_store::PatientStore;
pub use query::{PatientFilter, PatientQuery, SortOrder, DEFAULT_SORT_FIELD};
pub use sled_storage::{open_sled_db, SledPatientStore};
