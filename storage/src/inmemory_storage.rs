// storage/src/inmemory_storage.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use models::{NewPatient, Patient, PatientUpdate, StoreResult};

use crate::patient_store::PatientStore;
use crate::query::{paginate, sort_patients, PatientFilter, PatientQuery};

/// An in-memory record store backed by a `BTreeMap`, so scans come back
/// in the same id order the sled store produces. Used as the test double
/// behind the HTTP handlers.
#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    patients: Arc<RwLock<BTreeMap<Uuid, Patient>>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        InMemoryPatientStore::default()
    }
}

#[async_trait]
impl PatientStore for InMemoryPatientStore {
    async fn insert(&self, new: NewPatient) -> StoreResult<Patient> {
        let patient = new.into_patient(Uuid::new_v4());
        let mut patients = self.patients.write().await;
        patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn get(&self, id: &Uuid) -> StoreResult<Option<Patient>> {
        let patients = self.patients.read().await;
        Ok(patients.get(id).cloned())
    }

    async fn update(&self, id: &Uuid, update: PatientUpdate) -> StoreResult<Option<Patient>> {
        let mut patients = self.patients.write().await;
        match patients.get_mut(id) {
            Some(patient) => {
                update.apply(patient);
                Ok(Some(patient.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &Uuid) -> StoreResult<u64> {
        let mut patients = self.patients.write().await;
        Ok(if patients.remove(id).is_some() { 1 } else { 0 })
    }

    async fn count(&self, filter: &PatientFilter) -> StoreResult<u64> {
        let patients = self.patients.read().await;
        Ok(patients.values().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn find(&self, query: &PatientQuery) -> StoreResult<Vec<Patient>> {
        let patients = self.patients.read().await;
        let mut matched: Vec<Patient> = patients
            .values()
            .filter(|p| query.filter.matches(p))
            .cloned()
            .collect();
        drop(patients);
        sort_patients(&mut matched, query);
        Ok(paginate(matched, query))
    }

    async fn all(&self) -> StoreResult<Vec<Patient>> {
        let patients = self.patients.read().await;
        Ok(patients.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_patient(name: &str, department: &str, age: i64) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            department: department.to_string(),
            age,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn should_assign_distinct_ids_on_insert() {
        let store = InMemoryPatientStore::new();
        let a = store.insert(new_patient("Ada", "ICU", 36)).await.unwrap();
        let b = store.insert(new_patient("Bob", "ER", 50)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count(&PatientFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn should_update_only_supplied_fields() {
        let store = InMemoryPatientStore::new();
        let created = store.insert(new_patient("Ada", "ICU", 36)).await.unwrap();
        let update = PatientUpdate {
            phone: Some("555-0100".to_string()),
            ..Default::default()
        };
        let updated = store.update(&created.id, update).await.unwrap().unwrap();
        assert_eq!(updated.phone, "555-0100");
        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.admission_date, created.admission_date);
    }

    #[tokio::test]
    async fn should_count_zero_after_double_delete() {
        let store = InMemoryPatientStore::new();
        let created = store.insert(new_patient("Ada", "ICU", 36)).await.unwrap();
        assert_eq!(store.delete(&created.id).await.unwrap(), 1);
        assert_eq!(store.delete(&created.id).await.unwrap(), 0);
        assert_eq!(store.count(&PatientFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn should_filter_and_page_results() {
        let store = InMemoryPatientStore::new();
        for i in 0..15 {
            store
                .insert(new_patient(&format!("Patient {:02}", i), "ER", i))
                .await
                .unwrap();
        }
        let query = PatientQuery {
            filter: PatientFilter::new(None, Some("ER")).unwrap(),
            sort_by: "age".to_string(),
            order: crate::query::SortOrder::Ascending,
            page: 2,
            per_page: 10,
        };
        let page = store.find(&query).await.unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].age, 10);
    }
}
