// storage/src/sled_storage.rs

use std::path::Path;

use async_trait::async_trait;
use sled::{Db, IVec, Tree};
use tracing::info;
use uuid::Uuid;

use models::{NewPatient, Patient, PatientUpdate, StoreError, StoreResult};

use crate::patient_store::PatientStore;
use crate::query::{paginate, sort_patients, PatientFilter, PatientQuery, SortOrder};

const PATIENTS_TREE: &str = "patients";
const NAME_INDEX_TREE: &str = "patients_by_name";
const DEPARTMENT_INDEX_TREE: &str = "patients_by_department";

/// Opens (or creates) a sled database at the given path.
pub fn open_sled_db<P: AsRef<Path>>(path: P) -> StoreResult<Db> {
    let db = sled::open(path.as_ref())
        .map_err(|e| StoreError::StorageError(format!("Failed to open sled database: {}", e)))?;
    info!("Opened sled database at {}", path.as_ref().display());
    Ok(db)
}

fn open_tree(db: &Db, name: &str) -> StoreResult<Tree> {
    db.open_tree(name)
        .map_err(|e| StoreError::StorageError(format!("Failed to open tree {}: {}", name, e)))
}

/// Index keys are the field value, a zero byte, then the record id, with
/// the id repeated as the entry value. Scanning an index tree therefore
/// yields records in field order, and a prefix scan on a value yields the
/// records holding exactly that value.
fn index_key(value: &str, id: &Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(value.len() + 1 + 16);
    key.extend_from_slice(value.as_bytes());
    key.push(0);
    key.extend_from_slice(id.as_bytes());
    key
}

fn encode_patient(patient: &Patient) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(patient)
        .map_err(|e| StoreError::SerializationError(format!("Failed to encode record: {}", e)))
}

fn decode_patient(bytes: &[u8]) -> StoreResult<Patient> {
    serde_json::from_slice(bytes)
        .map_err(|e| StoreError::DeserializationError(format!("Corrupt record: {}", e)))
}

fn decode_index_id(bytes: &[u8]) -> StoreResult<Uuid> {
    Uuid::from_slice(bytes)
        .map_err(|e| StoreError::DeserializationError(format!("Corrupt index entry: {}", e)))
}

/// A sled-backed record store.
///
/// Records live in the `patients` tree keyed by the raw id bytes and
/// encoded as JSON. Two index trees, one per indexed field, serve exact
/// department lookups and field-ordered scans. Index entries are written
/// and removed together with their record.
#[derive(Debug, Clone)]
pub struct SledPatientStore {
    db: Db,
    patients: Tree,
    name_index: Tree,
    department_index: Tree,
}

impl SledPatientStore {
    /// Opens the store's trees, creating them on first use.
    pub fn new(db: Db) -> StoreResult<Self> {
        let patients = open_tree(&db, PATIENTS_TREE)?;
        let name_index = open_tree(&db, NAME_INDEX_TREE)?;
        let department_index = open_tree(&db, DEPARTMENT_INDEX_TREE)?;
        Ok(SledPatientStore {
            db,
            patients,
            name_index,
            department_index,
        })
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, id: &Uuid) -> StoreResult<Option<Patient>> {
        let bytes = self
            .patients
            .get(id.as_bytes())
            .map_err(|e| StoreError::StorageError(format!("Failed to read record: {}", e)))?;
        match bytes {
            Some(ivec) => Ok(Some(decode_patient(&ivec)?)),
            None => Ok(None),
        }
    }

    fn write_index(&self, tree: &Tree, value: &str, id: &Uuid) -> StoreResult<()> {
        tree.insert(index_key(value, id), id.as_bytes().to_vec())
            .map_err(|e| StoreError::StorageError(format!("Failed to write index: {}", e)))?;
        Ok(())
    }

    fn remove_index(&self, tree: &Tree, value: &str, id: &Uuid) -> StoreResult<()> {
        tree.remove(index_key(value, id))
            .map_err(|e| StoreError::StorageError(format!("Failed to remove index entry: {}", e)))?;
        Ok(())
    }

    /// Loads the records matching a filter. An exact department criterion
    /// narrows the scan to the department index prefix; anything else is a
    /// full scan of the records tree.
    fn filtered(&self, filter: &PatientFilter) -> StoreResult<Vec<Patient>> {
        let mut patients = Vec::new();
        if let Some(department) = filter.department() {
            let mut prefix = department.as_bytes().to_vec();
            prefix.push(0);
            for item in self.department_index.scan_prefix(&prefix) {
                let (_, id_bytes) = item.map_err(|e| {
                    StoreError::StorageError(format!("Failed to scan department index: {}", e))
                })?;
                let id = decode_index_id(&id_bytes)?;
                if let Some(patient) = self.load(&id)? {
                    if filter.matches(&patient) {
                        patients.push(patient);
                    }
                }
            }
            return Ok(patients);
        }
        for item in self.patients.iter() {
            let (_, value) = item
                .map_err(|e| StoreError::StorageError(format!("Failed to iterate records: {}", e)))?;
            let patient = decode_patient(&value)?;
            if filter.matches(&patient) {
                patients.push(patient);
            }
        }
        Ok(patients)
    }

    /// Serves an unfiltered query sorted on an indexed field straight off
    /// the index tree, stopping once the page window is full.
    fn find_via_index(&self, tree: &Tree, query: &PatientQuery) -> StoreResult<Vec<Patient>> {
        let entries: Box<dyn Iterator<Item = sled::Result<(IVec, IVec)>>> = match query.order {
            SortOrder::Ascending => Box::new(tree.iter()),
            SortOrder::Descending => Box::new(tree.iter().rev()),
        };
        let mut skip = query.skip();
        let mut patients = Vec::new();
        for item in entries {
            let (_, id_bytes) = item
                .map_err(|e| StoreError::StorageError(format!("Failed to scan index: {}", e)))?;
            if skip > 0 {
                skip -= 1;
                continue;
            }
            if patients.len() as u64 >= query.per_page {
                break;
            }
            let id = decode_index_id(&id_bytes)?;
            if let Some(patient) = self.load(&id)? {
                patients.push(patient);
            }
        }
        Ok(patients)
    }
}

#[async_trait]
impl PatientStore for SledPatientStore {
    async fn insert(&self, new: NewPatient) -> StoreResult<Patient> {
        let patient = new.into_patient(Uuid::new_v4());
        let bytes = encode_patient(&patient)?;
        self.patients
            .insert(patient.id.as_bytes(), bytes)
            .map_err(|e| StoreError::StorageError(format!("Failed to insert record: {}", e)))?;
        self.write_index(&self.name_index, &patient.name, &patient.id)?;
        self.write_index(&self.department_index, &patient.department, &patient.id)?;
        Ok(patient)
    }

    async fn get(&self, id: &Uuid) -> StoreResult<Option<Patient>> {
        self.load(id)
    }

    async fn update(&self, id: &Uuid, update: PatientUpdate) -> StoreResult<Option<Patient>> {
        let mut patient = match self.load(id)? {
            Some(patient) => patient,
            None => return Ok(None),
        };
        let old_name = patient.name.clone();
        let old_department = patient.department.clone();

        update.apply(&mut patient);
        let bytes = encode_patient(&patient)?;
        self.patients
            .insert(id.as_bytes(), bytes)
            .map_err(|e| StoreError::StorageError(format!("Failed to update record: {}", e)))?;

        if patient.name != old_name {
            self.remove_index(&self.name_index, &old_name, id)?;
            self.write_index(&self.name_index, &patient.name, id)?;
        }
        if patient.department != old_department {
            self.remove_index(&self.department_index, &old_department, id)?;
            self.write_index(&self.department_index, &patient.department, id)?;
        }
        Ok(Some(patient))
    }

    async fn delete(&self, id: &Uuid) -> StoreResult<u64> {
        let removed = self
            .patients
            .remove(id.as_bytes())
            .map_err(|e| StoreError::StorageError(format!("Failed to delete record: {}", e)))?;
        match removed {
            Some(bytes) => {
                let patient = decode_patient(&bytes)?;
                self.remove_index(&self.name_index, &patient.name, id)?;
                self.remove_index(&self.department_index, &patient.department, id)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count(&self, filter: &PatientFilter) -> StoreResult<u64> {
        if filter.is_empty() {
            return Ok(self.patients.len() as u64);
        }
        Ok(self.filtered(filter)?.len() as u64)
    }

    async fn find(&self, query: &PatientQuery) -> StoreResult<Vec<Patient>> {
        if query.filter.is_empty() {
            match query.sort_by.as_str() {
                "name" => return self.find_via_index(&self.name_index, query),
                "department" => return self.find_via_index(&self.department_index, query),
                _ => {}
            }
        }
        let mut patients = self.filtered(&query.filter)?;
        sort_patients(&mut patients, query);
        Ok(paginate(patients, query))
    }

    async fn all(&self) -> StoreResult<Vec<Patient>> {
        let mut patients = Vec::new();
        for item in self.patients.iter() {
            let (_, value) = item
                .map_err(|e| StoreError::StorageError(format!("Failed to iterate records: {}", e)))?;
            patients.push(decode_patient(&value)?);
        }
        Ok(patients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortOrder;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SledPatientStore {
        let db = open_sled_db(dir.path()).unwrap();
        SledPatientStore::new(db).unwrap()
    }

    fn new_patient(name: &str, department: &str, age: i64) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            department: department.to_string(),
            age,
            ..Default::default()
        }
    }

    fn names(patients: &[Patient]) -> Vec<&str> {
        patients.iter().map(|p| p.name.as_str()).collect()
    }

    #[tokio::test]
    async fn should_insert_and_fetch_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let created = store.insert(new_patient("Ada", "ICU", 36)).await.unwrap();
        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.status, "admitted");
    }

    #[tokio::test]
    async fn should_return_none_for_unknown_id() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.get(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_update_record_and_move_index_entries() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let created = store.insert(new_patient("Ada", "ER", 36)).await.unwrap();

        let update = PatientUpdate {
            department: Some("ICU".to_string()),
            age: Some(37),
            ..Default::default()
        };
        let updated = store.update(&created.id, update).await.unwrap().unwrap();
        assert_eq!(updated.department, "ICU");
        assert_eq!(updated.age, 37);
        assert_eq!(updated.admission_date, created.admission_date);

        let er = PatientFilter::new(None, Some("ER")).unwrap();
        let icu = PatientFilter::new(None, Some("ICU")).unwrap();
        assert_eq!(store.count(&er).await.unwrap(), 0);
        assert_eq!(store.count(&icu).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn should_report_missing_record_on_update() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let update = PatientUpdate {
            age: Some(50),
            ..Default::default()
        };
        assert!(store.update(&Uuid::new_v4(), update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_delete_idempotently() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let created = store.insert(new_patient("Ada", "ICU", 36)).await.unwrap();
        assert_eq!(store.delete(&created.id).await.unwrap(), 1);
        assert_eq!(store.delete(&created.id).await.unwrap(), 0);
        assert!(store.get(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_clean_indexes_on_delete() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let ada = store.insert(new_patient("Ada", "ICU", 36)).await.unwrap();
        store.insert(new_patient("Bob", "ICU", 50)).await.unwrap();
        store.delete(&ada.id).await.unwrap();

        let icu = PatientFilter::new(None, Some("ICU")).unwrap();
        assert_eq!(store.count(&icu).await.unwrap(), 1);

        let query = PatientQuery {
            sort_by: "name".to_string(),
            order: SortOrder::Ascending,
            ..Default::default()
        };
        assert_eq!(names(&store.find(&query).await.unwrap()), vec!["Bob"]);
    }

    #[tokio::test]
    async fn should_page_in_index_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for name in ["Cara", "Ada", "Dan", "Bob"] {
            store.insert(new_patient(name, "ER", 40)).await.unwrap();
        }

        let mut query = PatientQuery {
            sort_by: "name".to_string(),
            order: SortOrder::Ascending,
            page: 1,
            per_page: 2,
            ..Default::default()
        };
        assert_eq!(names(&store.find(&query).await.unwrap()), vec!["Ada", "Bob"]);

        query.page = 2;
        assert_eq!(names(&store.find(&query).await.unwrap()), vec!["Cara", "Dan"]);

        query.page = 1;
        query.order = SortOrder::Descending;
        assert_eq!(names(&store.find(&query).await.unwrap()), vec!["Dan", "Cara"]);
    }

    #[tokio::test]
    async fn should_combine_search_and_department_filters() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.insert(new_patient("Ada Lovelace", "ICU", 36)).await.unwrap();
        store.insert(new_patient("Ada Byron", "ER", 36)).await.unwrap();
        store.insert(new_patient("Bob", "ICU", 50)).await.unwrap();

        let filter = PatientFilter::new(Some("ada"), Some("ICU")).unwrap();
        assert_eq!(store.count(&filter).await.unwrap(), 1);

        let query = PatientQuery {
            filter,
            ..Default::default()
        };
        assert_eq!(names(&store.find(&query).await.unwrap()), vec!["Ada Lovelace"]);
    }

    #[tokio::test]
    async fn should_keep_records_across_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = open_store(&dir);
            let created = store.insert(new_patient("Ada", "ICU", 36)).await.unwrap();
            store.flush().unwrap();
            created.id
        };
        let store = open_store(&dir);
        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Ada");
    }
}
