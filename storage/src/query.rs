// storage/src/query.rs

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use models::{Patient, ValidationError, ValidationResult};

/// Sort field applied when a query names none.
pub const DEFAULT_SORT_FIELD: &str = "admission_date";

/// Record selection criteria. Both parts are optional; an empty filter
/// matches every record.
#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    search: Option<Regex>,
    department: Option<String>,
}

impl PatientFilter {
    /// Builds a filter from the raw query parameters. Empty strings count
    /// as absent, the search pattern is matched case-insensitively against
    /// the name and phone fields, and the department is an exact match.
    ///
    /// # Errors
    /// Returns a `ValidationError` when the search pattern is not a valid
    /// regular expression.
    pub fn new(search: Option<&str>, department: Option<&str>) -> ValidationResult<Self> {
        let search = match search {
            Some(pattern) if !pattern.is_empty() => Some(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ValidationError::InvalidSearch(e.to_string()))?,
            ),
            _ => None,
        };
        let department = department
            .filter(|d| !d.is_empty())
            .map(|d| d.to_string());
        Ok(PatientFilter { search, department })
    }

    /// True when the record satisfies every set criterion.
    pub fn matches(&self, patient: &Patient) -> bool {
        if let Some(search) = &self.search {
            if !search.is_match(&patient.name) && !search.is_match(&patient.phone) {
                return false;
            }
        }
        if let Some(department) = &self.department {
            if patient.department != *department {
                return false;
            }
        }
        true
    }

    /// True when no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.department.is_none()
    }

    /// The exact-match department criterion, when one is set.
    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    /// Parses the wire form. Only the exact value `"desc"`, or an absent
    /// parameter, selects descending; any other value sorts ascending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("desc") => SortOrder::Descending,
            Some(_) => SortOrder::Ascending,
        }
    }
}

/// A fully resolved list query: filter, sort field and direction, and the
/// page window. `page` is 1-based and `per_page` is already clamped by the
/// caller.
#[derive(Debug, Clone)]
pub struct PatientQuery {
    pub filter: PatientFilter,
    pub sort_by: String,
    pub order: SortOrder,
    pub page: u64,
    pub per_page: u64,
}

impl Default for PatientQuery {
    fn default() -> Self {
        PatientQuery {
            filter: PatientFilter::default(),
            sort_by: DEFAULT_SORT_FIELD.to_string(),
            order: SortOrder::Descending,
            page: 1,
            per_page: 10,
        }
    }
}

impl PatientQuery {
    /// Number of records skipped before the page window starts.
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// Compares two records on a named field. Unknown field names compare
/// everything equal, which leaves the incoming order untouched.
pub fn compare_on(field: &str, a: &Patient, b: &Patient) -> Ordering {
    match field {
        "id" => a.id.cmp(&b.id),
        "name" => a.name.cmp(&b.name),
        "age" => a.age.cmp(&b.age),
        "gender" => a.gender.cmp(&b.gender),
        "department" => a.department.cmp(&b.department),
        "phone" => a.phone.cmp(&b.phone),
        "address" => a.address.cmp(&b.address),
        "notes" => a.notes.cmp(&b.notes),
        "admission_date" => a.admission_date.cmp(&b.admission_date),
        "status" => a.status.cmp(&b.status),
        _ => Ordering::Equal,
    }
}

/// Sorts records in place per the query's sort field and direction. The
/// sort is stable, so ties keep their store order.
pub fn sort_patients(patients: &mut [Patient], query: &PatientQuery) {
    patients.sort_by(|a, b| {
        let ordering = compare_on(&query.sort_by, a, b);
        match query.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

/// Applies the query's page window to an already sorted list.
pub fn paginate(patients: Vec<Patient>, query: &PatientQuery) -> Vec<Patient> {
    patients
        .into_iter()
        .skip(query.skip() as usize)
        .take(query.per_page as usize)
        .collect()
}
