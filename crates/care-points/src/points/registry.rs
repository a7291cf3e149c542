use super::name_key::NameKey;
use super::store::{self, SourceState, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PERSONS_FILE: &str = "persons.csv";
pub const FACILITIES_FILE: &str = "facilities.csv";
pub const ACTIVITIES_FILE: &str = "activities.csv";

const PERSON_COLUMNS: [&str; 4] = ["display_name", "facility", "memo", "birthdate"];
const FACILITY_COLUMNS: [&str; 1] = ["facility_name"];
const ACTIVITY_COLUMNS: [&str; 2] = ["activity", "points"];

/// A registered recipient of point awards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub display_name: String,
    #[serde(default)]
    pub facility: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
}

impl Person {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            facility: None,
            memo: None,
            birthdate: None,
        }
    }

    pub fn key(&self) -> NameKey {
        NameKey::new(&self.display_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityEntry {
    pub facility_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCatalogEntry {
    pub activity: String,
    pub points: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("person '{0}' is already registered")]
    DuplicatePerson(String),
    #[error("person '{0}' is not registered")]
    UnknownPerson(String),
    #[error("facility '{0}' already exists")]
    DuplicateFacility(String),
    #[error("facility '{0}' does not exist")]
    UnknownFacility(String),
    #[error("activity '{0}' is not in the catalog")]
    UnknownActivity(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persons, facilities and the activity catalog as one editable snapshot.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    persons: Vec<Person>,
    facilities: Vec<FacilityEntry>,
    activities: Vec<ActivityCatalogEntry>,
}

impl Registry {
    pub fn new(
        persons: Vec<Person>,
        facilities: Vec<FacilityEntry>,
        activities: Vec<ActivityCatalogEntry>,
    ) -> Self {
        Self {
            persons,
            facilities,
            activities,
        }
    }

    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    pub fn facilities(&self) -> &[FacilityEntry] {
        &self.facilities
    }

    pub fn activities(&self) -> &[ActivityCatalogEntry] {
        &self.activities
    }

    pub fn find_person(&self, name: &str) -> Option<&Person> {
        let key = NameKey::new(name);
        if key.is_empty() {
            return None;
        }
        self.persons.iter().find(|person| person.key() == key)
    }

    pub fn register_person(&mut self, mut person: Person) -> Result<&Person, RegistryError> {
        person.display_name = person.display_name.trim().to_string();
        if person.key().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.find_person(&person.display_name).is_some() {
            return Err(RegistryError::DuplicatePerson(person.display_name));
        }
        person.facility = self.canonical_facility(person.facility.take())?;

        info!(person = %person.display_name, "person registered");
        self.persons.push(person);
        Ok(&self.persons[self.persons.len() - 1])
    }

    pub fn reassign_facility(
        &mut self,
        name: &str,
        facility: Option<String>,
    ) -> Result<(), RegistryError> {
        let facility = self.canonical_facility(facility)?;
        let key = NameKey::new(name);
        let person = self
            .persons
            .iter_mut()
            .find(|person| person.key() == key)
            .ok_or_else(|| RegistryError::UnknownPerson(name.to_string()))?;
        person.facility = facility;
        Ok(())
    }

    /// Deletes the person only; ledger rows keep their original subject name.
    pub fn remove_person(&mut self, name: &str) -> Result<Person, RegistryError> {
        let key = NameKey::new(name);
        let position = self
            .persons
            .iter()
            .position(|person| person.key() == key)
            .ok_or_else(|| RegistryError::UnknownPerson(name.to_string()))?;
        info!(person = %name, "person removed");
        Ok(self.persons.remove(position))
    }

    pub fn add_facility(&mut self, name: &str) -> Result<(), RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.facility_position(name).is_some() {
            return Err(RegistryError::DuplicateFacility(name.to_string()));
        }
        self.facilities.push(FacilityEntry {
            facility_name: name.to_string(),
        });
        Ok(())
    }

    /// Renames a facility and moves every person assigned to it.
    pub fn rename_facility(&mut self, from: &str, to: &str) -> Result<usize, RegistryError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let position = self
            .facility_position(from)
            .ok_or_else(|| RegistryError::UnknownFacility(from.to_string()))?;
        let old_key = NameKey::new(&self.facilities[position].facility_name);
        if old_key != NameKey::new(to) && self.facility_position(to).is_some() {
            return Err(RegistryError::DuplicateFacility(to.to_string()));
        }

        self.facilities[position].facility_name = to.to_string();
        let mut moved = 0;
        for person in &mut self.persons {
            if person.facility.as_deref().map(NameKey::new).as_ref() == Some(&old_key) {
                person.facility = Some(to.to_string());
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Deletes a facility; its persons become unassigned.
    pub fn remove_facility(&mut self, name: &str) -> Result<usize, RegistryError> {
        let position = self
            .facility_position(name)
            .ok_or_else(|| RegistryError::UnknownFacility(name.to_string()))?;
        let removed = NameKey::new(&self.facilities.remove(position).facility_name);
        let mut unassigned = 0;
        for person in &mut self.persons {
            if person.facility.as_deref().map(NameKey::new).as_ref() == Some(&removed) {
                person.facility = None;
                unassigned += 1;
            }
        }
        Ok(unassigned)
    }

    pub fn upsert_activity(&mut self, activity: &str, points: u64) -> Result<(), RegistryError> {
        let activity = activity.trim();
        if activity.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        match self.activity_position(activity) {
            Some(position) => self.activities[position].points = points,
            None => self.activities.push(ActivityCatalogEntry {
                activity: activity.to_string(),
                points,
            }),
        }
        Ok(())
    }

    pub fn remove_activity(&mut self, activity: &str) -> Result<(), RegistryError> {
        let position = self
            .activity_position(activity)
            .ok_or_else(|| RegistryError::UnknownActivity(activity.to_string()))?;
        self.activities.remove(position);
        Ok(())
    }

    /// Catalog value used to pre-fill an award.
    pub fn default_points(&self, activity: &str) -> Option<u64> {
        self.activity_position(activity)
            .map(|position| self.activities[position].points)
    }

    /// Person to facility lookup. Assignments are resolved to the registered
    /// spelling so name variants of one facility share a bucket.
    pub fn facility_index(&self) -> FacilityIndex {
        let by_key = self
            .persons
            .iter()
            .filter_map(|person| {
                let raw = person.facility.as_deref()?;
                let facility = self
                    .facility_position(raw)
                    .map(|position| self.facilities[position].facility_name.clone())
                    .unwrap_or_else(|| raw.to_string());
                Some((person.key(), facility))
            })
            .collect();
        FacilityIndex { by_key }
    }

    /// Resolves a requested assignment to the registered facility spelling.
    /// A blank name means unassigned.
    fn canonical_facility(&self, facility: Option<String>) -> Result<Option<String>, RegistryError> {
        match facility {
            Some(name) if !NameKey::new(&name).is_empty() => self
                .facility_position(&name)
                .map(|position| Some(self.facilities[position].facility_name.clone()))
                .ok_or(RegistryError::UnknownFacility(name)),
            _ => Ok(None),
        }
    }

    fn facility_position(&self, name: &str) -> Option<usize> {
        let key = NameKey::new(name);
        self.facilities
            .iter()
            .position(|entry| NameKey::new(&entry.facility_name) == key)
    }

    fn activity_position(&self, activity: &str) -> Option<usize> {
        let key = NameKey::new(activity);
        self.activities
            .iter()
            .position(|entry| NameKey::new(&entry.activity) == key)
    }
}

/// NameKey -> facility lookup used when grouping ledger rows by facility.
#[derive(Debug, Clone, Default)]
pub struct FacilityIndex {
    by_key: HashMap<NameKey, String>,
}

impl FacilityIndex {
    pub fn from_persons(persons: &[Person]) -> Self {
        let by_key = persons
            .iter()
            .filter_map(|person| {
                person
                    .facility
                    .clone()
                    .map(|facility| (person.key(), facility))
            })
            .collect();
        Self { by_key }
    }

    pub fn facility_of(&self, key: &NameKey) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }
}

/// Result of [`RegistryStore::load_report`].
#[derive(Debug, Clone, Default)]
pub struct RegistryLoad {
    pub registry: Registry,
    pub unreadable: Vec<PathBuf>,
}

/// CSV files backing the registry tables.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    dir: PathBuf,
}

impl RegistryStore {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn load(&self) -> Registry {
        self.load_report().registry
    }

    /// Loads all tables and lists the files that exist but could not be read.
    pub fn load_report(&self) -> RegistryLoad {
        let persons_path = self.dir.join(PERSONS_FILE);
        let facilities_path = self.dir.join(FACILITIES_FILE);
        let activities_path = self.dir.join(ACTIVITIES_FILE);
        let persons = store::read_table::<Person>(&persons_path);
        let facilities = store::read_table::<FacilityEntry>(&facilities_path);
        let activities = store::read_table::<ActivityCatalogEntry>(&activities_path);

        let skipped = persons.skipped + facilities.skipped + activities.skipped;
        if skipped > 0 {
            warn!(skipped, "registry tables contained undecodable rows");
        }
        let unreadable = [
            (persons.source, persons_path),
            (facilities.source, facilities_path),
            (activities.source, activities_path),
        ]
        .into_iter()
        .filter(|(source, _)| *source == SourceState::Unreadable)
        .map(|(_, path)| path)
        .collect();

        RegistryLoad {
            registry: Registry::new(persons.rows, facilities.rows, activities.rows),
            unreadable,
        }
    }

    pub fn save(&self, registry: &Registry) -> Result<(), StoreError> {
        store::write_table(
            &self.dir.join(PERSONS_FILE),
            &PERSON_COLUMNS,
            registry.persons(),
        )?;
        store::write_table(
            &self.dir.join(FACILITIES_FILE),
            &FACILITY_COLUMNS,
            registry.facilities(),
        )?;
        store::write_table(
            &self.dir.join(ACTIVITIES_FILE),
            &ACTIVITY_COLUMNS,
            registry.activities(),
        )
    }
}
