use super::name_key::NameKey;
use super::registry::Registry;
use chrono::NaiveDate;
use serde::Serialize;

/// Identity passed explicitly into every operation that needs one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub person_key: Option<NameKey>,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

impl Session {
    /// Staff session; `staff_name` is informational only.
    pub fn staff(staff_name: &str) -> Self {
        let name = staff_name.trim();
        Self {
            person_key: None,
            display_name: (!name.is_empty()).then(|| name.to_string()),
            is_admin: true,
        }
    }

    pub fn resident(display_name: &str) -> Self {
        Self {
            person_key: Some(NameKey::new(display_name)),
            display_name: Some(display_name.to_string()),
            is_admin: false,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            person_key: None,
            display_name: None,
            is_admin: false,
        }
    }
}

/// Matches a resident by name key. When the person has a stored birthdate the
/// supplied one must equal it.
pub fn login(registry: &Registry, name: &str, birthdate: Option<NaiveDate>) -> Option<Session> {
    let person = registry.find_person(name)?;
    match (person.birthdate, birthdate) {
        (Some(stored), Some(given)) if stored == given => {}
        (Some(_), _) => return None,
        (None, _) => {}
    }
    Some(Session::resident(&person.display_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::registry::Person;

    fn registry() -> Registry {
        let mut registry = Registry::default();
        let mut taro = Person::new("山田 太郎");
        taro.birthdate = NaiveDate::from_ymd_opt(1948, 3, 14);
        registry.register_person(taro).expect("register");
        registry.register_person(Person::new("Hanako")).expect("register");
        registry
    }

    #[test]
    fn login_matches_by_name_key_and_birthdate() {
        let registry = registry();
        let session = login(&registry, "山田太郎", NaiveDate::from_ymd_opt(1948, 3, 14))
            .expect("login succeeds");
        assert_eq!(session.person_key, Some(NameKey::new("山田 太郎")));
        assert_eq!(session.display_name.as_deref(), Some("山田 太郎"));
        assert!(!session.is_admin);
    }

    #[test]
    fn login_rejects_wrong_or_missing_birthdate() {
        let registry = registry();
        assert!(login(&registry, "山田太郎", NaiveDate::from_ymd_opt(1948, 3, 15)).is_none());
        assert!(login(&registry, "山田太郎", None).is_none());
    }

    #[test]
    fn login_without_stored_birthdate_needs_name_only() {
        let registry = registry();
        assert!(login(&registry, " HANAKO ", None).is_some());
        assert!(login(&registry, "Nobody", None).is_none());
    }

    #[test]
    fn staff_sessions_are_admin() {
        let session = Session::staff("  ");
        assert!(session.is_admin);
        assert!(session.display_name.is_none());
    }
}
