//! Resolves a message to a logical variable: by name first, then by id.

use crate::registry::VariableRegistry;

use super::GridMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    ByName(&'a str),
    ById(&'a str),
    Unresolved,
}

impl<'a> Classification<'a> {
    pub fn logical_name(&self) -> Option<&'a str> {
        match self {
            Classification::ByName(name) | Classification::ById(name) => Some(name),
            Classification::Unresolved => None,
        }
    }
}

pub fn match_by_name<'a>(registry: &'a VariableRegistry, name: &str) -> Option<&'a str> {
    if name.is_empty() {
        return None;
    }
    registry.resolve_by_name(name)
}

pub fn match_by_id(registry: &VariableRegistry, numeric_id: Option<u32>) -> Option<&str> {
    numeric_id.and_then(|id| registry.resolve_by_id(id))
}

pub fn classify<'a>(registry: &'a VariableRegistry, message: &GridMessage) -> Classification<'a> {
    if let Some(name) = match_by_name(registry, &message.name) {
        return Classification::ByName(name);
    }
    match match_by_id(registry, message.numeric_id) {
        Some(name) => Classification::ById(name),
        None => Classification::Unresolved,
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn should_resolve_name_with_or_without_id() {
        let registry = VariableRegistry::era5_waves().unwrap();

        let with_id = classify(&registry, &message_fixture("swh", Some(140229)));
        let without_id = classify(&registry, &message_fixture("swh", None));

        assert_eq!(with_id, Classification::ByName("swh"));
        assert_eq!(without_id, Classification::ByName("swh"));
    }

    #[test]
    fn should_prefer_name_over_conflicting_id() {
        let registry = VariableRegistry::era5_waves().unwrap();

        let classification = classify(&registry, &message_fixture("swh", Some(140230)));

        assert_eq!(classification.logical_name(), Some("swh"));
    }

    #[test]
    fn should_fall_back_to_numeric_id() {
        let registry = VariableRegistry::era5_waves().unwrap();

        let empty_name = classify(&registry, &message_fixture("", Some(140230)));
        let unknown_name = classify(&registry, &message_fixture("unknown", Some(140230)));

        assert_eq!(empty_name, Classification::ById("mwd"));
        assert_eq!(unknown_name, Classification::ById("mwd"));
    }

    #[test]
    fn should_leave_unknown_message_unresolved() {
        let registry = VariableRegistry::era5_waves().unwrap();

        assert_eq!(
            classify(&registry, &message_fixture("2t", None)),
            Classification::Unresolved
        );
        assert_eq!(
            classify(&registry, &message_fixture("", Some(167))),
            Classification::Unresolved
        );
        assert_eq!(Classification::Unresolved.logical_name(), None);
    }

    fn message_fixture(name: &str, numeric_id: Option<u32>) -> GridMessage {
        GridMessage {
            name: name.to_string(),
            numeric_id,
            timestamp: NaiveDate::from_ymd_opt(1940, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            coordinates: vec![],
            values: vec![],
        }
    }
}
