//! The table of logical variables and its name/id lookups.

use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

use crate::error::RegistryError;

/// One logical variable and the identifiers it appears under in grid files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableSpec {
    pub logical_name: String,
    pub numeric_id: u32,
    pub expected_name: String,
    #[serde(default)]
    pub description: String,
}

impl VariableSpec {
    pub fn new(logical_name: &str, numeric_id: u32, expected_name: &str, description: &str) -> Self {
        VariableSpec {
            logical_name: logical_name.to_string(),
            numeric_id,
            expected_name: expected_name.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VariableFile {
    variables: Vec<VariableSpec>,
}

/// Immutable once built. Column order of the output follows `specs`.
#[derive(Debug)]
pub struct VariableRegistry {
    specs: Vec<VariableSpec>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
}

impl VariableRegistry {
    pub fn new(specs: Vec<VariableSpec>) -> Result<Self, RegistryError> {
        if specs.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut by_logical: HashMap<&str, usize> = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();

        for (index, spec) in specs.iter().enumerate() {
            if by_logical.insert(spec.logical_name.as_str(), index).is_some() {
                return Err(RegistryError::DuplicateLogicalName(spec.logical_name.clone()));
            }
            if let Some(first) = by_id.insert(spec.numeric_id, index) {
                return Err(RegistryError::DuplicateNumericId {
                    id: spec.numeric_id,
                    first: specs[first].logical_name.clone(),
                    second: spec.logical_name.clone(),
                });
            }
            if let Some(first) = by_name.insert(spec.expected_name.clone(), index) {
                return Err(RegistryError::DuplicateExpectedName {
                    name: spec.expected_name.clone(),
                    first: specs[first].logical_name.clone(),
                    second: spec.logical_name.clone(),
                });
            }
        }

        Ok(VariableRegistry {
            specs,
            by_name,
            by_id,
        })
    }

    /// The ERA5 wave and wind variables.
    pub fn era5_waves() -> Result<Self, RegistryError> {
        Self::new(vec![
            VariableSpec::new("swh", 140229, "swh", "Significant height of combined wind waves and swell"),
            VariableSpec::new("mwd", 140230, "mwd", "Mean wave direction"),
            VariableSpec::new("pp1d", 140231, "pp1d", "Peak wave period"),
            VariableSpec::new("wind", 140245, "wind", "10 metre wind speed"),
            VariableSpec::new("dwi", 140249, "dwi", "10 metre wind direction"),
        ])
    }

    /// Loads a table from a YAML file with a top level `variables:` list.
    pub fn from_yaml_file(path: &Path) -> Result<Self, RegistryError> {
        let load_error = |reason: String| RegistryError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let text = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let file: VariableFile = serde_yaml::from_str(&text).map_err(|e| load_error(e.to_string()))?;

        Self::new(file.variables)
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)
            .map(|&index| self.specs[index].logical_name.as_str())
    }

    pub fn resolve_by_id(&self, numeric_id: u32) -> Option<&str> {
        self.by_id
            .get(&numeric_id)
            .map(|&index| self.specs[index].logical_name.as_str())
    }

    pub fn logical_names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.logical_name.as_str())
    }

    pub fn numeric_ids(&self) -> Vec<u32> {
        self.specs.iter().map(|spec| spec.numeric_id).collect()
    }

    pub fn specs(&self) -> &[VariableSpec] {
        &self.specs
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn should_resolve_default_variables() {
        let registry = VariableRegistry::era5_waves().unwrap();

        assert_eq!(registry.specs().len(), 5);
        assert_eq!(registry.resolve_by_name("swh"), Some("swh"));
        assert_eq!(registry.resolve_by_id(140230), Some("mwd"));
        assert_eq!(registry.resolve_by_id(140249), Some("dwi"));
        assert_eq!(registry.resolve_by_name("2t"), None);
        assert_eq!(registry.resolve_by_id(167), None);
    }

    #[test]
    fn should_keep_registry_order() {
        let registry = VariableRegistry::era5_waves().unwrap();
        let names: Vec<&str> = registry.logical_names().collect();

        assert_eq!(names, vec!["swh", "mwd", "pp1d", "wind", "dwi"]);
        assert_eq!(
            registry.numeric_ids(),
            vec![140229, 140230, 140231, 140245, 140249]
        );
    }

    #[test]
    fn should_reject_duplicate_numeric_id() {
        let result = VariableRegistry::new(vec![
            VariableSpec::new("swh", 140229, "swh", ""),
            VariableSpec::new("height", 140229, "hgt", ""),
        ]);

        match result {
            Err(RegistryError::DuplicateNumericId { id, first, second }) => {
                assert_eq!(id, 140229);
                assert_eq!(first, "swh");
                assert_eq!(second, "height");
            }
            other => panic!("expected duplicate id error, got {:?}", other),
        }
    }

    #[test]
    fn should_reject_duplicate_expected_name() {
        let result = VariableRegistry::new(vec![
            VariableSpec::new("swh", 140229, "swh", ""),
            VariableSpec::new("height", 140300, "swh", ""),
        ]);

        assert!(matches!(
            result,
            Err(RegistryError::DuplicateExpectedName { .. })
        ));
    }

    #[test]
    fn should_reject_duplicate_logical_name() {
        let result = VariableRegistry::new(vec![
            VariableSpec::new("swh", 140229, "swh", ""),
            VariableSpec::new("swh", 140300, "swh2", ""),
        ]);

        assert!(matches!(result, Err(RegistryError::DuplicateLogicalName(_))));
    }

    #[test]
    fn should_reject_empty_table() {
        assert!(matches!(VariableRegistry::new(vec![]), Err(RegistryError::Empty)));
    }

    #[test]
    fn should_load_yaml_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "variables:\n  - logical_name: t2m\n    numeric_id: 167\n    expected_name: 2t\n    description: 2 metre temperature\n  - logical_name: msl\n    numeric_id: 151\n    expected_name: msl"
        )
        .unwrap();

        let registry = VariableRegistry::from_yaml_file(file.path()).unwrap();

        assert_eq!(registry.specs().len(), 2);
        assert_eq!(registry.specs()[0].description, "2 metre temperature");
        assert_eq!(registry.specs()[1].description, "");
        assert_eq!(registry.resolve_by_name("2t"), Some("t2m"));
        assert_eq!(registry.resolve_by_id(151), Some("msl"));
    }

    #[test]
    fn should_report_unreadable_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "variables: [not, a, table").unwrap();

        let result = VariableRegistry::from_yaml_file(file.path());

        assert!(matches!(result, Err(RegistryError::Load { .. })));
    }
}
