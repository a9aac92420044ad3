// src/classes.rs
//
// Road user class catalog. Loaded once from a YAML file; classes keep their
// file order and a stable identity, with the hotkey as one attribute of the
// entry rather than the lookup key.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ClassCatalogError {
    #[error("failed to read class catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("class catalog is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("hotkey '{0}' is assigned to more than one class")]
    DuplicateKey(String),
}

/// One classifiable kind of road user.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadUserClass {
    pub name: String,
    pub label: String,
    pub short_label: String,
    /// Keyboard key that assigns this class to the active annotation.
    pub key: String,
    pub icon_file: PathBuf,
    pub color: Option<String>,
}

impl RoadUserClass {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Deserialize)]
struct ClassProperties {
    label: String,
    short_label: String,
    key: String,
    icon_file: PathBuf,
    #[serde(default)]
    color: Option<String>,
}

/// All classes valid in this session, in catalog file order.
#[derive(Debug, Clone, Default)]
pub struct RoadUserCatalog {
    classes: Vec<RoadUserClass>,
}

impl RoadUserCatalog {
    pub fn from_yaml_file(file: &Path) -> Result<Self, ClassCatalogError> {
        let contents = fs::read_to_string(file)?;
        let catalog = Self::from_yaml_str(&contents)?;
        info!(
            "Loaded {} road user classes from {}",
            catalog.len(),
            file.display()
        );
        Ok(catalog)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ClassCatalogError> {
        // Catalog shape: a YAML list of single-entry maps, one per class,
        // keyed by the class name.
        let entries: Vec<HashMap<String, ClassProperties>> = serde_yaml::from_str(contents)?;

        let mut classes = Vec::new();
        for entry in entries {
            for (name, properties) in entry {
                let class = RoadUserClass {
                    name,
                    label: properties.label,
                    short_label: properties.short_label,
                    key: properties.key,
                    icon_file: properties.icon_file,
                    color: properties.color,
                };
                if classes.iter().any(|c: &RoadUserClass| c.key == class.key) {
                    return Err(ClassCatalogError::DuplicateKey(class.key));
                }
                classes.push(class);
            }
        }
        Ok(Self { classes })
    }

    pub fn by_key(&self, key: &str) -> Option<&RoadUserClass> {
        self.classes.iter().find(|c| c.key == key)
    }

    pub fn by_name(&self, name: &str) -> Option<&RoadUserClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoadUserClass> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "\
- car:
    label: Car
    short_label: Car
    key: \"1\"
    icon_file: icons/car.png
    color: \"#1f77b4\"
- bicyclist:
    label: Bicyclist
    short_label: Bike
    key: \"2\"
    icon_file: icons/bicyclist.png
";

    #[test]
    fn test_load_preserves_order_and_fields() {
        let catalog = RoadUserCatalog::from_yaml_str(CATALOG).expect("parse");
        assert_eq!(catalog.len(), 2);
        let names: Vec<&str> = catalog.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["car", "bicyclist"]);
        let car = catalog.by_name("car").unwrap();
        assert_eq!(car.label, "Car");
        assert_eq!(car.color.as_deref(), Some("#1f77b4"));
    }

    #[test]
    fn test_lookup_by_key() {
        let catalog = RoadUserCatalog::from_yaml_str(CATALOG).expect("parse");
        assert_eq!(catalog.by_key("2").unwrap().name(), "bicyclist");
        assert!(catalog.by_key("9").is_none());
    }

    #[test]
    fn test_duplicate_hotkey_rejected() {
        let doubled = "\
- car:
    label: Car
    short_label: Car
    key: \"1\"
    icon_file: icons/car.png
- truck:
    label: Truck
    short_label: Truck
    key: \"1\"
    icon_file: icons/truck.png
";
        let result = RoadUserCatalog::from_yaml_str(doubled);
        assert!(matches!(
            result,
            Err(ClassCatalogError::DuplicateKey(k)) if k == "1"
        ));
    }

    #[test]
    fn test_missing_color_is_optional() {
        let catalog = RoadUserCatalog::from_yaml_str(CATALOG).expect("parse");
        assert!(catalog.by_name("bicyclist").unwrap().color.is_none());
    }
}
