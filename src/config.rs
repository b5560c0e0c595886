use crate::types::{VolumeError, VolumeResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping from source quantity names to canonical field names.
///
/// The decoder treats this as an injected capability: quantities with no
/// mapping, or whose mapped name is excluded, are dropped from the volume.
/// The default table carries the standard ODIM moment names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTable {
    mapping: BTreeMap<String, String>,
    #[serde(default)]
    exclude: BTreeSet<String>,
    /// Pass source quantity names through unchanged instead of mapping them
    #[serde(default)]
    file_field_names: bool,
}

impl Default for FieldTable {
    fn default() -> Self {
        let mapping = [
            ("TH", "total_power"),
            ("TV", "total_power"),
            ("DBZH", "reflectivity"),
            ("DBZV", "reflectivity"),
            ("ZDR", "differential_reflectivity"),
            ("RHOHV", "cross_correlation_ratio"),
            ("LDR", "linear_polarization_ratio"),
            ("PHIDP", "differential_phase"),
            ("KDP", "specific_differential_phase"),
            ("SQI", "normalized_coherent_power"),
            ("SNR", "signal_to_noise_ratio"),
            ("VRAD", "velocity"),
            ("WRAD", "spectrum_width"),
            ("QIND", "quality_index"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            mapping,
            exclude: BTreeSet::new(),
            file_field_names: false,
        }
    }
}

impl FieldTable {
    /// Build a table from an explicit source-to-target mapping
    pub fn from_mapping<I, S, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            mapping: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            exclude: BTreeSet::new(),
            file_field_names: false,
        }
    }

    /// Load a table from a JSON document
    pub fn from_json(json: &str) -> VolumeResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| VolumeError::Metadata(format!("invalid field table: {}", e)))
    }

    /// Use the source quantity names directly as field names
    pub fn with_file_field_names(mut self) -> Self {
        self.file_field_names = true;
        self
    }

    /// Exclude a target field name from decoded volumes
    pub fn with_excluded(mut self, field_name: &str) -> Self {
        self.exclude.insert(field_name.to_string());
        self
    }

    /// Whether a (post-mapping) field name is excluded
    pub fn is_excluded(&self, field_name: &str) -> bool {
        self.exclude.contains(field_name)
    }

    /// Resolve a source quantity to its target field name.
    ///
    /// Returns `None` for unmapped or excluded quantities.
    pub fn target_name(&self, source_quantity: &str) -> Option<String> {
        let name = if self.file_field_names {
            source_quantity.to_string()
        } else {
            self.mapping.get(source_quantity)?.clone()
        };
        if self.is_excluded(&name) {
            None
        } else {
            Some(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_maps_odim_names() {
        let table = FieldTable::default();
        assert_eq!(table.target_name("DBZH").as_deref(), Some("reflectivity"));
        assert_eq!(table.target_name("VRAD").as_deref(), Some("velocity"));
        assert_eq!(table.target_name("XXXX"), None);
    }

    #[test]
    fn test_exclusion_applies_after_mapping() {
        let table = FieldTable::default().with_excluded("reflectivity");
        assert_eq!(table.target_name("DBZH"), None);
        assert_eq!(table.target_name("ZDR").as_deref(), Some("differential_reflectivity"));
    }

    #[test]
    fn test_file_field_names_passthrough() {
        let table = FieldTable::default().with_file_field_names();
        assert_eq!(table.target_name("DBZH").as_deref(), Some("DBZH"));
        assert_eq!(table.target_name("XXXX").as_deref(), Some("XXXX"));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{"mapping": {"DBZH": "reflectivity"}, "exclude": []}"#;
        let table = FieldTable::from_json(json).unwrap();
        assert_eq!(table.target_name("DBZH").as_deref(), Some("reflectivity"));
    }
}
