//! Configuration access port.

use crate::domain::error::BarsmithError;

pub trait ConfigPort {
    /// Trimmed value, `None` when the key is absent or blank.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Every key present in `section`, sorted. Empty if the section is absent.
    fn keys(&self, section: &str) -> Vec<String>;

    /// Numeric value; a present but unparseable value is an error, not a default.
    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, BarsmithError> {
        self.get_string(section, key)
            .map(|raw| {
                raw.parse::<f64>()
                    .map_err(|_| BarsmithError::invalid(section, key, format!("'{raw}' is not a number")))
            })
            .transpose()
    }

    fn get_usize(&self, section: &str, key: &str) -> Result<Option<usize>, BarsmithError> {
        self.get_string(section, key)
            .map(|raw| {
                raw.parse::<usize>().map_err(|_| {
                    BarsmithError::invalid(section, key, format!("'{raw}' is not a non-negative integer"))
                })
            })
            .transpose()
    }

    fn require_string(&self, section: &str, key: &str) -> Result<String, BarsmithError> {
        self.get_string(section, key)
            .ok_or_else(|| BarsmithError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }
}
