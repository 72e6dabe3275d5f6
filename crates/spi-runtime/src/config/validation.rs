//! Settings validation utilities.

use std::collections::BTreeMap;

use super::error::{SettingsError, SettingsResult};
use super::schema::{LogOutput, SpiSettings};

/// Validates the entire settings structure.
pub fn validate_settings(settings: &SpiSettings) -> SettingsResult<()> {
    validate_fingerprints(settings)?;
    validate_contract_map("apply", &settings.apply)?;
    validate_contract_map("ignore", &settings.ignore)?;

    if settings.logging.output == LogOutput::File && settings.logging.file_path.is_none() {
        return Err(SettingsError::validation(
            "logging.output = \"file\" requires logging.file_path",
        ));
    }

    Ok(())
}

fn validate_fingerprints(settings: &SpiSettings) -> SettingsResult<()> {
    for fingerprint in &settings.file_exclusion {
        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() {
            return Err(SettingsError::validation("Empty fingerprint in file_exclusion"));
        }
        if !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SettingsError::validation(format!(
                "Fingerprint '{fingerprint}' in file_exclusion is not hexadecimal"
            )));
        }
    }
    Ok(())
}

fn validate_contract_map(section: &str, map: &BTreeMap<String, String>) -> SettingsResult<()> {
    for (contract, value) in map {
        if contract.trim().is_empty() {
            return Err(SettingsError::validation(format!(
                "Blank contract key in {section}"
            )));
        }
        if value.trim().is_empty() {
            return Err(SettingsError::validation(format!(
                "Empty value for {section}.{contract}"
            )));
        }
    }
    Ok(())
}
