//! Parses the handful of `key:value` labels a [`Machine`](vmctl_types::Machine)
//! carries that the Deploy Worker needs: which template to clone, which
//! network to attach, and which inventory folder to place the clone
//! in.

use crate::error::{Result, WorkerError};

/// Extracts the `template:<name>` label. Every deployable machine must
/// carry exactly one; the first match wins if more than one is present.
///
/// # Errors
///
/// Returns [`WorkerError::MissingTemplate`] if no label matches.
pub fn template(labels: &[String]) -> Result<String> {
    labels
        .iter()
        .find_map(|l| l.strip_prefix("template:").map(str::to_string))
        .ok_or_else(|| WorkerError::MissingTemplate(labels.to_vec()))
}

/// Extracts the `config:network_interface=<name>` label, if present.
#[must_use]
pub fn network_interface(labels: &[String]) -> Option<String> {
    labels
        .iter()
        .find_map(|l| l.strip_prefix("config:network_interface=").map(str::to_string))
}

/// Extracts the `config:inventory_path=<path>` label, if present.
#[must_use]
pub fn inventory_folder(labels: &[String]) -> Option<String> {
    labels
        .iter()
        .find_map(|l| l.strip_prefix("config:inventory_path=").map(str::to_string))
}

/// `true` if the machine's labels request that it be left running
/// immediately after deploy rather than left powered off.
#[must_use]
pub fn has_running_label(labels: &[String]) -> bool {
    labels.iter().any(|l| l == "feat:running")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_extracted() {
        let labels = vec!["template:ubuntu-22.04".to_string(), "other:thing".to_string()];
        assert_eq!(template(&labels).unwrap(), "ubuntu-22.04");
    }

    #[test]
    fn missing_template_is_an_error() {
        let labels = vec!["other:thing".to_string()];
        assert!(template(&labels).is_err());
    }

    #[test]
    fn network_and_folder_are_optional() {
        let labels = vec!["config:network_interface=vlan100".to_string()];
        assert_eq!(network_interface(&labels).as_deref(), Some("vlan100"));
        assert_eq!(inventory_folder(&labels), None);
    }

    #[test]
    fn running_label_is_detected() {
        assert!(has_running_label(&["feat:running".to_string()]));
        assert!(!has_running_label(&["template:base".to_string()]));
    }
}
