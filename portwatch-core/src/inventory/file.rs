use std::{
    io::ErrorKind,
    net::IpAddr,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::debug;

use super::{InventoryError, InventorySource};

/// Inventory exported to disk as a JSON array of address strings, e.g.
/// `["52.1.2.3", "2600:1f18::10"]`.
///
/// The file is re-read on every call so an external exporter can rewrite it
/// between reconciliation cycles.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InventorySource for FileInventory {
    async fn public_addresses(&self) -> Result<Vec<IpAddr>, InventoryError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(target: "inventory::sync", path = %self.path.display(), "inventory file missing");
                return Err(InventoryError::NotConfigured);
            }
            Err(err) => {
                return Err(InventoryError::Unavailable(format!(
                    "{}: {err}",
                    self.path.display()
                )));
            }
        };

        let entries: Vec<String> = serde_json::from_str(&raw).map_err(|err| {
            InventoryError::Malformed(format!("{}: {err}", self.path.display()))
        })?;

        entries
            .iter()
            .map(|entry| {
                entry.trim().parse::<IpAddr>().map_err(|_| {
                    InventoryError::Malformed(format!("not an IP address: {entry:?}"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn inventory_with(contents: &str) -> (tempfile::NamedTempFile, FileInventory) {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write");
        let inventory = FileInventory::new(file.path());
        (file, inventory)
    }

    #[tokio::test]
    async fn reads_address_array() {
        let (_file, inventory) = inventory_with(r#"["52.1.2.3", " 2600:1f18::10 "]"#);
        let addresses = inventory.public_addresses().await.unwrap();
        assert_eq!(
            addresses,
            vec![
                "52.1.2.3".parse::<IpAddr>().unwrap(),
                "2600:1f18::10".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inventory = FileInventory::new(dir.path().join("absent.json"));
        assert_eq!(
            inventory.public_addresses().await,
            Err(InventoryError::NotConfigured)
        );
    }

    #[tokio::test]
    async fn bad_contents_are_malformed() {
        for contents in ["{not json", r#"["52.1.2.3", "web-1"]"#, r#"{"ip": "1.2.3.4"}"#] {
            let (_file, inventory) = inventory_with(contents);
            assert!(
                matches!(
                    inventory.public_addresses().await,
                    Err(InventoryError::Malformed(_))
                ),
                "{contents} should be rejected"
            );
        }
    }
}
