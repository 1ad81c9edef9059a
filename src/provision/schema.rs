use crate::common::{command_utils, file_utils};
use crate::config::types::{Component, Settings};
use crate::error::Result;
use crate::generator::layout;
use log::{debug, info};
use std::path::Path;

const INITDB_SCRIPT: &str = "/opt/guacamole/bin/initdb.sh";

/// Dump the application's PostgreSQL schema into the init directory once.
///
/// Returns `true` when the dump ran.
pub fn ensure_schema(settings: &Settings, dir: &Path) -> Result<bool> {
    let target = dir.join(layout::SCHEMA_FILE);
    if target.is_file() {
        debug!("Keeping existing schema at {}", target.display());
        return Ok(false);
    }

    let image = settings.images.reference(Component::Guacamole)?;
    info!("Dumping database schema from {}", image);
    let output = command_utils::execute_command(
        "docker",
        &["run", "--rm", image.as_str(), INITDB_SCRIPT, "--postgresql"],
    )?;

    file_utils::write_artifact(&target, &String::from_utf8_lossy(&output.stdout))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::tests::{base_document, settings_with};
    use crate::config::ConfigStore;
    use crate::error::{GeneratorError, StackError};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_existing_schema_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("init/initdb.sql");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "CREATE TABLE guacamole_user ();\n").unwrap();

        assert!(!ensure_schema(&settings_with(&[]), temp_dir.path()).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "CREATE TABLE guacamole_user ();\n");
    }

    #[test]
    fn test_missing_version_fails_before_dump() {
        let temp_dir = TempDir::new().unwrap();
        let mut doc = base_document();
        doc["versions"].as_object_mut().unwrap().remove("guacamole");
        let store = ConfigStore::from_value(Path::new("t.json"), doc);
        let settings = Settings::from_store(&store).unwrap();

        assert!(matches!(
            ensure_schema(&settings, temp_dir.path()),
            Err(StackError::Generation(GeneratorError::MissingVersion(c))) if c == "guacamole"
        ));
        assert!(!temp_dir.path().join("init/initdb.sql").exists());
    }
}
