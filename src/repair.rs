//! XML well-formedness repair of extracted prep files.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Rewrites malformed XML files in place.
pub trait XmlRepair {
    /// Repair every `.xml` file below `dir`.
    fn repair_tree(&self, dir: &Path) -> Result<()>;
}

/// Leaves files untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepair;

impl XmlRepair for NoRepair {
    fn repair_tree(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// Pipes files through `xmllint --format --recover`.
///
/// When the program cannot be found the tree is left as is and a single
/// warning is logged.
#[derive(Debug, Clone)]
pub struct Xmllint {
    program: String,
}

impl Default for Xmllint {
    fn default() -> Self {
        Self::new("xmllint")
    }
}

impl Xmllint {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Repaired content of one file, or `None` when xmllint produced nothing.
    fn repair_file(&self, path: &Path) -> std::io::Result<Option<Vec<u8>>> {
        let output = Command::new(&self.program)
            .args(["--format", "--recover"])
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("xmllint reported problems in {}: {}", path.display(), stderr.trim());
        }
        Ok(Some(output.stdout).filter(|out| !out.is_empty()))
    }
}

impl XmlRepair for Xmllint {
    fn repair_tree(&self, dir: &Path) -> Result<()> {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() || entry.path().extension() != Some(OsStr::new("xml")) {
                continue;
            }

            match self.repair_file(entry.path()) {
                Ok(Some(repaired)) => std::fs::write(entry.path(), repaired)?,
                Ok(None) => debug!("xmllint produced no output for {}", entry.path().display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("{} not found, skipping XML repair", self.program);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// The repair filter used when none is configured: xmllint on Linux, nothing
/// elsewhere.
pub fn default_repair() -> Box<dyn XmlRepair> {
    if cfg!(target_os = "linux") {
        Box::new(Xmllint::default())
    } else {
        Box::new(NoRepair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.xml");
        std::fs::write(&file, "<a><b></a>").unwrap();

        let repair = Xmllint::new("definitely-not-an-installed-xmllint");
        repair.repair_tree(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "<a><b></a>");
    }

    #[test]
    fn test_no_repair_leaves_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.xml");
        std::fs::write(&file, "<a>").unwrap();

        NoRepair.repair_tree(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "<a>");
    }
}
