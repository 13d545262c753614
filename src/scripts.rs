//! Helper scripts bundled into the binary and staged into every build
//! context. The generated instructions run them inside the image; forge
//! itself never executes them.

use crate::constants;
use crate::utils;
use anyhow::{Context, Result};
use std::path::Path;

/// Source text for a bundled script, embedded at compile time.
pub fn script_source(name: &str) -> Option<&'static str> {
    match name {
        "assemble" => Some(include_str!("../resources/scripts/assemble")),
        "install-from-bindep" => Some(include_str!("../resources/scripts/install-from-bindep")),
        "introspect.py" => Some(include_str!("../resources/scripts/introspect.py")),
        "check_galaxy" => Some(include_str!("../resources/scripts/check_galaxy")),
        "check_ansible" => Some(include_str!("../resources/scripts/check_ansible")),
        "pip_install" => Some(include_str!("../resources/scripts/pip_install")),
        "entrypoint" => Some(include_str!("../resources/scripts/entrypoint")),
        _ => None,
    }
}

/// Write the full script manifest into `dir`, marking each executable so the
/// COPY into the image preserves the bit.
pub fn install_scripts(dir: &Path) -> Result<()> {
    utils::ensure_dir(dir)?;
    for name in constants::SCRIPT_FILES {
        let source = script_source(name).expect("script manifest entry has no embedded source");
        let dest = dir.join(name);
        std::fs::write(&dest, source)
            .with_context(|| format!("cannot write script {}", dest.display()))?;
        utils::set_mode(&dest, 0o755)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_manifest_is_fully_embedded() {
        for name in constants::SCRIPT_FILES {
            assert!(script_source(name).is_some(), "missing source for {name}");
        }
        assert!(script_source("not-a-script").is_none());
    }

    #[test]
    fn test_install_scripts_writes_executables() {
        let temp = tempdir().unwrap();
        install_scripts(temp.path()).unwrap();

        for name in constants::SCRIPT_FILES {
            let path = temp.path().join(name);
            assert!(path.exists(), "{name} not written");
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(temp.path().join("entrypoint"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
