//! Build context staging.
//!
//! Everything a generated `COPY` instruction references must exist under the
//! context tree before the instruction sequence is finalized. Staging is a
//! pure side effect; the only steps it contributes are the two script COPYs
//! at the top of the base stage.

use crate::constants;
use crate::containerfile::Steps;
use crate::definition::{Category, Definition};
use crate::output;
use crate::scripts;
use crate::utils;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The build context directory tree: a caller-supplied root with a
/// `_build` subfolder for staged content and `_build/scripts` for the
/// bundled helper scripts.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    outputs_dir: PathBuf,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let outputs_dir = root.join(constants::USER_CONTENT_SUBFOLDER);
        BuildContext { root, outputs_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `_build` subfolder holding staged content.
    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.outputs_dir.join("scripts")
    }

    /// Whether a file with this name was staged into `_build`.
    pub fn has_staged(&self, name: &str) -> bool {
        self.outputs_dir.join(name).exists()
    }

    /// Stage every file the generated instructions will reference, and
    /// append the two script COPY steps.
    pub fn populate(
        &self,
        definition: &Definition,
        keyring: Option<&Path>,
        steps: &mut Steps,
    ) -> Result<()> {
        utils::ensure_dir(&self.scripts_dir())?;

        self.stage_dependency_files(definition)?;
        self.stage_collection_exclusions(definition)?;

        if let Some(keyring) = keyring {
            utils::copy_file(
                keyring,
                &self.outputs_dir.join(constants::DEFAULT_KEYRING_NAME),
                false,
            )?;
        }

        self.stage_additional_files(definition)?;

        if let Some(config) = definition.ansible_config() {
            utils::copy_file(config, &self.outputs_dir.join("ansible.cfg"), false)?;
        }

        scripts::install_scripts(&self.scripts_dir())?;

        // Intermediate stages read the scripts from /output, which the final
        // stage purges. The entrypoint alone is copied to a path that
        // survives into the final image.
        steps.push(format!(
            "COPY {}/scripts/ /output/scripts/",
            constants::USER_CONTENT_SUBFOLDER
        ));
        steps.push(format!(
            "COPY {}/scripts/entrypoint {}/entrypoint",
            constants::USER_CONTENT_SUBFOLDER,
            constants::FINAL_IMAGE_BIN_PATH
        ));

        Ok(())
    }

    /// Copy each resolvable requirement file (and exclude variant) to its
    /// canonical in-context name. Modification time is ignored: the source
    /// may be a scratch file written moments ago, and only content matters.
    fn stage_dependency_files(&self, definition: &Definition) -> Result<()> {
        for category in Category::ALL {
            for exclude in [false, true] {
                let Some(source) = definition.dependency_path(category, exclude) else {
                    continue;
                };
                let mut name = category.context_filename().to_string();
                if exclude {
                    name = format!("exclude-{name}");
                }
                output::detail(&format!("staging {name}"));
                utils::copy_file(source, &self.outputs_dir.join(name), true)?;
            }
        }
        Ok(())
    }

    /// Materialize `exclude.all_from_collections` as a newline-joined file.
    fn stage_collection_exclusions(&self, definition: &Definition) -> Result<()> {
        let collections = definition.exclude_collections();
        if collections.is_empty() {
            return Ok(());
        }

        let mut scratch = tempfile::NamedTempFile::new()
            .context("cannot create collection exclusion scratch file")?;
        scratch.write_all(collections.join("\n").as_bytes())?;
        scratch.flush()?;

        utils::copy_file(
            scratch.path(),
            &self.outputs_dir.join(constants::EXCL_COLLECTIONS_FILENAME),
            true,
        )?;
        Ok(())
    }

    /// Copy user-declared extra files under `_build/<dest>/`.
    ///
    /// An absolute `src` names one file or directory; a relative `src` is a
    /// glob pattern anchored at the definition file's directory. Missing
    /// sources warn and skip, they never fail generation.
    fn stage_additional_files(&self, definition: &Definition) -> Result<()> {
        for entry in definition.additional_build_files() {
            let src = Path::new(&entry.src);

            let sources: Vec<PathBuf> = if src.is_absolute() {
                if !src.exists() {
                    output::warning(&format!(
                        "additional build file {} does not exist, skipping",
                        src.display()
                    ));
                    continue;
                }
                vec![src.to_path_buf()]
            } else {
                let pattern = definition.reference_dir().join(src);
                let matches = match glob::glob(&pattern.to_string_lossy()) {
                    Ok(paths) => paths.filter_map(|p| p.ok()).collect::<Vec<_>>(),
                    Err(err) => {
                        output::warning(&format!(
                            "invalid additional_build_files pattern '{}': {err}",
                            entry.src
                        ));
                        continue;
                    }
                };
                if matches.is_empty() {
                    output::warning(&format!(
                        "no matches for '{}' in additional_build_files, skipping",
                        entry.src
                    ));
                    continue;
                }
                matches
            };

            let dest_dir = self.outputs_dir.join(&entry.dest);
            utils::ensure_dir(&dest_dir)?;

            for source in sources {
                if source.is_dir() {
                    utils::copy_directory(&source, &dest_dir)?;
                } else {
                    let name = source
                        .file_name()
                        .expect("glob matches and existing files have a final component");
                    utils::copy_file(&source, &dest_dir.join(name), false)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;
    use tempfile::tempdir;

    fn definition_in(dir: &Path, yaml: &str) -> Definition {
        let path = dir.join("execution-environment.yml");
        std::fs::write(&path, yaml).unwrap();
        Definition::load(&path).unwrap()
    }

    #[test]
    fn test_populate_stages_scripts_and_appends_copy_steps() {
        let temp = tempdir().unwrap();
        let def = definition_in(temp.path(), "version: 3\n");
        let context = BuildContext::new(temp.path().join("context"));
        let mut steps = Steps::default();

        context.populate(&def, None, &mut steps).unwrap();

        assert!(context.scripts_dir().join("entrypoint").exists());
        assert!(context.scripts_dir().join("assemble").exists());
        assert_eq!(
            steps.as_slice(),
            [
                "COPY _build/scripts/ /output/scripts/",
                "COPY _build/scripts/entrypoint /opt/builder/bin/entrypoint",
            ]
        );
    }

    #[test]
    fn test_dependency_files_land_under_canonical_names() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("reqs.txt"), "pytz\n").unwrap();
        let def = definition_in(temp.path(), "version: 3\ndependencies:\n  python: reqs.txt\n");
        let context = BuildContext::new(temp.path().join("context"));

        context.populate(&def, None, &mut Steps::default()).unwrap();

        assert!(context.has_staged("requirements.txt"));
        assert!(!context.has_staged("bindep.txt"));
        assert_eq!(
            std::fs::read_to_string(context.outputs_dir().join("requirements.txt")).unwrap(),
            "pytz\n"
        );
    }

    #[test]
    fn test_collection_exclusions_materialize() {
        let temp = tempdir().unwrap();
        let def = definition_in(
            temp.path(),
            "version: 3\ndependencies:\n  exclude:\n    all_from_collections:\n      - a.b\n      - c.d\n",
        );
        let context = BuildContext::new(temp.path().join("context"));

        context.populate(&def, None, &mut Steps::default()).unwrap();

        assert_eq!(
            std::fs::read_to_string(context.outputs_dir().join("exclude-collections.txt")).unwrap(),
            "a.b\nc.d"
        );
    }

    #[test]
    fn test_missing_absolute_additional_file_skips() {
        let temp = tempdir().unwrap();
        let def = definition_in(
            temp.path(),
            "version: 3\nadditional_build_files:\n  - src: /does/not/exist.cfg\n    dest: configs\n",
        );
        let context = BuildContext::new(temp.path().join("context"));

        context.populate(&def, None, &mut Steps::default()).unwrap();

        assert!(!context.outputs_dir().join("configs/exist.cfg").exists());
    }

    #[test]
    fn test_additional_file_glob_copies_matches() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("data")).unwrap();
        std::fs::write(temp.path().join("data/a.cfg"), "a").unwrap();
        std::fs::write(temp.path().join("data/b.cfg"), "b").unwrap();
        std::fs::write(temp.path().join("data/ignored.txt"), "x").unwrap();
        let def = definition_in(
            temp.path(),
            "version: 3\nadditional_build_files:\n  - src: data/*.cfg\n    dest: configs\n",
        );
        let context = BuildContext::new(temp.path().join("context"));

        context.populate(&def, None, &mut Steps::default()).unwrap();

        assert!(context.outputs_dir().join("configs/a.cfg").exists());
        assert!(context.outputs_dir().join("configs/b.cfg").exists());
        assert!(!context.outputs_dir().join("configs/ignored.txt").exists());
    }
}
