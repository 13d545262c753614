//! The execution environment definition.
//!
//! A [`Definition`] is the read-only value object driving generation. Schema
//! validation proper happens upstream of this crate; loading here performs
//! only the defaulting and normalization the assembler needs: version
//! branching collapses into [`Schema`], custom step blocks collapse into
//! plain line lists, and inline dependency content is materialized to
//! scratch files exactly once so dependency lookups stay stable for the
//! whole run.

use crate::constants;
use crate::error::DefinitionError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Schema versions with observable behavior differences. Version 3 and
/// anything later behave identically, so they share a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    V1,
    V2,
    V3,
}

impl Schema {
    fn from_number(version: u64) -> Option<Self> {
        match version {
            0 => None,
            1 => Some(Schema::V1),
            2 => Some(Schema::V2),
            _ => Some(Schema::V3),
        }
    }

    /// A dedicated builder image may be configured.
    pub fn allows_builder_image(self) -> bool {
        matches!(self, Schema::V1 | Schema::V2)
    }

    /// The builder stage must use the dedicated builder image even when the
    /// definition does not name one.
    pub fn forces_builder_stage_image(self) -> bool {
        matches!(self, Schema::V1)
    }

    /// The `options` mapping is honored.
    pub fn supports_options(self) -> bool {
        matches!(self, Schema::V3)
    }

    /// The `PKGMGR` build arg is declared.
    pub fn emits_pkgmgr_arg(self) -> bool {
        matches!(self, Schema::V3)
    }

    /// The galaxy stage copies `ansible.cfg` into the home directory.
    pub fn legacy_ansible_cfg(self) -> bool {
        matches!(self, Schema::V1)
    }
}

/// Dependency categories with a canonical file name inside the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Galaxy,
    Python,
    System,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Galaxy, Category::Python, Category::System];

    /// Destination name of this category's requirement file in the context.
    pub fn context_filename(self) -> &'static str {
        match self {
            Category::Galaxy => constants::STD_GALAXY_FILENAME,
            Category::Python => constants::STD_PIP_FILENAME,
            Category::System => constants::STD_BINDEP_FILENAME,
        }
    }
}

/// Optional behaviors of version 3+ definitions, with schema defaults
/// already applied.
#[derive(Debug, Clone)]
pub struct Options {
    pub skip_ansible_check: bool,
    pub skip_pip_install: bool,
    pub relax_passwd_permissions: bool,
    pub workdir: Option<String>,
    pub user: Option<String>,
    pub package_manager_path: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            skip_ansible_check: false,
            skip_pip_install: false,
            relax_passwd_permissions: true,
            workdir: Some("/runner".to_string()),
            user: Some("1000".to_string()),
            package_manager_path: constants::DEFAULT_PKGMGR_PATH.to_string(),
        }
    }
}

/// Container init settings for the final image. Values are emitted verbatim
/// after `ENTRYPOINT`/`CMD`; lists in the document are joined with spaces at
/// load time.
#[derive(Debug, Clone, Default)]
pub struct ContainerInit {
    pub entrypoint: Option<String>,
    pub cmd: Option<String>,
    pub package_pip: Option<String>,
}

impl ContainerInit {
    fn v3_defaults() -> Self {
        ContainerInit {
            entrypoint: Some(r#"["/opt/builder/bin/entrypoint", "dumb-init"]"#.to_string()),
            cmd: Some(r#"["bash"]"#.to_string()),
            package_pip: Some("dumb-init==1.2.5".to_string()),
        }
    }
}

/// One `additional_build_files` entry: a source path or glob plus the
/// context subfolder it lands in.
#[derive(Debug, Clone, Deserialize)]
pub struct AdditionalBuildFile {
    pub src: String,
    pub dest: String,
}

/// Resolved dependency file locations. `None` means the category was not
/// declared; a declared-but-missing file is a build-time concern.
#[derive(Debug, Default)]
struct DepPaths {
    galaxy: Option<PathBuf>,
    python: Option<PathBuf>,
    system: Option<PathBuf>,
    exclude_python: Option<PathBuf>,
    exclude_system: Option<PathBuf>,
}

/// The parsed, normalized execution environment definition.
#[derive(Debug)]
pub struct Definition {
    schema: Schema,
    path: PathBuf,
    reference_dir: PathBuf,
    build_arg_overrides: HashMap<String, String>,
    base_image: Option<String>,
    builder_image: Option<String>,
    python_path: Option<String>,
    python_package_system: Option<String>,
    ansible_refs: Vec<String>,
    options: Options,
    container_init: ContainerInit,
    additional_build_steps: HashMap<String, Vec<String>>,
    additional_build_files: Vec<AdditionalBuildFile>,
    ansible_config: Option<PathBuf>,
    deps: DepPaths,
    exclude_collections: Vec<String>,
    // Holds materialized inline dependency files for the life of the run.
    _scratch: Option<TempDir>,
}

impl Definition {
    /// Load a definition from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DefinitionError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }

    /// Parse definition text. `path` is the document's on-disk location and
    /// anchors relative dependency paths and additional-file globs.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, DefinitionError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|source| DefinitionError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let doc: Document = match value {
            serde_yaml::Value::Null => Document::default(),
            serde_yaml::Value::Mapping(_) => serde_yaml::from_value(value).map_err(|source| {
                DefinitionError::Malformed {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            other => return Err(DefinitionError::NotAMapping(yaml_kind(&other))),
        };

        Self::from_document(doc, path)
    }

    fn from_document(doc: Document, path: &Path) -> Result<Self, DefinitionError> {
        let version = doc.version.ok_or(DefinitionError::MissingVersion)?;
        let number = version_number(&version)?;
        let schema = Schema::from_number(number)
            .ok_or_else(|| DefinitionError::UnsupportedVersion(number.to_string()))?;

        let reference_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut scratch = None;
        let dependencies = doc.dependencies.unwrap_or_default();
        let exclude = dependencies.exclude.unwrap_or_default();

        let mut resolve = |name: &str, entry: Option<DepEntry>| -> Result<Option<PathBuf>, DefinitionError> {
            match entry {
                None => Ok(None),
                Some(DepEntry::Path(p)) => {
                    let p = PathBuf::from(p);
                    Ok(Some(if p.is_absolute() { p } else { reference_dir.join(p) }))
                }
                Some(inline) => materialize(&mut scratch, name, inline).map(Some),
            }
        };

        let deps = DepPaths {
            galaxy: resolve("galaxy.yml", dependencies.galaxy)?,
            python: resolve("python.txt", dependencies.python)?,
            system: resolve("system.txt", dependencies.system)?,
            exclude_python: resolve("exclude-python.txt", exclude.python)?,
            exclude_system: resolve("exclude-system.txt", exclude.system)?,
        };

        let interpreter = dependencies.python_interpreter.unwrap_or_default();
        let ansible_refs = [dependencies.ansible_core, dependencies.ansible_runner]
            .into_iter()
            .flatten()
            .filter_map(|r| r.package_pip)
            .collect();

        let images = doc.images.unwrap_or_default();
        let base_image = images.base_image.and_then(|i| i.name);
        let builder_image = if schema.allows_builder_image() {
            images.builder_image.and_then(|i| i.name)
        } else {
            None
        };

        let (options, container_init) = if schema.supports_options() {
            normalize_options(doc.options.unwrap_or_default())
        } else {
            (Options::default(), ContainerInit::default())
        };

        let additional_build_steps = doc
            .additional_build_steps
            .into_iter()
            .map(|(section, block)| (section, block.into_lines()))
            .collect();

        let ansible_config = doc.ansible_config.map(|p| {
            let p = PathBuf::from(p);
            if p.is_absolute() { p } else { reference_dir.join(p) }
        });

        Ok(Definition {
            schema,
            path: path.to_path_buf(),
            reference_dir,
            build_arg_overrides: doc.build_arg_defaults,
            base_image,
            builder_image,
            python_path: interpreter.python_path,
            python_package_system: interpreter.package_system,
            ansible_refs,
            options,
            container_init,
            additional_build_steps,
            additional_build_files: doc.additional_build_files,
            ansible_config,
            deps,
            exclude_collections: exclude.all_from_collections,
            _scratch: scratch,
        })
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    /// Location of the definition file itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that relative dependency paths and additional-file globs
    /// are resolved against.
    pub fn reference_dir(&self) -> &Path {
        &self.reference_dir
    }

    /// The resolved file for a dependency category, or its exclude variant.
    /// Stable across calls within one run.
    pub fn dependency_path(&self, category: Category, exclude: bool) -> Option<&Path> {
        let slot = match (category, exclude) {
            (Category::Galaxy, false) => &self.deps.galaxy,
            (Category::Python, false) => &self.deps.python,
            (Category::System, false) => &self.deps.system,
            (Category::Python, true) => &self.deps.exclude_python,
            (Category::System, true) => &self.deps.exclude_system,
            (Category::Galaxy, true) => &None,
        };
        slot.as_deref()
    }

    /// True when any dependency file, exclude variants included, resolved.
    pub fn any_dependency(&self) -> bool {
        Category::ALL
            .into_iter()
            .any(|c| self.dependency_path(c, false).is_some() || self.dependency_path(c, true).is_some())
    }

    /// Collection names from `exclude.all_from_collections`.
    pub fn exclude_collections(&self) -> &[String] {
        &self.exclude_collections
    }

    /// Effective default for a recognized build arg, `None` when the arg
    /// should not be declared at all. `EE_BUILDER_IMAGE` drops out of
    /// version 3+ definitions entirely.
    pub fn build_arg_default(&self, name: &str) -> Option<String> {
        match name {
            "EE_BASE_IMAGE" => self
                .base_image
                .clone()
                .or_else(|| self.build_arg_overrides.get(name).cloned())
                .or_else(|| constants::build_arg_default(name).map(str::to_string)),
            "EE_BUILDER_IMAGE" => {
                if self.schema.allows_builder_image() {
                    self.builder_image
                        .clone()
                        .or_else(|| self.build_arg_overrides.get(name).cloned())
                        .or_else(|| constants::build_arg_default(name).map(str::to_string))
                } else {
                    None
                }
            }
            _ => self
                .build_arg_overrides
                .get(name)
                .cloned()
                .or_else(|| constants::build_arg_default(name).map(str::to_string)),
        }
    }

    /// The dedicated builder image, when one is configured.
    pub fn builder_image(&self) -> Option<&str> {
        self.builder_image.as_deref()
    }

    pub fn python_path(&self) -> Option<&str> {
        self.python_path.as_deref()
    }

    pub fn python_package_system(&self) -> Option<&str> {
        self.python_package_system.as_deref()
    }

    /// Space-joined pip refs for ansible-core/ansible-runner, if declared.
    pub fn ansible_ref_install_list(&self) -> Option<String> {
        if self.ansible_refs.is_empty() {
            None
        } else {
            Some(self.ansible_refs.join(" "))
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn container_init(&self) -> &ContainerInit {
        &self.container_init
    }

    /// Raw lines for a custom-step section, already normalized from either
    /// a block of text or a list.
    pub fn custom_steps(&self, section: &str) -> &[String] {
        self.additional_build_steps
            .get(section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn additional_build_files(&self) -> &[AdditionalBuildFile] {
        &self.additional_build_files
    }

    pub fn ansible_config(&self) -> Option<&Path> {
        self.ansible_config.as_deref()
    }
}

/// Write inline dependency content to a scratch file, creating the scratch
/// directory on first use.
fn materialize(
    scratch: &mut Option<TempDir>,
    name: &str,
    entry: DepEntry,
) -> Result<PathBuf, DefinitionError> {
    let content = match entry {
        DepEntry::Path(_) => unreachable!("paths are resolved by the caller"),
        DepEntry::Lines(lines) => {
            let mut text = lines.join("\n");
            text.push('\n');
            text
        }
        DepEntry::Inline(mapping) => serde_yaml::to_string(&mapping)
            .expect("a parsed YAML mapping serializes back to YAML"),
    };

    if scratch.is_none() {
        *scratch = Some(TempDir::new().map_err(DefinitionError::Scratch)?);
    }
    let dir = scratch.as_ref().expect("scratch dir was just created");
    let dest = dir.path().join(name);
    std::fs::write(&dest, content).map_err(DefinitionError::Scratch)?;
    Ok(dest)
}

fn version_number(value: &serde_yaml::Value) -> Result<u64, DefinitionError> {
    match value {
        serde_yaml::Value::Number(n) => n.as_u64(),
        serde_yaml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| DefinitionError::UnsupportedVersion(format!("{value:?}")))
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a list",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

fn normalize_options(doc: OptionsDoc) -> (Options, ContainerInit) {
    let defaults = Options::default();
    let options = Options {
        skip_ansible_check: doc.skip_ansible_check.unwrap_or(defaults.skip_ansible_check),
        skip_pip_install: doc.skip_pip_install.unwrap_or(defaults.skip_pip_install),
        relax_passwd_permissions: doc
            .relax_passwd_permissions
            .unwrap_or(defaults.relax_passwd_permissions),
        workdir: doc.workdir.or(defaults.workdir),
        user: doc.user.map(|u| u.into_string()).or(defaults.user),
        package_manager_path: doc
            .package_manager_path
            .unwrap_or(defaults.package_manager_path),
    };

    let init_defaults = ContainerInit::v3_defaults();
    let init_doc = doc.container_init.unwrap_or_default();
    let container_init = ContainerInit {
        entrypoint: init_doc
            .entrypoint
            .map(StringOrSeq::into_string)
            .or(init_defaults.entrypoint),
        cmd: init_doc
            .cmd
            .map(StringOrSeq::into_string)
            .or(init_defaults.cmd),
        package_pip: init_doc.package_pip.or(init_defaults.package_pip),
    };

    (options, container_init)
}

// ---------------------------------------------------------------------------
// Serde document shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Document {
    version: Option<serde_yaml::Value>,
    build_arg_defaults: HashMap<String, String>,
    dependencies: Option<DependenciesDoc>,
    images: Option<ImagesDoc>,
    options: Option<OptionsDoc>,
    additional_build_steps: HashMap<String, StepBlock>,
    additional_build_files: Vec<AdditionalBuildFile>,
    ansible_config: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DependenciesDoc {
    galaxy: Option<DepEntry>,
    python: Option<DepEntry>,
    system: Option<DepEntry>,
    exclude: Option<ExcludeDoc>,
    ansible_core: Option<PipRef>,
    ansible_runner: Option<PipRef>,
    python_interpreter: Option<PythonInterpreterDoc>,
}

/// A dependency is either a file path or inline content: a list of
/// requirement lines, or (galaxy only) a full requirements mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DepEntry {
    Path(String),
    Lines(Vec<String>),
    Inline(serde_yaml::Mapping),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExcludeDoc {
    python: Option<DepEntry>,
    system: Option<DepEntry>,
    all_from_collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PipRef {
    package_pip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PythonInterpreterDoc {
    package_system: Option<String>,
    python_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImagesDoc {
    base_image: Option<ImageRef>,
    builder_image: Option<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OptionsDoc {
    skip_ansible_check: Option<bool>,
    skip_pip_install: Option<bool>,
    relax_passwd_permissions: Option<bool>,
    workdir: Option<String>,
    user: Option<Scalar>,
    package_manager_path: Option<String>,
    container_init: Option<ContainerInitDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerInitDoc {
    entrypoint: Option<StringOrSeq>,
    cmd: Option<StringOrSeq>,
    package_pip: Option<String>,
}

/// Accepts `user: 1000` as well as `user: "1000"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
        }
    }
}

/// Entrypoint and cmd accept a plain string or a list of words.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrSeq {
    Str(String),
    Seq(Vec<String>),
}

impl StringOrSeq {
    fn into_string(self) -> String {
        match self {
            StringOrSeq::Str(s) => s,
            StringOrSeq::Seq(words) => words.join(" "),
        }
    }
}

/// Custom step sections accept a multi-line block or a pre-itemized list;
/// both normalize to a sequence of raw lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepBlock {
    Block(String),
    Lines(Vec<String>),
}

impl StepBlock {
    fn into_lines(self) -> Vec<String> {
        match self {
            StepBlock::Block(text) => text.trim().lines().map(str::to_string).collect(),
            StepBlock::Lines(lines) => lines,
        }
    }
}
