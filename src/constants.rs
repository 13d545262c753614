//! Fixed names and defaults shared by the assembler and the context preparer.

/// Definition file looked up when `-f` is not given.
pub const DEFAULT_EE_FILENAME: &str = "execution-environment.yml";

/// Build context directory created next to the caller unless overridden.
pub const DEFAULT_BUILD_CONTEXT: &str = "context";

/// Subfolder of the build context holding generated and staged content.
pub const USER_CONTENT_SUBFOLDER: &str = "_build";

/// Canonical in-context names for the dependency files.
pub const STD_GALAXY_FILENAME: &str = "requirements.yml";
pub const STD_PIP_FILENAME: &str = "requirements.txt";
pub const STD_BINDEP_FILENAME: &str = "bindep.txt";

/// In-context name for the materialized `exclude.all_from_collections` list.
pub const EXCL_COLLECTIONS_FILENAME: &str = "exclude-collections.txt";

/// In-context name for a user-supplied galaxy signing keyring.
pub const DEFAULT_KEYRING_NAME: &str = "keyring.gpg";

/// Where roles and collections are installed inside the image.
pub const BASE_ROLES_PATH: &str = "/usr/share/ansible/roles";
pub const BASE_COLLECTIONS_PATH: &str = "/usr/share/ansible/collections";

/// Directory in the final image that survives the `/output` purge. The
/// entrypoint script is copied here so it is still present at run time.
pub const FINAL_IMAGE_BIN_PATH: &str = "/opt/builder/bin";

/// Helper scripts staged into `_build/scripts` for every generation run.
pub const SCRIPT_FILES: [&str; 7] = [
    "assemble",
    "install-from-bindep",
    "introspect.py",
    "check_galaxy",
    "check_ansible",
    "pip_install",
    "entrypoint",
];

/// Build-arg defaults that apply when the definition does not override them.
/// Empty strings are deliberate: those args still appear in the generated
/// file so they can be set at build time.
pub const BUILD_ARG_DEFAULTS: [(&str, &str); 5] = [
    ("ANSIBLE_GALAXY_CLI_COLLECTION_OPTS", ""),
    ("ANSIBLE_GALAXY_CLI_ROLE_OPTS", ""),
    ("EE_BASE_IMAGE", "quay.io/ansible/ansible-runner:latest"),
    ("EE_BUILDER_IMAGE", "quay.io/ansible/ansible-builder:latest"),
    ("PKGMGR_PRESERVE_CACHE", ""),
];

/// Interpreter used when the definition does not name one.
pub const DEFAULT_PYTHON_PATH: &str = "/usr/bin/python3";

/// Package manager used by version 3+ definitions unless overridden.
pub const DEFAULT_PKGMGR_PATH: &str = "/usr/bin/dnf";

/// Look up a build-arg default by name.
pub fn build_arg_default(name: &str) -> Option<&'static str> {
    BUILD_ARG_DEFAULTS
        .iter()
        .find(|(arg, _)| *arg == name)
        .map(|(_, value)| *value)
}
