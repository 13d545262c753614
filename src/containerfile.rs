//! Multi-stage Containerfile assembly.
//!
//! [`Containerfile::prepare`] appends instruction lines stage by stage:
//! `base` always, `galaxy` only when a galaxy requirement resolves,
//! `builder` and `final` always. Steps are append-only; conditional logic
//! decides membership, never order. [`Containerfile::write`] persists the
//! finished sequence, one instruction per line.

use crate::constants;
use crate::context::BuildContext;
use crate::definition::{Category, Definition};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Container runtimes the generated file targets. The two instruction
/// dialects are interchangeable for everything forge emits; only the
/// default output filename differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Podman,
    Docker,
}

impl Runtime {
    /// Default name of the generated instruction file.
    pub fn instruction_filename(self) -> &'static str {
        match self {
            Runtime::Podman => "Containerfile",
            Runtime::Docker => "Dockerfile",
        }
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "podman" => Ok(Runtime::Podman),
            "docker" => Ok(Runtime::Docker),
            other => Err(format!("unknown container runtime '{other}' (expected podman or docker)")),
        }
    }
}

/// Signature-verification settings for the galaxy collection install.
/// A keyring switches the install to opportunistic GPG validation; without
/// one, verification is disabled outright.
#[derive(Debug, Clone, Default)]
pub struct GalaxyOptions {
    pub keyring: Option<PathBuf>,
    pub required_valid_signature_count: Option<u32>,
    pub ignore_signature_status_codes: Vec<String>,
}

/// Append-only instruction sequence. Lines are never rewritten or removed
/// once added, which keeps stage ordering a function of append order alone.
#[derive(Debug, Default)]
pub struct Steps {
    lines: Vec<String>,
}

impl Steps {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn extend<I>(&mut self, lines: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
    }

    pub fn as_slice(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Consume the builder, yielding the finalized sequence.
    pub fn finish(self) -> Vec<String> {
        self.lines
    }
}

/// Assembles and writes the instruction file for one definition.
pub struct Containerfile<'a> {
    definition: &'a Definition,
    context: BuildContext,
    path: PathBuf,
    galaxy: GalaxyOptions,
    steps: Steps,
}

impl<'a> Containerfile<'a> {
    pub fn new(
        definition: &'a Definition,
        build_context: impl AsRef<Path>,
        runtime: Runtime,
        output_filename: Option<&str>,
        galaxy: GalaxyOptions,
    ) -> Self {
        let build_context = build_context.as_ref().to_path_buf();
        let filename = output_filename.unwrap_or_else(|| runtime.instruction_filename());
        let path = build_context.join(filename);
        Containerfile {
            definition,
            context: BuildContext::new(build_context),
            path,
            galaxy,
            steps: Steps::default(),
        }
    }

    /// Where [`Containerfile::write`] puts the instruction file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build_context(&self) -> &BuildContext {
        &self.context
    }

    /// The instruction lines appended so far.
    pub fn steps(&self) -> &[String] {
        self.steps.as_slice()
    }

    /// Build the full instruction sequence, staging context files along the
    /// way. Deterministic for a given definition and filesystem state.
    pub fn prepare(&mut self) -> Result<()> {
        let definition = self.definition;

        // Build args all need to go at the top of the file; later stages
        // re-declare them without values.
        self.insert_global_args(true);

        self.steps.extend([
            "# Base build stage",
            "FROM $EE_BASE_IMAGE as base",
            "USER root",
            "ENV PIP_BREAK_SYSTEM_PACKAGES=1",
        ]);
        self.insert_global_args(false);
        self.context
            .populate(definition, self.galaxy.keyring.as_deref(), &mut self.steps)?;
        self.insert_custom_steps("prepend_base");

        if definition.builder_image().is_none() {
            if definition.python_package_system().is_some() {
                self.steps.push(
                    "RUN $PKGMGR install $PYPKG -y ; if [ -z $PKGMGR_PRESERVE_CACHE ]; then $PKGMGR clean all; fi",
                );
            }

            // pip needs to be available for later stages.
            if definition.schema().supports_options() && !definition.options().skip_pip_install {
                self.steps.push("RUN /output/scripts/pip_install $PYCMD");
            }

            if definition.ansible_ref_install_list().is_some() {
                self.steps
                    .push("RUN $PYCMD -m pip install --no-cache-dir $ANSIBLE_INSTALL_REFS");
            }
        }
        self.insert_custom_steps("append_base");

        if definition.dependency_path(Category::Galaxy, false).is_some() {
            self.steps.extend(["", "# Galaxy build stage", "FROM base as galaxy"]);
            self.insert_global_args(false);
            self.insert_custom_steps("prepend_galaxy");

            // Fails the image build, not generation, when the base image
            // has no ansible-galaxy.
            self.steps.push("RUN /output/scripts/check_galaxy");

            self.prepare_ansible_config_file();
            self.prepare_build_context_copy();
            self.prepare_galaxy_install_steps();
            self.insert_custom_steps("append_galaxy");
        }

        let builder_base = if definition.builder_image().is_some()
            || definition.schema().forces_builder_stage_image()
        {
            "$EE_BUILDER_IMAGE"
        } else {
            // dynamic builder, created from the customized base
            "base"
        };

        self.steps.extend([
            String::new(),
            "# Builder build stage".to_string(),
            format!("FROM {builder_base} as builder"),
            "ENV PIP_BREAK_SYSTEM_PACKAGES=1".to_string(),
            "WORKDIR /build".to_string(),
        ]);
        self.insert_global_args(false);

        if builder_base == "base" {
            self.steps
                .push("RUN $PYCMD -m pip install --no-cache-dir bindep pyyaml packaging");
        } else {
            // A dedicated builder image may lack pip for $PYCMD.
            self.steps.push(format!(
                "COPY {}/scripts/pip_install /output/scripts/pip_install",
                constants::USER_CONTENT_SUBFOLDER
            ));
            self.steps.push("RUN /output/scripts/pip_install $PYCMD");
        }

        self.insert_custom_steps("prepend_builder");
        self.prepare_galaxy_copy_steps();
        self.prepare_introspect_assemble_steps();
        self.insert_custom_steps("append_builder");

        self.steps.extend([
            "",
            "# Final build stage",
            "FROM base as final",
            "ENV PIP_BREAK_SYSTEM_PACKAGES=1",
        ]);
        self.insert_global_args(false);
        self.insert_custom_steps("prepend_final");

        if definition.schema().supports_options() && !definition.options().skip_ansible_check {
            self.steps.push("RUN /output/scripts/check_ansible $PYCMD");
        }

        self.prepare_galaxy_copy_steps();
        self.prepare_system_runtime_deps_steps();

        if definition.schema().supports_options() {
            if definition.options().relax_passwd_permissions {
                self.steps.push("RUN chmod ug+rw /etc/passwd");
            }
            if let Some(workdir) = definition.options().workdir.clone() {
                self.prepare_final_workdir(&workdir);
            }
        }

        if let Some(package) = definition.container_init().package_pip.clone() {
            self.steps
                .push(format!("RUN $PYCMD -m pip install --no-cache-dir '{package}'"));
        }

        self.insert_custom_steps("append_final");

        // Purge the temporary /output directory used by intermediate stages.
        self.steps.push("RUN rm -rf /output");

        self.steps.push("LABEL ansible-execution-environment=true");

        if definition.schema().supports_options() {
            if let Some(user) = definition.options().user.clone() {
                self.steps.push(format!("USER {user}"));
            }
        }
        self.prepare_entrypoint_steps();

        Ok(())
    }

    /// Persist the prepared steps, one instruction per line, overwriting
    /// any previous output.
    pub fn write(&self) -> Result<()> {
        let mut text = String::new();
        for line in self.steps.as_slice() {
            text.push_str(line);
            text.push('\n');
        }
        std::fs::write(&self.path, text)
            .with_context(|| format!("cannot write {}", self.path.display()))
    }

    /// Declare the recognized build args in canonical order. The top-of-file
    /// block carries literal values (quoted, embedded spaces are legal);
    /// in-stage blocks re-declare names only. Args without a resolved value
    /// are omitted; empty strings still emit so they stay overridable.
    fn insert_global_args(&mut self, include_values: bool) {
        let definition = self.definition;
        let mut args: Vec<(&str, Option<String>)> = vec![
            ("EE_BASE_IMAGE", definition.build_arg_default("EE_BASE_IMAGE")),
            ("EE_BUILDER_IMAGE", definition.build_arg_default("EE_BUILDER_IMAGE")),
            (
                "PYCMD",
                Some(
                    definition
                        .python_path()
                        .unwrap_or(constants::DEFAULT_PYTHON_PATH)
                        .to_string(),
                ),
            ),
            ("PYPKG", definition.python_package_system().map(str::to_string)),
            (
                "PKGMGR_PRESERVE_CACHE",
                definition.build_arg_default("PKGMGR_PRESERVE_CACHE"),
            ),
            (
                "ANSIBLE_GALAXY_CLI_COLLECTION_OPTS",
                definition.build_arg_default("ANSIBLE_GALAXY_CLI_COLLECTION_OPTS"),
            ),
            (
                "ANSIBLE_GALAXY_CLI_ROLE_OPTS",
                definition.build_arg_default("ANSIBLE_GALAXY_CLI_ROLE_OPTS"),
            ),
            ("ANSIBLE_INSTALL_REFS", definition.ansible_ref_install_list()),
        ];

        if definition.schema().emits_pkgmgr_arg() {
            args.push(("PKGMGR", Some(definition.options().package_manager_path.clone())));
        }

        for (name, value) in args {
            match value {
                None => {}
                Some(value) if include_values => {
                    self.steps.push(format!("ARG {name}=\"{value}\""));
                }
                Some(_) => self.steps.push(format!("ARG {name}")),
            }
        }
        self.steps.push("");
    }

    /// Splice user-declared raw lines for a section, verbatim.
    fn insert_custom_steps(&mut self, section: &str) {
        let definition = self.definition;
        self.steps.extend(definition.custom_steps(section).iter().cloned());
    }

    /// Version 1 kept the ansible config in the user's home directory.
    fn prepare_ansible_config_file(&mut self) {
        if !self.definition.schema().legacy_ansible_cfg() {
            return;
        }
        if self.definition.ansible_config().is_some() {
            self.steps.extend([
                format!("COPY {}/ansible.cfg ~/.ansible.cfg", constants::USER_CONTENT_SUBFOLDER),
                String::new(),
            ]);
        }
    }

    fn prepare_build_context_copy(&mut self) {
        if self.definition.any_dependency() {
            self.steps.extend([
                format!("COPY {} /build", constants::USER_CONTENT_SUBFOLDER),
                "WORKDIR /build".to_string(),
                String::new(),
            ]);
        }
    }

    fn prepare_galaxy_install_steps(&mut self) {
        let mut env = "";
        let mut install_opts = format!(
            "-r {} --collections-path \"{}\"",
            constants::STD_GALAXY_FILENAME,
            constants::BASE_COLLECTIONS_PATH
        );

        for code in &self.galaxy.ignore_signature_status_codes {
            install_opts.push_str(&format!(" --ignore-signature-status-code {code}"));
        }

        if let Some(count) = self.galaxy.required_valid_signature_count {
            install_opts.push_str(&format!(" --required-valid-signature-count {count}"));
        }

        if self.galaxy.keyring.is_some() {
            install_opts.push_str(&format!(" --keyring \"{}\"", constants::DEFAULT_KEYRING_NAME));
        } else {
            // ansible-galaxy below 2.13 has no --disable-gpg-verify flag, so
            // verification is disabled through the environment. Not an ENV
            // instruction: the setting must not leak into the final image.
            env = "ANSIBLE_GALAXY_DISABLE_GPG_VERIFY=1 ";
        }

        // If nothing gets installed, this directory must still exist or the
        // later COPY --from=galaxy step fails.
        self.steps
            .push(format!("RUN mkdir -p {}", ansible_share_dir()));

        self.steps.push(format!(
            "RUN ansible-galaxy role install $ANSIBLE_GALAXY_CLI_ROLE_OPTS -r {} --roles-path \"{}\"",
            constants::STD_GALAXY_FILENAME,
            constants::BASE_ROLES_PATH
        ));
        self.steps.push(format!(
            "RUN {env}ansible-galaxy collection install $ANSIBLE_GALAXY_CLI_COLLECTION_OPTS {install_opts}"
        ));
    }

    /// Add a `COPY` into the builder workdir for a staged file. The return
    /// value feeds the introspection command: a flag is added iff its file
    /// was both staged and copied.
    fn add_copy_for_file(&mut self, filename: &str) -> bool {
        if self.context.has_staged(filename) {
            // WORKDIR is /build, so the shorter relative destination works.
            self.steps.push(format!(
                "COPY {}/{filename} {filename}",
                constants::USER_CONTENT_SUBFOLDER
            ));
            true
        } else {
            false
        }
    }

    fn prepare_introspect_assemble_steps(&mut self) {
        // The introspect/assemble block applies when any form of
        // requirement resolved, exclude variants included.
        if !self.definition.any_dependency() {
            return;
        }

        let mut introspect_cmd = String::from("RUN $PYCMD /output/scripts/introspect.py introspect");

        for (option, exclude_option, req_file) in [
            ("--user-pip", "--exclude-pip-reqs", constants::STD_PIP_FILENAME),
            ("--user-bindep", "--exclude-bindep-reqs", constants::STD_BINDEP_FILENAME),
        ] {
            if self.add_copy_for_file(req_file) {
                introspect_cmd.push_str(&format!(" {option}={req_file}"));
            }

            let exclude_req_file = format!("exclude-{req_file}");
            if self.add_copy_for_file(&exclude_req_file) {
                introspect_cmd.push_str(&format!(" {exclude_option}={exclude_req_file}"));
            }
        }

        if self.add_copy_for_file(constants::EXCL_COLLECTIONS_FILENAME) {
            introspect_cmd.push_str(&format!(
                " --exclude-collection-reqs={}",
                constants::EXCL_COLLECTIONS_FILENAME
            ));
        }

        introspect_cmd.push_str(" --write-bindep=/tmp/src/bindep.txt --write-pip=/tmp/src/requirements.txt");

        self.steps.push(introspect_cmd);
        self.steps.push("RUN /output/scripts/assemble");
    }

    fn prepare_system_runtime_deps_steps(&mut self) {
        self.steps.extend([
            "COPY --from=builder /output/ /output/",
            "RUN /output/scripts/install-from-bindep && rm -rf /output/wheels",
        ]);
    }

    fn prepare_galaxy_copy_steps(&mut self) {
        if self.definition.dependency_path(Category::Galaxy, false).is_some() {
            let dir = ansible_share_dir();
            self.steps
                .extend([String::new(), format!("COPY --from=galaxy {dir} {dir}"), String::new()]);
        }
    }

    fn prepare_final_workdir(&mut self, workdir: &str) {
        let workdir = workdir.trim();
        if workdir.is_empty() {
            return;
        }
        self.steps.extend([
            format!("RUN mkdir -p {workdir} && chgrp 0 {workdir} && chmod -R ug+rwx {workdir}"),
            format!("WORKDIR {workdir}"),
        ]);
    }

    fn prepare_entrypoint_steps(&mut self) {
        let init = self.definition.container_init();
        if let Some(entrypoint) = &init.entrypoint {
            self.steps.push(format!("ENTRYPOINT {entrypoint}"));
        }
        if let Some(cmd) = &init.cmd {
            self.steps.push(format!("CMD {cmd}"));
        }
    }
}

/// Parent of the collections path, home to both roles and collections.
fn ansible_share_dir() -> &'static str {
    Path::new(constants::BASE_COLLECTIONS_PATH)
        .parent()
        .and_then(Path::to_str)
        .expect("collections path has a parent directory")
}
