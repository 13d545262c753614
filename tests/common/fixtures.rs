//! Test fixtures - sample definitions for generation tests.

#![allow(dead_code)]

/// Version 3 definition with only a python requirement.
pub const V3_PYTHON_ONLY: &str = "\
version: 3
dependencies:
  python: requirements.txt
";

/// Version 3 definition with galaxy, python, and system requirements.
pub const V3_ALL_DEPS: &str = "\
version: 3
dependencies:
  galaxy: requirements.yml
  python: requirements.txt
  system: bindep.txt
";

/// Version 3 definition with no dependencies at all.
pub const V3_EMPTY: &str = "version: 3\n";

/// Version 1 definition with a galaxy requirement.
pub const V1_GALAXY: &str = "\
version: 1
dependencies:
  galaxy: requirements.yml
";

/// Version 2 definition with a dedicated builder image.
pub const V2_BUILDER_IMAGE: &str = "\
version: 2
images:
  base_image:
    name: quay.io/example/base:latest
  builder_image:
    name: quay.io/example/builder:latest
";

/// Galaxy requirements file content used across tests.
pub const GALAXY_REQUIREMENTS: &str = "\
collections:
  - name: community.general
";
