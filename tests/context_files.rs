//! Build-context staging tests: canonical destinations, mtime-independent
//! copies, and the warn-and-skip policy for additional build files.

mod common;

use common::{count_containing, TestEnv};
use filetime::FileTime;

#[test]
fn test_requirement_file_round_trips() {
    let env = TestEnv::new();
    let content = "pytz  # for timezones\npython-dateutil>=2.8\n";
    env.write("requirements.txt", content);

    env.generate(common::V3_PYTHON_ONLY);

    let staged = env.outputs_dir().join("requirements.txt");
    assert_eq!(std::fs::read_to_string(staged).unwrap(), content);
}

#[test]
fn test_copy_is_independent_of_source_mtime() {
    let env = TestEnv::new();
    let source = env.write("requirements.txt", "pytz\n");
    env.generate(common::V3_PYTHON_ONLY);

    let staged = env.outputs_dir().join("requirements.txt");
    let staged_mtime = FileTime::from_last_modification_time(&std::fs::metadata(&staged).unwrap());

    // Rewrite the source with different content of the same length and pin
    // its mtime to the staged copy's, as a freshly materialized scratch file
    // might coincidentally have. Content must still win.
    env.write("requirements.txt", "ntpz\n");
    filetime::set_file_mtime(&source, staged_mtime).unwrap();

    env.generate(common::V3_PYTHON_ONLY);
    assert_eq!(std::fs::read_to_string(&staged).unwrap(), "ntpz\n");
}

#[test]
fn test_inline_dependencies_stage_like_files() {
    let env = TestEnv::new();
    let steps = env.generate(
        "version: 3\ndependencies:\n  python:\n    - pytz\n    - requests>=2\n",
    );

    assert_eq!(
        std::fs::read_to_string(env.outputs_dir().join("requirements.txt")).unwrap(),
        "pytz\nrequests>=2\n"
    );
    assert_eq!(count_containing(&steps, "--user-pip=requirements.txt"), 1);
}

#[test]
fn test_zero_glob_matches_skips_entry() {
    let env = TestEnv::new();
    let steps = env.generate(
        "version: 3\nadditional_build_files:\n  - src: missing/*.cfg\n    dest: configs\n",
    );

    assert!(!env.outputs_dir().join("configs").exists());
    assert_eq!(count_containing(&steps, "configs"), 0);
}

#[test]
fn test_glob_matches_copy_under_dest_subfolder() {
    let env = TestEnv::new();
    env.write("files/one.cfg", "1");
    env.write("files/two.cfg", "2");

    env.generate(
        "version: 3\nadditional_build_files:\n  - src: files/*.cfg\n    dest: configs\n",
    );

    assert_eq!(
        std::fs::read_to_string(env.outputs_dir().join("configs/one.cfg")).unwrap(),
        "1"
    );
    assert_eq!(
        std::fs::read_to_string(env.outputs_dir().join("configs/two.cfg")).unwrap(),
        "2"
    );
}

#[test]
fn test_absolute_directory_source_copies_recursively() {
    let env = TestEnv::new();
    env.write("payload/nested/deep.txt", "deep");
    let payload = env.root().join("payload");

    env.generate(&format!(
        "version: 3\nadditional_build_files:\n  - src: {}\n    dest: payload\n",
        payload.display()
    ));

    assert_eq!(
        std::fs::read_to_string(env.outputs_dir().join("payload/nested/deep.txt")).unwrap(),
        "deep"
    );
}

#[test]
fn test_scripts_always_staged() {
    let env = TestEnv::new();
    let steps = env.generate(common::V3_EMPTY);

    for script in ee_forge::constants::SCRIPT_FILES {
        assert!(
            env.outputs_dir().join("scripts").join(script).exists(),
            "missing staged script {script}"
        );
    }
    assert_eq!(count_containing(&steps, "COPY _build/scripts/ /output/scripts/"), 1);
    assert_eq!(
        count_containing(&steps, "COPY _build/scripts/entrypoint /opt/builder/bin/entrypoint"),
        1
    );
}

#[test]
fn test_collection_exclusion_list_materializes() {
    let env = TestEnv::new();
    env.write("requirements.txt", "pytz\n");
    let steps = env.generate(
        "version: 3\ndependencies:\n  python: requirements.txt\n  exclude:\n    all_from_collections:\n      - community.general\n      - ansible.posix\n",
    );

    assert_eq!(
        std::fs::read_to_string(env.outputs_dir().join("exclude-collections.txt")).unwrap(),
        "community.general\nansible.posix"
    );
    assert_eq!(
        count_containing(&steps, "--exclude-collection-reqs=exclude-collections.txt"),
        1
    );
}
