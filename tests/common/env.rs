//! A scratch directory holding one definition and its build context.

use ee_forge::{Containerfile, Definition, GalaxyOptions, Runtime};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnv {
    temp: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        TestEnv {
            temp: TempDir::new().unwrap(),
        }
    }

    /// Directory the definition lives in; relative dependency paths and
    /// globs resolve against it.
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn context_dir(&self) -> PathBuf {
        self.temp.path().join("context")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.context_dir().join("_build")
    }

    /// Write a file next to the definition and return its path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn load_definition(&self, yaml: &str) -> Definition {
        let path = self.write("execution-environment.yml", yaml);
        Definition::load(path).unwrap()
    }

    /// Run a full generation and return the produced instruction sequence.
    pub fn generate(&self, yaml: &str) -> Vec<String> {
        self.generate_with(yaml, GalaxyOptions::default())
    }

    pub fn generate_with(&self, yaml: &str, galaxy: GalaxyOptions) -> Vec<String> {
        let definition = self.load_definition(yaml);
        let mut containerfile = Containerfile::new(
            &definition,
            self.context_dir(),
            Runtime::Podman,
            None,
            galaxy,
        );
        containerfile.prepare().unwrap();
        containerfile.write().unwrap();
        containerfile.steps().to_vec()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// All `FROM` instructions, in order.
pub fn stages(steps: &[String]) -> Vec<&str> {
    steps
        .iter()
        .filter(|line| line.starts_with("FROM "))
        .map(String::as_str)
        .collect()
}

/// Number of steps containing the needle.
pub fn count_containing(steps: &[String], needle: &str) -> usize {
    steps.iter().filter(|line| line.contains(needle)).count()
}

/// The single step containing the needle; panics unless exactly one matches.
pub fn find_step<'a>(steps: &'a [String], needle: &str) -> &'a str {
    let matches: Vec<&String> = steps.iter().filter(|line| line.contains(needle)).collect();
    assert_eq!(matches.len(), 1, "expected one step containing {needle:?}, got {matches:?}");
    matches[0]
}
