//! Containerfile generator for ansible execution environments
//!
//! A declarative definition describes the execution environment; forge turns
//! it into a multi-stage Containerfile plus a populated build context that a
//! container runtime (podman or docker) can build directly.
//!
//! # Example Definition
//!
//! ```yaml
//! version: 3
//!
//! dependencies:
//!   galaxy: requirements.yml
//!   python:
//!     - pytz
//!     - requests>=2.0
//!   system: bindep.txt
//!
//! images:
//!   base_image:
//!     name: quay.io/ansible/ansible-runner:latest
//!
//! additional_build_steps:
//!   prepend_base:
//!     - RUN echo "hello from the base stage"
//! ```
//!
//! # Generation Pipeline
//!
//! - [`definition::Definition`] loads and normalizes the document.
//! - [`containerfile::Containerfile`] assembles the instruction sequence,
//!   staging context files through [`context::BuildContext`] as it goes.
//! - `Containerfile::write` persists the result, one instruction per line.
//!
//! Generation never runs a container build and never fails on a missing
//! optional input; absent files downgrade to warnings, and hard problems
//! (such as a base image without ansible-galaxy) surface when the emitted
//! instructions run.

pub mod constants;
pub mod containerfile;
pub mod context;
pub mod definition;
pub mod error;
pub mod output;
pub mod scripts;
pub mod utils;

pub use containerfile::{Containerfile, GalaxyOptions, Runtime, Steps};
pub use context::BuildContext;
pub use definition::{Category, Definition, Schema};
pub use error::DefinitionError;
