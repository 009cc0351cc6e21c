//! Shared test utilities for service integration tests
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ::common::auth::ManualClock;
use ::common::cache::FixedMemory;
use ::common::config::{parse_str, ConfigFormat, ServiceConfig};
use ::common::service::Service;
use tempfile::TempDir;

pub const T0: i64 = 1_700_000_000;

/// A directory with a few files of each kind, and a nested directory.
pub fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("table.csv"), "a,b\n1,2\n3,4\n").unwrap();
    fs::write(root.join("image.tif"), [7u8; 64]).unwrap();
    fs::write(root.join("README.md"), "not served").unwrap();
    fs::create_dir(root.join("nested")).unwrap();
    fs::write(root.join("nested").join("cube.h5"), [1u8; 32]).unwrap();
    dir
}

pub fn yaml(text: &str) -> ServiceConfig {
    parse_str(text, ConfigFormat::Yaml, Path::new("test.yml")).unwrap()
}

/// Build a service rooted at `dir` with a manual clock and 1 GiB of
/// pretend memory.
pub fn service(text: &str, dir: &Path) -> (Service, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_timestamp(T0));
    let service = Service::builder(yaml(text))
        .clock(clock.clone())
        .memory(Arc::new(FixedMemory(1 << 30)))
        .config_dir(dir)
        .build()
        .unwrap();
    (service, clock)
}

pub fn path(path: &str) -> Vec<String> {
    ::common::mounts::segments(path)
}
