use serde::{Deserialize, Serialize};

/// Version information about the running build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub build_profile: String,
    pub build_features: Vec<String>,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "canopy {} ({})", self.version, self.build_profile)
    }
}

pub fn build_info() -> BuildInfo {
    let build_profile = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_profile: build_profile.to_string(),
        build_features: Vec::new(),
    }
}

/// Shorthand for [`build_info`] usable from other crates' ops.
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::build_info()
    };
}
