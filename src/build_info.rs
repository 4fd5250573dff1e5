use serde::Serialize;

/// Commit and build date of one deployable component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentBuild {
    pub commit: String,
    pub date: String,
}

/// Build metadata captured once at startup and injected into the app state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub backend: ComponentBuild,
    pub frontend: ComponentBuild,
}

fn env_or_unknown(var: &str, compiled: Option<&'static str>) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| compiled.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

impl BuildInfo {
    /// Reads `BUILD_COMMIT`, `BUILD_DATE`, `FRONTEND_COMMIT` and `FRONTEND_DATE`,
    /// falling back to values baked in at compile time.
    pub fn from_env() -> Self {
        Self {
            backend: ComponentBuild {
                commit: env_or_unknown("BUILD_COMMIT", option_env!("BUILD_COMMIT")),
                date: env_or_unknown("BUILD_DATE", option_env!("BUILD_DATE")),
            },
            frontend: ComponentBuild {
                commit: env_or_unknown("FRONTEND_COMMIT", option_env!("FRONTEND_COMMIT")),
                date: env_or_unknown("FRONTEND_DATE", option_env!("FRONTEND_DATE")),
            },
        }
    }

    pub fn unknown() -> Self {
        let unknown = ComponentBuild {
            commit: "unknown".to_string(),
            date: "unknown".to_string(),
        };
        Self {
            backend: unknown.clone(),
            frontend: unknown,
        }
    }
}
