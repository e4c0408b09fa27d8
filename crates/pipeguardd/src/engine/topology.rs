//! Compose topology resolution (spec Section 4.9.1).

use pipeguard_core::Stage;

/// Which services a stage needs beyond the long-lived runner container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub app: bool,
    pub db: bool,
    pub zap: bool,
}

impl Topology {
    pub fn resolve(stage: Stage, requires_db: bool) -> Self {
        match stage {
            Stage::SmokeTest => Self { app: true, db: requires_db, zap: false },
            Stage::Dast => Self { app: true, db: requires_db, zap: true },
            _ => Self { app: true, db: false, zap: false },
        }
    }

    pub fn needs_compose(self) -> bool {
        self.db || self.zap
    }

    /// Fragment file set, in the order they're passed to `compose -f`
    /// (spec Section 4.9.1).
    pub fn fragment_files(self) -> Vec<String> {
        let mut fragments = vec!["base.yml".to_string()];
        fragments.push(if self.zap { "app-jar.yml" } else { "app-runner.yml" }.to_string());
        if self.db {
            fragments.push("db.yml".to_string());
            fragments.push("app-db.yml".to_string());
        }
        if self.zap {
            fragments.push("zap.yml".to_string());
            fragments.push("app-zap.yml".to_string());
        }
        if self.db && self.zap {
            fragments.push("app-db-zap.yml".to_string());
        }
        fragments
    }

    pub fn exit_from(self) -> &'static str {
        if self.zap {
            "zap"
        } else {
            "app"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_stages_run_single_container() {
        let topology = Topology::resolve(Stage::Build, true);
        assert!(!topology.needs_compose());
        assert_eq!(topology.fragment_files(), vec!["base.yml", "app-runner.yml"]);
    }

    #[test]
    fn smoke_test_composes_with_db_only_when_required() {
        assert!(!Topology::resolve(Stage::SmokeTest, false).needs_compose());
        let topology = Topology::resolve(Stage::SmokeTest, true);
        assert!(topology.needs_compose());
        assert_eq!(topology.fragment_files(), vec!["base.yml", "app-runner.yml", "db.yml", "app-db.yml"]);
        assert_eq!(topology.exit_from(), "app");
    }

    #[test]
    fn dast_always_composes_with_zap_and_optionally_db() {
        let without_db = Topology::resolve(Stage::Dast, false);
        assert_eq!(without_db.fragment_files(), vec!["base.yml", "app-jar.yml", "zap.yml", "app-zap.yml"]);
        assert_eq!(without_db.exit_from(), "zap");

        let with_db = Topology::resolve(Stage::Dast, true);
        assert_eq!(
            with_db.fragment_files(),
            vec!["base.yml", "app-jar.yml", "db.yml", "app-db.yml", "zap.yml", "app-zap.yml", "app-db-zap.yml"]
        );
    }
}
