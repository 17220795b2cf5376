//! Application context shared by every command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::cli::Cli;
use crate::cli::output::OutputMode;
use crate::config::Config;
use crate::error::Result;
use crate::service::ExperimentService;
use crate::storage::{Repository, SqliteRepository};

/// Default data directory, relative to the working directory.
pub const DEFAULT_ROOT: &str = ".splitlab";

pub struct AppContext {
    pub root: PathBuf,
    pub config: Config,
    pub robot_mode: bool,
    pub output: OutputMode,
    pub service: ExperimentService,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("root", &self.root)
            .field("robot_mode", &self.robot_mode)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
        let config = Config::load(cli.config.as_deref(), &root)?;
        Self::open(root, config, cli.robot)
    }

    /// Open (creating if needed) the database under `root`.
    pub fn open(root: PathBuf, config: Config, robot_mode: bool) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        let db_path = config.storage.db_path(&root);
        let repo = SqliteRepository::open_with_timeout(&db_path, config.storage.busy_timeout())?;
        debug!(
            db = %db_path.display(),
            schema_version = repo.schema_version(),
            "database ready"
        );

        let repo: Arc<dyn Repository> = Arc::new(repo);
        let service = ExperimentService::new(repo, &config);
        Ok(Self {
            root,
            config,
            robot_mode,
            output: OutputMode::from_robot_flag(robot_mode),
            service,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewTest, Variant};

    #[test]
    fn open_creates_root_and_database() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("nested/lab");

        let ctx = AppContext::open(root.clone(), Config::default(), true).unwrap();
        assert!(ctx.output.is_robot());
        assert!(root.join("splitlab.db").exists());

        ctx.service
            .create_test(NewTest::new("checkout", vec![Variant::new("a", "A", 1.0)]))
            .unwrap();
        drop(ctx);

        let reopened = AppContext::open(root, Config::default(), false).unwrap();
        assert!(reopened.service.require_test("checkout").is_ok());
    }
}
