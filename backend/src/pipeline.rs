use crate::collaborators::{BuildError, BuildPipeline, BuildRequest, OutputFs};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Runs an external bundler command and loads what it wrote.
///
/// The command sees `ALVA_BUILD_OUTPUT` (directory to write into),
/// `ALVA_BUILD_INFRASTRUCTURE` (`true`/`false`) and `ALVA_BUILD_ENTRIES`
/// (JSON object of bundle name to entry path).
#[derive(Debug, Clone, Default)]
pub struct CommandBuildPipeline {
    command: Option<String>,
}

impl CommandBuildPipeline {
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Loads every file below `root` keyed by its slash path relative to it.
pub fn load_output(root: &Path) -> Result<OutputFs, BuildError> {
    let mut out = OutputFs::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let contents = std::fs::read(entry.path()).map_err(|source| BuildError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;
        out.insert(relative, contents);
    }
    Ok(out)
}

async fn run(command: String, request: BuildRequest) -> Result<OutputFs, BuildError> {
    let entries = serde_json::to_string(&request.entries)?;
    let output_dir: PathBuf = std::env::temp_dir().join(format!("alva-build-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|source| BuildError::Io {
            path: output_dir.clone(),
            source,
        })?;

    info!(%command, "building script bundle");
    let output = shell(&command)
        .env("ALVA_BUILD_OUTPUT", &output_dir)
        .env("ALVA_BUILD_INFRASTRUCTURE", request.infrastructure.to_string())
        .env("ALVA_BUILD_ENTRIES", entries)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(BuildError::Spawn);

    let result = match output {
        Ok(output) if output.status.success() => {
            let dir = output_dir.clone();
            tokio::task::spawn_blocking(move || load_output(&dir)).await?
        }
        Ok(output) => Err(BuildError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Err(e) => Err(e),
    };

    if let Err(e) = tokio::fs::remove_dir_all(&output_dir).await {
        debug!(path = %output_dir.display(), "failed to clean build output: {e}");
    }
    result
}

impl BuildPipeline for CommandBuildPipeline {
    fn build(&self, request: BuildRequest) -> BoxFuture<'static, Result<OutputFs, BuildError>> {
        let command = self.command.clone();
        Box::pin(async move {
            match command {
                Some(command) => run(command, request).await,
                None => Err(BuildError::NotConfigured),
            }
        })
    }
}
