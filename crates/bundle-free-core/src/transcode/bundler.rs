//! The external bundler collaborator.

use crate::error::TranscodeError;
use futures::future::BoxFuture;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Placeholder for the entry file in a bundler command line.
pub const ENTRY_PLACEHOLDER: &str = "{entry}";
/// Placeholder for the output file in a bundler command line.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Turns one entry module into one self-contained ES module file.
///
/// Implementations must resolve the entry's own imports from the
/// surrounding `node_modules` tree and convert CommonJS to ES syntax.
pub trait Bundler: Send + Sync + Debug {
    fn bundle<'a>(
        &'a self,
        entry: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), TranscodeError>>;
}

/// Runs an external command such as esbuild or rollup.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    argv: Vec<String>,
    cwd: PathBuf,
}

impl CommandBundler {
    /// Default command line.
    pub const DEFAULT_COMMAND: [&'static str; 5] = [
        "esbuild",
        "{entry}",
        "--bundle",
        "--format=esm",
        "--outfile={output}",
    ];

    /// Create a bundler running `argv` in `cwd`.
    ///
    /// `{entry}` and `{output}` are substituted in every argument.
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            cwd: cwd.into(),
        }
    }

    /// The command line for one invocation.
    #[must_use]
    pub fn command_line(&self, entry: &Path, output: &Path) -> Vec<String> {
        let entry = entry.display().to_string();
        let output = output.display().to_string();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace(ENTRY_PLACEHOLDER, &entry)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }

    async fn run(&self, entry: &Path, output: &Path) -> Result<(), TranscodeError> {
        let argv = self.command_line(entry, output);
        let Some((program, args)) = argv.split_first() else {
            return Err(TranscodeError::Bundler {
                message: "empty bundler command".to_string(),
            });
        };

        tracing::info!(program = %program, entry = %entry.display(), "running bundler");

        let result = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::BundlerSpawn {
                program: program.clone(),
                source,
            })?;

        if result.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        Err(TranscodeError::Bundler {
            message: format!("{program} exited with {}: {}", result.status, stderr.trim()),
        })
    }
}

impl Default for CommandBundler {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_COMMAND.iter().map(ToString::to_string).collect(),
            ".",
        )
    }
}

impl Bundler for CommandBundler {
    fn bundle<'a>(
        &'a self,
        entry: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), TranscodeError>> {
        Box::pin(self.run(entry, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_substitution() {
        let bundler = CommandBundler::default();
        let argv = bundler.command_line(Path::new("/tmp/in.js"), Path::new("/tmp/out.js"));
        assert_eq!(
            argv,
            vec![
                "esbuild",
                "/tmp/in.js",
                "--bundle",
                "--format=esm",
                "--outfile=/tmp/out.js"
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_command_fails() {
        let bundler = CommandBundler::new(Vec::new(), ".");
        let err = bundler
            .bundle(Path::new("a.js"), Path::new("b.js"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Bundler { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let bundler = CommandBundler::new(
            vec!["bundle-free-no-such-bundler-binary".to_string()],
            ".",
        );
        let err = bundler
            .bundle(Path::new("a.js"), Path::new("b.js"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::BundlerSpawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in.js"), "export const a = 1;").unwrap();
        let bundler = CommandBundler::new(
            vec!["cp".to_string(), "{entry}".to_string(), "{output}".to_string()],
            dir.path(),
        );
        bundler
            .bundle(Path::new("in.js"), Path::new("out.js"))
            .await
            .unwrap();
        let out = std::fs::read_to_string(dir.path().join("out.js")).unwrap();
        assert_eq!(out, "export const a = 1;");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_bundler_error() {
        let bundler = CommandBundler::new(vec!["false".to_string()], ".");
        let err = bundler
            .bundle(Path::new("a.js"), Path::new("b.js"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("false exited"));
    }
}
