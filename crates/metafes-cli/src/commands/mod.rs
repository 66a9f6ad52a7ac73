pub mod cv;
pub mod fes;
pub mod run;
pub mod sample;

use crate::error::{CliError, Result};
use metafes::core::io::traits::PlainTextFile;
use metafes::engine::cancel::CancellationToken;
use metafes::engine::error::EngineError;
use std::path::Path;
use tracing::{info, warn};

pub(crate) fn read_file<F>(path: &Path) -> Result<F::Content>
where
    F: PlainTextFile,
    F::Error: Send + Sync + 'static,
{
    info!("Reading {:?}", path);
    F::read_from_path(path).map_err(|e| CliError::parsing(path, e))
}

pub(crate) fn write_file<F>(content: &F::Content, path: &Path) -> Result<()>
where
    F: PlainTextFile,
    F::Error: Send + Sync + 'static,
{
    info!("Writing {:?}", path);
    F::write_to_path(content, path).map_err(|e| CliError::parsing(path, e))
}

/// Runs `task` on the blocking pool, cancelling its token on Ctrl-C.
pub(crate) async fn run_cancellable<T, F>(task: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> std::result::Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling the running computation.");
                cancel.cancel();
            }
        })
    };

    let outcome = tokio::task::spawn_blocking(move || task(cancel)).await;
    watcher.abort();

    let result = outcome
        .map_err(|e| CliError::Other(anyhow::anyhow!("Worker task failed: {}", e)))?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use crate::cli::{ConfigArgs, CvArgs, FesArgs, RunArgs, SampleArgs};
    use metafes::core::io::colvar::ColvarFile;
    use metafes::core::io::hills::HillsFile;
    use metafes::core::io::table::TableFile;
    use metafes::core::io::traits::PlainTextFile;
    use metafes::core::io::xyz::XyzFile;
    use std::fmt::Write as _;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const FRAMES: usize = 20;

    const CONFIG: &str = r#"
[metadynamics]
height = 1.0
pace = 5

[[variables]]
name = "d"
type = "distance"
atoms = [0, 1]
sigma = 0.1
"#;

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("run.toml"), CONFIG).unwrap();

            let mut xyz = String::new();
            for i in 0..FRAMES {
                let d = 0.5 + 0.05 * i as f64;
                writeln!(xyz, "2\ntime={}\nC 0.0 0.0 0.0\nO {} 0.0 0.0", i, d).unwrap();
            }
            fs::write(dir.path().join("traj.xyz"), xyz).unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn config_args(&self) -> ConfigArgs {
            ConfigArgs {
                config: self.path("run.toml"),
                set_values: Vec::new(),
            }
        }
    }

    fn exists(path: &Path) -> bool {
        path.metadata().map(|m| m.len() > 0).unwrap_or(false)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cv_command_writes_one_row_per_frame() {
        let ws = Workspace::new();
        super::cv::run(CvArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            output: ws.path("COLVAR"),
        })
        .await
        .unwrap();

        let colvar = ColvarFile::read_from_path(ws.path("COLVAR")).unwrap();
        assert_eq!(colvar.names, vec!["d"]);
        assert_eq!(colvar.samples.len(), FRAMES);
        assert!((colvar.samples[3].values[0] - 0.65).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_then_fes_reconstructs_a_shifted_surface() {
        let ws = Workspace::new();
        super::run::run(RunArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            hills: ws.path("HILLS"),
            colvar: Some(ws.path("COLVAR")),
            restart: None,
            height: None,
            pace: None,
        })
        .await
        .unwrap();

        let hills = HillsFile::read_from_path(ws.path("HILLS")).unwrap();
        assert_eq!(hills.records.len(), FRAMES / 5);
        assert!(exists(&ws.path("COLVAR")));

        super::fes::run(FesArgs {
            config: ws.config_args(),
            hills: ws.path("HILLS"),
            output: ws.path("fes.csv"),
            project: None,
            kt: None,
        })
        .await
        .unwrap();

        let table = TableFile::read_from_path(ws.path("fes.csv")).unwrap();
        let (headers, rows) = (table.headers, table.rows);
        assert_eq!(headers, vec!["d", "free_energy"]);
        assert!(!rows.is_empty());
        let minimum = rows
            .iter()
            .map(|row| row[1])
            .fold(f64::INFINITY, f64::min);
        assert!(minimum.abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_continues_from_earlier_hills() {
        let ws = Workspace::new();
        let first = RunArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            hills: ws.path("HILLS.0"),
            colvar: None,
            restart: None,
            height: None,
            pace: Some(10),
        };
        super::run::run(first).await.unwrap();

        super::run::run(RunArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            hills: ws.path("HILLS.1"),
            colvar: None,
            restart: Some(ws.path("HILLS.0")),
            height: None,
            pace: Some(10),
        })
        .await
        .unwrap();

        let first = HillsFile::read_from_path(ws.path("HILLS.0")).unwrap();
        let second = HillsFile::read_from_path(ws.path("HILLS.1")).unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(second.records.len(), 4);
        assert_eq!(&second.records[..2], &first.records[..]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn projection_of_a_plain_run_requires_kt() {
        let ws = Workspace::new();
        super::run::run(RunArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            hills: ws.path("HILLS"),
            colvar: None,
            restart: None,
            height: None,
            pace: None,
        })
        .await
        .unwrap();

        let without_kt = super::fes::run(FesArgs {
            config: ws.config_args(),
            hills: ws.path("HILLS"),
            output: ws.path("proj.csv"),
            project: Some("d".to_string()),
            kt: None,
        })
        .await;
        assert!(without_kt.is_err());

        super::fes::run(FesArgs {
            config: ws.config_args(),
            hills: ws.path("HILLS"),
            output: ws.path("proj.csv"),
            project: Some("0".to_string()),
            kt: Some(2.5),
        })
        .await
        .unwrap();
        let headers = TableFile::read_from_path(ws.path("proj.csv")).unwrap().headers;
        assert_eq!(headers, vec!["d", "free_energy"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sample_writes_only_frames_inside_the_bounds() {
        let ws = Workspace::new();
        super::cv::run(CvArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            output: ws.path("COLVAR"),
        })
        .await
        .unwrap();

        super::sample::run(SampleArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            colvar: ws.path("COLVAR"),
            bounds: vec!["d=[0.45,0.72]".to_string()],
            count: 3,
            seed: Some(4),
            output: ws.path("sampled.xyz"),
        })
        .await
        .unwrap();

        let sampled = XyzFile::read_from_path(ws.path("sampled.xyz")).unwrap();
        assert_eq!(sampled.frames.len(), 3);
        assert_eq!(sampled.symbols, vec!["C", "O"]);
        for frame in &sampled.frames {
            let d = frame.positions[1].x;
            assert!((0.45..=0.72).contains(&d));
        }

        super::sample::run(SampleArgs {
            config: ws.config_args(),
            trajectory: ws.path("traj.xyz"),
            colvar: ws.path("COLVAR"),
            bounds: vec!["d=5.0..".to_string()],
            count: 3,
            seed: None,
            output: ws.path("none.xyz"),
        })
        .await
        .unwrap();
        assert!(!ws.path("none.xyz").exists());
    }
}
