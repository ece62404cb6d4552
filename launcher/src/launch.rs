use std::env;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;

use log::{debug, info};
use runloop::ticker;

use crate::cli::Cli;
use crate::config::LaunchConfig;
use crate::jre;
use crate::jvm::Jvm;
use crate::LaunchError;

/// Everything resolved from disk before the JVM is touched.
#[derive(Debug)]
pub struct Prepared {
    pub config: LaunchConfig,
    pub libjvm: PathBuf,
}

const CONFIG_FILE: &str = "config.json";

/// Reads the configuration and finds the JVM library.
///
/// Paths given on the command line are taken relative to `invoked_from`, the
/// directory the launcher was started in. The default configuration and
/// `jrePath` from it are taken relative to the application directory `root`.
pub fn prepare(cli: &Cli, invoked_from: &Path, root: &Path) -> Result<Prepared, LaunchError> {
    let config_path = match &cli.config {
        Some(path) => invoked_from.join(path),
        None => root.join(CONFIG_FILE),
    };
    let config = LaunchConfig::load(&config_path)?;
    let jre = match &cli.jre {
        Some(path) => invoked_from.join(path),
        None => root.join(&config.jre_path),
    };
    let libjvm = jre::locate_libjvm(&jre)?;
    info!("JRE path: {}", libjvm.display());
    Ok(Prepared { config, libjvm })
}

/// Creates the JVM and runs the application's `main` on the calling thread.
pub fn launch(cli: &Cli, program: &Path) -> Result<(), LaunchError> {
    let invoked_from = env::current_dir().map_err(LaunchError::WorkingDir)?;
    jre::select_root_path(program)?;
    let root = env::current_dir().map_err(LaunchError::WorkingDir)?;
    info!("working directory: {}", root.display());

    let Prepared { config, libjvm } = prepare(cli, &invoked_from, &root)?;

    let jvm = Jvm::create(&libjvm, &config.vm_args)?;
    jvm.invoke_main(&config.jar, &config.binary_class_name(), &cli.args)
}

/// Runs the launch on a worker thread while the calling thread stays in the
/// platform run loop, as macOS requires for UI toolkits.
pub fn run(cli: Cli, program: PathBuf) -> Result<(), LaunchError> {
    run_on_worker(ticker::DEFAULT_PERIOD, move || launch(&cli, &program))
}

/// Runs `work` on a worker thread and ticks the current thread's loop every
/// `period` until the worker is done.
pub fn run_on_worker<F>(period: Duration, work: F) -> Result<(), LaunchError>
    where F: FnOnce() -> Result<(), LaunchError> + Send + 'static {
    let (done_tx, done_rx) = mpsc::channel();
    let worker = thread::Builder::new()
        .name("jvm".to_owned())
        .spawn(move || {
            let result = work();
            // the receiver is gone only if the ticker failed to start
            let _ = done_tx.send(());
            result
        })
        .map_err(LaunchError::SpawnThread)?;

    ticker::run_with_period(period, move || match done_rx.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => {
            debug!("JVM thread finished");
            ticker::stop();
        },
        Err(TryRecvError::Empty) => {},
    })?;

    worker.join().map_err(|_| LaunchError::VmThreadPanicked)?
}
