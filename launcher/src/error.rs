use std::ffi::NulError;
use std::io;
use std::path::PathBuf;

use jni_sys::jint;
use thiserror::Error;

use runloop::ticker::TickerError;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("could not read {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration in {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not change working directory")]
    WorkingDir(#[source] io::Error),
    #[error("no JVM library found, searched: {}", display_paths(.searched))]
    JvmNotFound { searched: Vec<PathBuf> },
    #[error("could not load JVM library {path}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("JVM library does not export {0}")]
    MissingSymbol(&'static str, #[source] libloading::Error),
    #[error("JNI function table has no entry for {0}")]
    MissingJniFunction(&'static str),
    #[error("string contains a NUL byte: {0:?}")]
    InvalidString(String, #[source] NulError),
    #[error("JNI_CreateJavaVM failed with code {0}")]
    CreateVm(jint),
    #[error("could not attach JVM to thread (code {0})")]
    AttachThread(jint),
    #[error("could not find class {0}")]
    ClassNotFound(String),
    #[error("could not find {0}.main(String[])")]
    MainNotFound(String),
    #[error("Java exception while {0}")]
    JavaException(&'static str),
    #[error("could not spawn the JVM thread")]
    SpawnThread(#[source] io::Error),
    #[error("JVM thread panicked")]
    VmThreadPanicked,
    #[error(transparent)]
    Ticker(#[from] TickerError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
