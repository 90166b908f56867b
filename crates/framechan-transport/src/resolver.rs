use std::ffi::OsString;
use std::fmt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::socket::check_path_len;

/// Runtime directory used when `XDG_RUNTIME_DIR` is unset.
pub const DEFAULT_RUNTIME_DIR: &str = "/tmp";

/// Data-home location relative to `HOME` when `XDG_DATA_HOME` is unset.
pub const HOME_DATA_SUFFIX: &str = ".local/share";

/// Environment inputs for socket path resolution.
///
/// Empty values are stored as `None`, matching the XDG rule that an empty
/// variable is treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverEnv {
    /// `XDG_RUNTIME_DIR`.
    pub runtime_dir: Option<PathBuf>,
    /// `XDG_DATA_HOME`.
    pub data_home: Option<PathBuf>,
    /// `HOME`.
    pub home: Option<PathBuf>,
}

impl ResolverEnv {
    /// Snapshot the relevant variables from the process environment.
    pub fn from_process() -> Self {
        Self {
            runtime_dir: non_empty(std::env::var_os("XDG_RUNTIME_DIR")),
            data_home: non_empty(std::env::var_os("XDG_DATA_HOME")),
            home: non_empty(std::env::var_os("HOME")),
        }
    }
}

fn non_empty(value: Option<OsString>) -> Option<PathBuf> {
    value.filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Where a candidate socket path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// `$XDG_RUNTIME_DIR/<runtime path>` or `/tmp/<runtime path>`.
    RuntimeDir,
    /// `$XDG_DATA_HOME/<fallback name>`.
    DataHome,
    /// `$HOME/.local/share/<fallback name>`.
    Home,
}

impl CandidateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RuntimeDir => "runtime_dir",
            Self::DataHome => "data_home",
            Self::Home => "home",
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probed location, for diagnostics.
#[derive(Debug)]
pub struct Candidate {
    pub source: Option<CandidateSource>,
    pub path: Result<PathBuf>,
}

impl Candidate {
    /// Whether the candidate exists and is a socket special file.
    pub fn is_socket(&self) -> bool {
        self.path.as_deref().map(is_socket).unwrap_or(false)
    }
}

/// Locates the service socket.
///
/// The runtime-directory path is preferred; a socket published under the
/// user data directory is accepted as a fallback for older installations.
#[derive(Debug, Clone, Default)]
pub struct SocketResolver {
    env: ResolverEnv,
}

impl SocketResolver {
    pub fn new(env: ResolverEnv) -> Self {
        Self { env }
    }

    /// Resolver over the current process environment.
    pub fn from_process_env() -> Self {
        Self::new(ResolverEnv::from_process())
    }

    pub fn env(&self) -> &ResolverEnv {
        &self.env
    }

    /// `<runtime dir>/<runtime_path>`.
    pub fn runtime_candidate(&self, runtime_path: &str) -> Result<PathBuf> {
        let dir = self
            .env
            .runtime_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_RUNTIME_DIR));
        let path = dir.join(runtime_path);
        check_path_len(&path)?;
        Ok(path)
    }

    /// `<data home>/<fallback_name>`, with the data home derived from `HOME` if needed.
    pub fn fallback_candidate(&self, fallback_name: &str) -> Result<(CandidateSource, PathBuf)> {
        let (source, path) = if let Some(data_home) = &self.env.data_home {
            (CandidateSource::DataHome, data_home.join(fallback_name))
        } else if let Some(home) = &self.env.home {
            (
                CandidateSource::Home,
                home.join(HOME_DATA_SUFFIX).join(fallback_name),
            )
        } else {
            return Err(TransportError::NoSearchRoot);
        };
        check_path_len(&path)?;
        Ok((source, path))
    }

    /// Both locations, whether or not they exist.
    pub fn candidates(&self, runtime_path: &str, fallback_name: &str) -> Vec<Candidate> {
        let runtime = Candidate {
            source: Some(CandidateSource::RuntimeDir),
            path: self.runtime_candidate(runtime_path),
        };
        let fallback = match self.fallback_candidate(fallback_name) {
            Ok((source, path)) => Candidate {
                source: Some(source),
                path: Ok(path),
            },
            Err(err) => Candidate {
                source: None,
                path: Err(err),
            },
        };
        vec![runtime, fallback]
    }

    /// Pick the socket to connect to.
    ///
    /// A runtime path that cannot be represented fails resolution outright;
    /// the fallback is only consulted when the runtime path is not a socket.
    pub fn resolve(&self, runtime_path: &str, fallback_name: &str) -> Result<PathBuf> {
        let primary = self.runtime_candidate(runtime_path)?;
        if is_socket(&primary) {
            debug!(path = ?primary, "resolved socket in runtime dir");
            return Ok(primary);
        }

        let (source, fallback) = self.fallback_candidate(fallback_name)?;
        if is_socket(&fallback) {
            debug!(path = ?fallback, %source, "resolved fallback socket");
            return Ok(fallback);
        }

        Err(TransportError::SocketNotFound {
            candidates: vec![primary, fallback],
        })
    }
}

/// Whether `path` exists (following symlinks) and is a socket special file.
pub fn is_socket(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixListener;

    use super::*;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/fcr-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn bind_at(path: &Path) -> UnixListener {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        UnixListener::bind(path).unwrap()
    }

    #[test]
    fn resolves_runtime_dir_first() {
        let runtime = unique_temp_dir("rt");
        let data = unique_temp_dir("data");
        let _primary = bind_at(&runtime.join("svc.sock"));
        let _fallback = bind_at(&data.join("svc/ipc.sock"));

        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(runtime.clone()),
            data_home: Some(data.clone()),
            home: None,
        });
        let path = resolver.resolve("svc.sock", "svc/ipc.sock").unwrap();
        assert_eq!(path, runtime.join("svc.sock"));

        let _ = std::fs::remove_dir_all(&runtime);
        let _ = std::fs::remove_dir_all(&data);
    }

    #[test]
    fn runtime_dir_trailing_slash_is_not_doubled() {
        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(PathBuf::from("/run/user/1000/")),
            ..ResolverEnv::default()
        });
        let path = resolver.runtime_candidate("svc.sock").unwrap();
        assert_eq!(path.as_os_str(), "/run/user/1000/svc.sock");
    }

    #[test]
    fn runtime_dir_defaults_to_tmp() {
        let resolver = SocketResolver::new(ResolverEnv::default());
        let path = resolver.runtime_candidate("svc.sock").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/svc.sock"));
    }

    #[test]
    fn falls_back_to_data_home() {
        let runtime = unique_temp_dir("rt-empty");
        let data = unique_temp_dir("data-home");
        let _listener = bind_at(&data.join("svc/ipc.sock"));

        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(runtime.clone()),
            data_home: Some(data.clone()),
            home: Some(PathBuf::from("/nonexistent-home")),
        });
        let path = resolver.resolve("svc.sock", "svc/ipc.sock").unwrap();
        assert_eq!(path, data.join("svc/ipc.sock"));

        let _ = std::fs::remove_dir_all(&runtime);
        let _ = std::fs::remove_dir_all(&data);
    }

    #[test]
    fn falls_back_to_home_local_share() {
        let runtime = unique_temp_dir("rt-home");
        let home = unique_temp_dir("home");
        let expected = home.join(".local/share/svc.sock");
        let _listener = bind_at(&expected);

        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(runtime.clone()),
            data_home: None,
            home: Some(home.clone()),
        });
        assert_eq!(resolver.resolve("svc.sock", "svc.sock").unwrap(), expected);

        let (source, _) = resolver.fallback_candidate("svc.sock").unwrap();
        assert_eq!(source, CandidateSource::Home);

        let _ = std::fs::remove_dir_all(&runtime);
        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn regular_files_are_not_sockets() {
        let runtime = unique_temp_dir("rt-file");
        let data = unique_temp_dir("data-file");
        std::fs::write(runtime.join("svc.sock"), b"not a socket").unwrap();
        std::fs::write(data.join("svc.sock"), b"not a socket").unwrap();

        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(runtime.clone()),
            data_home: Some(data.clone()),
            home: None,
        });
        let err = resolver.resolve("svc.sock", "svc.sock").unwrap_err();
        match err {
            TransportError::SocketNotFound { candidates } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {other}"),
        }

        let _ = std::fs::remove_dir_all(&runtime);
        let _ = std::fs::remove_dir_all(&data);
    }

    #[test]
    fn missing_search_roots_fail_resolution() {
        let runtime = unique_temp_dir("rt-noroot");
        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(runtime.clone()),
            data_home: None,
            home: None,
        });
        let err = resolver.resolve("svc.sock", "svc.sock").unwrap_err();
        assert!(matches!(err, TransportError::NoSearchRoot));
        assert!(err.is_resolution());

        let _ = std::fs::remove_dir_all(&runtime);
    }

    #[test]
    fn overlong_runtime_path_fails_resolution() {
        let resolver = SocketResolver::new(ResolverEnv::default());
        let err = resolver.resolve(&"a".repeat(200), "svc.sock").unwrap_err();
        assert!(matches!(err, TransportError::PathTooLong { .. }));
        assert!(err.is_resolution());
    }

    #[test]
    fn overlong_fallback_path_fails_resolution() {
        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(PathBuf::from("/nonexistent-runtime")),
            data_home: Some(PathBuf::from("/data")),
            home: None,
        });
        let err = resolver.resolve("svc.sock", &"b".repeat(200)).unwrap_err();
        assert!(matches!(err, TransportError::PathTooLong { .. }));
    }

    #[test]
    fn empty_variables_are_unset() {
        assert_eq!(non_empty(Some(OsString::new())), None);
        assert_eq!(
            non_empty(Some(OsString::from("/home/u"))),
            Some(PathBuf::from("/home/u"))
        );
    }

    #[test]
    fn candidates_report_both_locations() {
        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(PathBuf::from("/nonexistent-runtime")),
            data_home: None,
            home: None,
        });
        let candidates = resolver.candidates("svc.sock", "svc.sock");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source, Some(CandidateSource::RuntimeDir));
        assert!(!candidates[0].is_socket());
        assert!(matches!(
            candidates[1].path,
            Err(TransportError::NoSearchRoot)
        ));
    }
}
