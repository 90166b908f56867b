use std::io::Read;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::time::Duration;

use bytes::BytesMut;
use framechan_channel::{Channel, ChannelConfig, LogLevel};
use framechan_frame::{decode_frame, MAX_PAYLOAD};
use framechan_transport::{ResolverEnv, SocketResolver, UnixSocket};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_id: &'static str,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let resolver = SocketResolver::from_process_env();
    let mut checks = vec![socket_create_check()];
    checks.extend(search_path_checks(&resolver));
    checks.push(loopback_frame_check());
    checks.push(compiled_features_check());

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput {
        schema_id: "framechan/cli/v1/doctor-report",
        checks,
        overall,
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("framechan doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<16} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
    }
}

fn socket_create_check() -> CheckResult {
    match UnixSocket::new() {
        Ok(socket) => {
            let detail = format!("{} socket allocated", socket.transport_name());
            socket.destroy();
            CheckResult::new("socket_create", CheckStatus::Pass, detail)
        }
        Err(err) => CheckResult::new("socket_create", CheckStatus::Fail, err.to_string()),
    }
}

/// Checks over the directories `resolver` will search.
fn search_path_checks(resolver: &SocketResolver) -> [CheckResult; 2] {
    let env = resolver.env();
    [runtime_dir_check(env), search_root_check(env)]
}

fn runtime_dir_check(env: &ResolverEnv) -> CheckResult {
    match &env.runtime_dir {
        Some(dir) if dir.is_dir() => CheckResult::new(
            "runtime_dir",
            CheckStatus::Pass,
            format!("{} exists", dir.display()),
        ),
        Some(dir) => CheckResult::new(
            "runtime_dir",
            CheckStatus::Fail,
            format!("XDG_RUNTIME_DIR={} is not a directory", dir.display()),
        ),
        None => CheckResult::new(
            "runtime_dir",
            CheckStatus::Warn,
            "XDG_RUNTIME_DIR not set, using /tmp",
        ),
    }
}

fn search_root_check(env: &ResolverEnv) -> CheckResult {
    if let Some(dir) = &env.data_home {
        return CheckResult::new(
            "fallback_root",
            CheckStatus::Pass,
            format!("XDG_DATA_HOME={}", dir.display()),
        );
    }
    if let Some(home) = &env.home {
        return CheckResult::new(
            "fallback_root",
            CheckStatus::Pass,
            format!("HOME={}", home.display()),
        );
    }
    CheckResult::new(
        "fallback_root",
        CheckStatus::Warn,
        "XDG_DATA_HOME and HOME unset; only the runtime dir is searched",
    )
}

fn loopback_frame_check() -> CheckResult {
    let dir = PathBuf::from(format!(
        "/tmp/framechan-doctor-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ));
    let result = loopback_frame(&dir);
    let _ = std::fs::remove_dir_all(&dir);

    match result {
        Ok(()) => CheckResult::new(
            "loopback_frame",
            CheckStatus::Pass,
            format!("{MAX_PAYLOAD}-byte frame delivered intact"),
        ),
        Err(err) => CheckResult::new("loopback_frame", CheckStatus::Fail, err),
    }
}

fn loopback_frame(dir: &std::path::Path) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|err| format!("{}: {err}", dir.display()))?;
    let sock = dir.join("doctor.sock");
    let listener = UnixListener::bind(&sock).map_err(|err| format!("bind failed: {err}"))?;

    let channel = Channel::new(ChannelConfig::default().with_log_level(LogLevel::Off))
        .map_err(|err| err.to_string())?;
    channel.connect_path(&sock).map_err(|err| err.to_string())?;
    let (mut server, _) = listener
        .accept()
        .map_err(|err| format!("accept failed: {err}"))?;
    server
        .set_read_timeout(Some(Duration::from_secs(2)))
        .map_err(|err| err.to_string())?;

    let payload: Vec<u8> = (0..MAX_PAYLOAD).map(|i| i as u8).collect();
    channel.send(&payload).map_err(|err| err.to_string())?;
    channel.destroy();

    let mut wire = Vec::new();
    server
        .read_to_end(&mut wire)
        .map_err(|err| format!("read failed: {err}"))?;
    let mut buf = BytesMut::from(wire.as_slice());
    match decode_frame(&mut buf, MAX_PAYLOAD) {
        Ok(Some(frame)) if frame.as_ref() == payload.as_slice() => Ok(()),
        Ok(Some(_)) => Err("payload mismatch".to_string()),
        Ok(None) => Err(format!("incomplete frame ({} bytes)", wire.len())),
        Err(err) => Err(err.to_string()),
    }
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "cli") {
        features.push("cli");
    }

    CheckResult::new("compiled_features", CheckStatus::Info, features.join(", "))
}
