use serde::Serialize;

use framechan_transport::SocketResolver;

use crate::cmd::ResolveArgs;
use crate::exit::{CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
struct CandidateOutput {
    source: Option<&'static str>,
    path: Option<String>,
    is_socket: bool,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    schema_id: &'static str,
    candidates: Vec<CandidateOutput>,
    resolved: Option<String>,
    error: Option<String>,
}

pub fn run(args: ResolveArgs, format: OutputFormat) -> CliResult<i32> {
    let resolver = SocketResolver::from_process_env();
    let fallback = args.fallback_name.as_deref().unwrap_or(&args.runtime_name);
    let output = describe(&resolver, &args.runtime_name, fallback);

    print_resolve(&output, format);

    if output.resolved.is_some() {
        Ok(SUCCESS)
    } else {
        Ok(TRANSPORT_ERROR)
    }
}

fn describe(resolver: &SocketResolver, runtime_name: &str, fallback_name: &str) -> ResolveOutput {
    let candidates = resolver
        .candidates(runtime_name, fallback_name)
        .into_iter()
        .map(|candidate| {
            let is_socket = candidate.is_socket();
            let (path, error) = match candidate.path {
                Ok(path) => (Some(path.display().to_string()), None),
                Err(err) => (None, Some(err.to_string())),
            };
            CandidateOutput {
                source: candidate.source.map(|s| s.as_str()),
                path,
                is_socket,
                error,
            }
        })
        .collect();

    let (resolved, error) = match resolver.resolve(runtime_name, fallback_name) {
        Ok(path) => (Some(path.display().to_string()), None),
        Err(err) => (None, Some(err.to_string())),
    };

    ResolveOutput {
        schema_id: "framechan/cli/v1/resolve-report",
        candidates,
        resolved,
        error,
    }
}

fn print_resolve(output: &ResolveOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("framechan resolve\n");
            for c in &output.candidates {
                let detail = match (&c.path, &c.error) {
                    (Some(path), _) if c.is_socket => format!("{path} (socket)"),
                    (Some(path), _) => format!("{path} (missing)"),
                    (None, Some(err)) => err.clone(),
                    (None, None) => String::new(),
                };
                println!("  {:<12} {}", c.source.unwrap_or("-"), detail);
            }
            match (&output.resolved, &output.error) {
                (Some(path), _) => println!("\n  Resolved: {path}"),
                (None, Some(err)) => println!("\n  Unresolved: {err}"),
                (None, None) => {}
            }
        }
        OutputFormat::Raw => {
            if let Some(path) = &output.resolved {
                println!("{path}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixListener;
    use std::path::PathBuf;

    use framechan_transport::ResolverEnv;

    use super::*;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/fcres-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn reports_fallback_hit() {
        let runtime = unique_temp_dir("rt");
        let data = unique_temp_dir("data");
        let _listener = UnixListener::bind(data.join("svc.sock")).unwrap();

        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(runtime.clone()),
            data_home: Some(data.clone()),
            home: None,
        });
        let output = describe(&resolver, "svc.sock", "svc.sock");

        assert_eq!(output.candidates.len(), 2);
        assert!(!output.candidates[0].is_socket);
        assert_eq!(output.candidates[1].source, Some("data_home"));
        assert!(output.candidates[1].is_socket);
        assert_eq!(
            output.resolved.as_deref(),
            Some(data.join("svc.sock").display().to_string().as_str())
        );

        let _ = std::fs::remove_dir_all(&runtime);
        let _ = std::fs::remove_dir_all(&data);
    }

    #[test]
    fn reports_missing_search_root() {
        let resolver = SocketResolver::new(ResolverEnv {
            runtime_dir: Some(PathBuf::from("/nonexistent-framechan")),
            data_home: None,
            home: None,
        });
        let output = describe(&resolver, "svc.sock", "svc.sock");

        assert!(output.resolved.is_none());
        assert_eq!(output.candidates[1].source, None);
        assert!(output.candidates[1].error.is_some());
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"resolved\":null"));
    }
}
