//! proc-creds: print the credential of a process.
//!
//! Usage: `proc-creds [-v|--verbose] [-q|--quiet] [-c|--config FILE] [PID]`

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use busaccess_peer::config::{self, AccessConfig};
use busaccess_peer::{read_process, ProcFs, ProcessCredential, SelfContext};

const RET_OK: u8 = 0;
const RET_NOT_FOUND: u8 = 1;
const RET_USAGE: u8 = 2;

const USAGE: &str = "usage: proc-creds [-v|--verbose] [-q|--quiet] [-c|--config FILE] [PID]";

#[derive(Debug, Default)]
struct Args {
    verbose: bool,
    quiet: bool,
    config: Option<String>,
    pid: Option<u32>,
}

impl Args {
    fn parse(mut it: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut args = Args::default();
        while let Some(a) = it.next() {
            match a.as_str() {
                "-v" | "--verbose" => args.verbose = true,
                "-q" | "--quiet" => args.quiet = true,
                "-c" | "--config" => {
                    args.config = Some(it.next().ok_or_else(|| format!("{a} needs a file"))?);
                }
                "-h" | "--help" => return Err(String::new()),
                s if s.starts_with('-') => return Err(format!("unknown option {s}")),
                s if args.pid.is_none() => {
                    let pid = s.parse().map_err(|_| format!("bad pid {s:?}"))?;
                    args.pid = Some(pid);
                }
                s => return Err(format!("unexpected argument {s:?}")),
            }
        }
        Ok(args)
    }
}

fn print(p: &ProcessCredential) {
    println!("Pid: {}", p.pid);
    println!("Uid: {}", p.cred.euid);
    println!("Gid: {}", p.cred.egid);
    if let Some(groups) = &p.cred.groups {
        let list: Vec<String> = groups.iter().map(u32::to_string).collect();
        println!("Groups: {}", list.join(" "));
    }
    if let Some(caps) = p.cred.caps {
        println!("Caps: 0x{caps:016x}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(a) => a,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("proc-creds: {msg}");
            }
            eprintln!("{USAGE}");
            return ExitCode::from(RET_USAGE);
        }
    };

    let filter = if args.quiet {
        EnvFilter::new("off")
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cfg = match &args.config {
        Some(path) => match config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, code = e.code().as_str(), "config load failed");
                return ExitCode::from(RET_USAGE);
            }
        },
        None => AccessConfig::default(),
    }
    .with_env_overrides();

    let source = Arc::new(ProcFs::new(&cfg.peer.proc_root));
    let found = match args.pid {
        Some(pid) => read_process(&*source, pid).await,
        None => SelfContext::new(source, &cfg.self_cred).fresh().await,
    };
    match found {
        Ok(p) => {
            print(&p);
            ExitCode::from(RET_OK)
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.code().as_str(), "no credential");
            ExitCode::from(RET_NOT_FOUND)
        }
    }
}
