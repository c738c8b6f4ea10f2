use std::sync::Arc;
use tmcat_server::{run_server, ServedRepo};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TMCAT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut root = None;
    let mut addr = "127.0.0.1:8080".to_owned();
    let mut auth_token = std::env::var("TMCAT_AUTH_TOKEN").ok();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addr" => addr = args.next().unwrap_or(addr),
            "--auth-token" => auth_token = args.next(),
            other => root = Some(other.to_owned()),
        }
    }
    let Some(root) = root else {
        eprintln!("usage: tmcat-server [--addr HOST:PORT] [--auth-token TOKEN] <repo-root>");
        std::process::exit(2);
    };

    let state = Arc::new(ServedRepo::new(root, auth_token));
    run_server(&state, &addr);
}
