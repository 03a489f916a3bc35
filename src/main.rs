use std::env;

use beacon_client::{Analytics, Mode};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "Usage: beacon send --config <path> --event <name> [--params <json-object>] [--debug]";

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let cmd = args.next().unwrap_or_default();
    if cmd != "send" {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let mut config_path = String::from("./config/example-config.yaml");
    let mut event_name = None;
    let mut params_text = None;
    let mut debug = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(v) = args.next() {
                    config_path = v;
                }
            }
            "--event" => event_name = args.next(),
            "--params" => params_text = args.next(),
            "--debug" => debug = true,
            _ => {
                eprintln!("unknown argument: {arg}\n{USAGE}");
                std::process::exit(2);
            }
        }
    }

    let Some(event_name) = event_name else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let params = match params_text.as_deref().map(parse_params).transpose() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid --params: {e}");
            std::process::exit(2);
        }
    };

    let cfg = match beacon_config::load_and_validate(&config_path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let analytics = match Analytics::new(cfg) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to start analytics session: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(client_id = analytics.client_id(), "analytics session ready");

    let mode = Mode::from_debug_flag(debug);
    match analytics.event(event_name, params, mode).await {
        Ok(messages) if messages.is_empty() => {
            if mode == Mode::Debug {
                println!("event is valid");
            }
        }
        Ok(messages) => {
            for message in &messages {
                println!("{message}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("send failed: {e}");
            std::process::exit(1);
        }
    }
}

fn parse_params(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        _ => Err("expected a JSON object".to_string()),
    }
}
