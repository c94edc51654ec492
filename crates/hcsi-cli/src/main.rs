//! Operator CLI for `hcsi` — a thin REST client against `hcsi-server`'s
//! admin API. Carries no path-dependency on `hcsi-engine`/`hcsi-plugin`:
//! it only ever speaks JSON over HTTP, exactly like the server it talks to.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "hcsi", version, about = "Operator CLI for the hcsi admin API")]
struct Cli {
    /// Base URL of the hcsi-server admin API.
    #[arg(long, env = "HCSI_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the backend cache.
    Backend {
        #[command(subcommand)]
        action: BackendCommands,
    },
    /// Dry-run the pool selector without reserving capacity.
    Pool {
        #[command(subcommand)]
        action: PoolCommands,
    },
}

#[derive(Subcommand)]
enum BackendCommands {
    /// List every cached backend.
    List,
    /// Show one backend's live capabilities and pool capacities.
    Show {
        name: String,
    },
    /// Force a single-backend reconcile, bypassing the cache's generation check.
    Reconcile {
        name: String,
    },
    /// Evict a backend from the cache.
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
enum PoolCommands {
    /// Select a local (and, for paired requests, remote) pool without committing.
    Select {
        /// Requested volume size in bytes.
        #[arg(long)]
        size_bytes: i64,
        /// Storage-class parameter, repeatable: `--param key=value`.
        #[arg(long = "param", value_parser = parse_key_val)]
        param: Vec<(String, String)>,
        /// Requisite topology segment, repeatable: `--requisite key=value`.
        #[arg(long = "requisite", value_parser = parse_key_val)]
        requisite: Vec<(String, String)>,
        /// Preferred topology segment, repeatable: `--preferred key=value`.
        #[arg(long = "preferred", value_parser = parse_key_val)]
        preferred: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s.split_once('=').ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    Ok((k.to_owned(), v.to_owned()))
}

struct Client {
    http: reqwest::Client,
    addr: String,
}

impl Client {
    fn new(addr: String) -> Self {
        Self { http: reqwest::Client::new(), addr }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self.http.get(self.url(path)).send().await.context("request failed")?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self.http.post(self.url(path)).json(body).send().await.context("request failed")?;
        handle_response(resp).await
    }

    async fn post_no_body(&self, path: &str) -> Result<Value> {
        let resp = self.http.post(self.url(path)).send().await.context("request failed")?;
        handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let resp = self.http.delete(self.url(path)).send().await.context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(cli.addr);

    match run(&client, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: &Client, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Backend { action } => cmd_backend(client, action).await,
        Commands::Pool { action } => cmd_pool(client, action).await,
    }
}

async fn cmd_backend(client: &Client, action: BackendCommands) -> Result<()> {
    match action {
        BackendCommands::List => {
            let body = client.get("/v1/backends").await?;
            print_json(&body);
        }
        BackendCommands::Show { name } => {
            let body = client.get(&format!("/v1/backends/{name}")).await?;
            print_json(&body);
        }
        BackendCommands::Reconcile { name } => {
            client.post_no_body(&format!("/v1/backends/{name}/reconcile")).await?;
            println!("reconciled '{name}'");
        }
        BackendCommands::Delete { name } => {
            client.delete(&format!("/v1/backends/{name}")).await?;
            println!("deleted '{name}'");
        }
    }
    Ok(())
}

async fn cmd_pool(client: &Client, action: PoolCommands) -> Result<()> {
    match action {
        PoolCommands::Select { size_bytes, param, requisite, preferred } => {
            let body = serde_json::json!({
                "size_bytes": size_bytes,
                "parameters": to_map(param),
                "requisite": to_segments(requisite),
                "preferred": to_segments(preferred),
            });
            let resp = client.post("/v1/pools/select", &body).await?;
            print_json(&resp);
        }
    }
    Ok(())
}

fn to_map(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    pairs.into_iter().collect()
}

/// The selector's topology segments are each a single key/value map; CLI
/// flags collect flat pairs, so each one becomes its own one-entry segment.
fn to_segments(pairs: Vec<(String, String)>) -> Vec<HashMap<String, String>> {
    pairs.into_iter().map(|(k, v)| HashMap::from([(k, v)])).collect()
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}
