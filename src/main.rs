use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use dashsync::cache::{KeyParam, QueryKey};
use dashsync::config::Config;
use dashsync::entity::{resource_info, ResourceInfo, RESOURCES};
use dashsync::remote::{FileUpload, HttpResourceClient, Payload};
use dashsync::sync::{MutationKind, QueryResult, SyncController};

#[derive(Parser, Debug)]
#[command(name = "dashsync")]
#[command(about = "Read and edit e-commerce admin resources through a synchronized cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dashsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(long, global = true)]
  base_url: Option<String>,

  /// Print the server's data instead of projected rows
  #[arg(long, global = true)]
  raw: bool,

  /// Debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List a resource
  List {
    resource: String,
    /// Query parameter, as key=value (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, KeyParam)>,
  },
  /// Show one entity
  Get { resource: String, id: String },
  /// Create an entity
  Create {
    resource: String,
    #[command(flatten)]
    body: BodyArgs,
  },
  /// Update an entity
  Update {
    resource: String,
    id: String,
    #[command(flatten)]
    body: BodyArgs,
  },
  /// Delete an entity
  Delete { resource: String, id: String },
  /// Show the known resources
  Resources,
}

#[derive(ClapArgs, Debug)]
struct BodyArgs {
  /// Field, as name=value; values that parse as JSON are sent as such (repeatable)
  #[arg(short, long = "field", value_parser = parse_field)]
  fields: Vec<(String, Value)>,

  /// File upload, as field=path (repeatable)
  #[arg(long = "file")]
  files: Vec<String>,

  /// JSON object file whose keys are merged under the --field values
  #[arg(long)]
  json: Option<PathBuf>,
}

fn split_pair(raw: &str) -> Result<(&str, &str), String> {
  raw
    .split_once('=')
    .filter(|(name, _)| !name.is_empty())
    .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

fn parse_param(raw: &str) -> Result<(String, KeyParam), String> {
  let (name, value) = split_pair(raw)?;
  Ok((name.to_string(), KeyParam::parse(value)))
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
  let (name, value) = split_pair(raw)?;
  let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
  Ok((name.to_string(), value))
}

fn content_type_for(path: &Path) -> Option<String> {
  let ext = path.extension()?.to_str()?.to_ascii_lowercase();
  let mime = match ext.as_str() {
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "svg" => "image/svg+xml",
    _ => return None,
  };
  Some(mime.to_string())
}

impl BodyArgs {
  fn into_payload(self) -> Result<Payload> {
    let mut payload = match &self.json {
      Some(path) => {
        let contents = std::fs::read_to_string(path)
          .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
        let value: Value = serde_json::from_str(&contents)
          .map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))?;
        Payload::from_json(value)?
      }
      None => Payload::new(),
    };

    for (name, value) in self.fields {
      payload = payload.field(name, value);
    }

    for raw in &self.files {
      let (field, path) = split_pair(raw).map_err(|e| eyre!(e))?;
      let path = Path::new(path);
      let bytes =
        std::fs::read(path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
      let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
      payload = payload.file(FileUpload {
        field: field.to_string(),
        file_name,
        content_type: content_type_for(path),
        bytes,
      });
    }
    Ok(payload)
  }
}

fn lookup(resource: &str) -> Result<&'static ResourceInfo> {
  resource_info(resource).ok_or_else(|| {
    let known: Vec<&str> = RESOURCES.iter().map(|r| r.name).collect();
    eyre!("Unknown resource '{}'. Known: {}", resource, known.join(", "))
  })
}

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_result(result: QueryResult<Value>, info: &ResourceInfo, raw: bool) -> Result<()> {
  if let Some(error) = result.error {
    return Err(eyre!("Fetching {} failed: {}", result.key, error));
  }
  let data = result.data.unwrap_or(Value::Null);
  if raw {
    print_json(&data)
  } else {
    print_json(&(info.project_json)(&data))
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = dashsync::logging::init(args.verbose)?;

  if let Command::Resources = args.command {
    for info in RESOURCES {
      println!("{:<14} {:?}", info.name, info.encoding);
    }
    return Ok(());
  }

  // Load configuration; a base URL on the command line makes the file optional
  let config = Config::resolve(Config::load_optional(args.config.as_deref())?, args.base_url)?;

  let remote = HttpResourceClient::new(
    &config.api.base_url,
    Config::get_api_token(),
    config.api.timeout(),
  )?;
  info!("Using {}", remote.base_url());
  let controller = SyncController::with_remote(Arc::new(remote), config.sync);

  match args.command {
    Command::List { resource, params } => {
      let info = lookup(&resource)?;
      let key = QueryKey::list(info.name, params);
      print_result(controller.query(&key).await, info, args.raw)?;
    }
    Command::Get { resource, id } => {
      let info = lookup(&resource)?;
      let key = QueryKey::detail(info.name, id);
      print_result(controller.query(&key).await, info, args.raw)?;
    }
    Command::Create { resource, body } => {
      let info = lookup(&resource)?;
      let payload = body.into_payload()?;
      let body = controller
        .mutate(controller.prepare(info, MutationKind::Create { payload }))
        .await?;
      print_json(&body)?;
    }
    Command::Update { resource, id, body } => {
      let info = lookup(&resource)?;
      let payload = body.into_payload()?;
      let body = controller
        .mutate(controller.prepare(info, MutationKind::Update { id, payload }))
        .await?;
      print_json(&body)?;
    }
    Command::Delete { resource, id } => {
      let info = lookup(&resource)?;
      let body = controller
        .mutate(controller.prepare(info, MutationKind::Delete { id }))
        .await?;
      print_json(&body)?;
    }
    Command::Resources => {}
  }

  Ok(())
}
