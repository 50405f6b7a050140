use anyhow::{bail, Context};
use chunkvault::{ChunkVault, Database, DfsConfig, NewFile};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: chunkvault <put PATH | get FILE_ID OUT | ls | rm FILE_ID | verify FILE_ID | gc | stats>

environment:
  CHUNKVAULT_DB      database file (default: chunkvault.db)
  CHUNKVAULT_CONFIG  JSON config file (optional)
  RUST_LOG           log filter (default: info)";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> anyhow::Result<DfsConfig> {
    match std::env::var("CHUNKVAULT_CONFIG") {
        Ok(path) => DfsConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {}", path)),
        Err(_) => Ok(DfsConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }

    let db_path = std::env::var("CHUNKVAULT_DB").unwrap_or_else(|_| "chunkvault.db".to_string());
    let vault = ChunkVault::open(Database::at_path(&db_path), load_config()?)
        .await
        .with_context(|| format!("opening vault at {}", db_path))?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["put", path] => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path))?;
            let filename = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());

            let metadata = vault
                .ingest(NewFile::new(filename, data).with_path(*path))
                .await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        ["get", file_id, out] => {
            let data = vault.read_file(file_id).await?;
            tokio::fs::write(out, &data)
                .await
                .with_context(|| format!("writing {}", out))?;
            println!("wrote {} bytes to {}", data.len(), out);
        }
        ["ls"] => {
            for metadata in vault.list_files().await? {
                println!(
                    "{}  {:>10}  {:>4} chunks  {}",
                    metadata.file_id,
                    metadata.size,
                    metadata.chunk_count(),
                    metadata.path
                );
            }
        }
        ["rm", file_id] => {
            if !vault.delete_file(file_id).await? {
                bail!("no such file: {}", file_id);
            }
        }
        ["verify", file_id] => {
            let health = vault.verify_file(file_id).await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.is_healthy() {
                bail!("{} damaged chunks", health.damaged().count());
            }
        }
        ["gc"] => {
            let stats = vault.collect_garbage(Duration::from_secs(60)).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        ["stats"] => {
            let stats = vault.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        _ => bail!("{}", USAGE),
    }

    vault.database().close().await;
    Ok(())
}
