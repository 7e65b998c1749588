use std::path::Path;
use std::process::Command;

use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting as worker {} with work_dir={}",
        config.slot,
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool("ffmpeg", &["-version"])?;
    ensure_tool("ffprobe", &["-version"])?;
    ensure_tool(&config.capture.binary, &["--version"])?;
    ensure_env_present(&["R2_ENDPOINT_URL", "R2_ACCESS_KEY_ID", "R2_SECRET_ACCESS_KEY"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_tool(binary: &str, args: &[&str]) -> anyhow::Result<()> {
    let output = Command::new(binary)
        .args(args)
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", binary, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} {} failed: {:?}",
            binary,
            args.join(" "),
            output.status
        ));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true) {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
