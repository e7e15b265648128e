use anyhow::Context;
use lium_sdk::{Lium, MachineFilter, SortBy};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let lium = Lium::from_env().context("failed to configure Lium client")?;

    let executors = lium.list_executors().await.context("failed to list executors")?;
    info!("{} executors available", executors.len());

    let gpu_types = lium.gpu_types().await?;
    println!("GPU types on offer: {}", gpu_types.join(", "));

    let cheapest = lium
        .list_machines(&MachineFilter {
            sort_by: SortBy::Price,
            ..Default::default()
        })
        .await?;
    for executor in cheapest.iter().take(5) {
        println!(
            "  {:<28} {:>2}x {:<8} ${:>7.2}/h (${:.2}/GPU/h)",
            executor.huid,
            executor.gpu_count,
            executor.gpu_type,
            executor.price_per_hour,
            executor.price_per_gpu_hour
        );
    }

    let pods = lium.list_pods().await.context("failed to list pods")?;
    println!("{} active pods", pods.len());
    for pod in pods.iter().take(3) {
        println!(
            "  {:<28} {:<10} {}",
            pod.huid,
            pod.status,
            pod.ssh_cmd.as_deref().unwrap_or("-")
        );
    }

    // Only touch a pod over SSH when asked to.
    if let Ok(target) = std::env::var("LIUM_DEMO_POD") {
        match lium.wait_ready(target.as_str(), Duration::from_secs(60)).await? {
            Some(pod) => {
                let result = lium.exec(&pod, "nvidia-smi -L", None).await?;
                println!("{}", result.stdout.trim_end());
                if !result.success {
                    warn!("nvidia-smi exited with {}: {}", result.exit_code, result.stderr.trim());
                }
            }
            None => warn!("pod {} is not ready", target),
        }
    }

    Ok(())
}
