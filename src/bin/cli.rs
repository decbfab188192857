//! Mobile Agent - VLM-driven Android automation
//!
//! CLI entry point. The instruction comes from the command line (or the
//! INSTRUCTION variable); everything else is environment-driven, with a
//! `.env` file honored when present.

use mobile_agent::config::{load_app_catalog, DEFAULT_APP_CATALOG};
use mobile_agent::{AdbDevice, Agent, AgentConfig, CompletionStatus, ServiceConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    let instruction = if args.len() > 1 {
        args[1..].join(" ")
    } else {
        env::var("INSTRUCTION").unwrap_or_default()
    };
    if instruction.trim().is_empty() {
        anyhow::bail!("no instruction given; pass it as arguments or set INSTRUCTION");
    }

    // Model-service endpoints
    let mut service_config = ServiceConfig::default();
    if let Ok(host) = env::var("PLAN_HOST") {
        service_config = service_config.with_plan_host(host);
    }
    if let Ok(host) = env::var("CHAT_HOST") {
        service_config = service_config.with_chat_host(host);
    }
    if let Ok(host) = env::var("PERCEIVE_HOST") {
        service_config = service_config.with_perceive_host(host);
    }
    if let Ok(host) = env::var("ANALYSIS_HOST") {
        service_config = service_config.with_analysis_host(host);
    }
    if let Ok(name) = env::var("MODEL_NAME") {
        service_config = service_config.with_model_name(name);
    }

    // Agent behavior
    let max_steps: u32 = env::var("MAX_STEPS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);
    let settle_secs: u64 = env::var("SETTLE_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(11);

    let mut agent_config = AgentConfig::default()
        .with_instruction(&instruction)
        .with_max_steps(max_steps)
        .with_settle(Duration::from_secs(settle_secs))
        .with_modules(
            env_flag("USE_ANALYSIS", false),
            env_flag("USE_REFLECTION", true),
            env_flag("USE_MEMORY", true),
            env_flag("USE_OPEN_APP", true),
        );
    agent_config.do_stop = env_flag("DO_STOP", true);
    if let Ok(dir) = env::var("OUTPUT_DIR") {
        agent_config = agent_config.with_output_dir(dir);
    }
    if let Ok(name) = env::var("RUN_NAME") {
        agent_config = agent_config.with_run_name(name);
    }
    if let Ok(font) = env::var("OVERLAY_FONT") {
        agent_config.overlay_font = Some(PathBuf::from(font));
    }

    // Device
    let device_id = env::var("ADB_DEVICE_ID").ok();
    let apps = match env::var("APPS_FILE") {
        Ok(path) => load_app_catalog(PathBuf::from(path).as_path())?,
        Err(_) => DEFAULT_APP_CATALOG.clone(),
    };
    let mut device = AdbDevice::new(device_id.clone(), apps);
    if let Ok(adb_path) = env::var("ADB_PATH") {
        device = device.with_adb_path(adb_path);
    }

    println!("Mobile Agent - VLM-driven Android automation");
    println!("============================================");
    println!("Instruction: {instruction}");
    println!(
        "Endpoints: plan={} chat={} perceive={} analysis={}",
        service_config.plan_host,
        service_config.chat_host,
        service_config.perceive_host,
        service_config.analysis_host
    );
    println!("Max steps: {max_steps}, settle: {settle_secs}s");
    if let Some(id) = &device_id {
        println!("Device: {id}");
    }
    println!("============================================\n");

    let mut agent = Agent::new(agent_config, service_config, device)?;

    // Ctrl-C aborts the run; unbounded retries unwind promptly.
    let cancel = agent.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received, cancelling run...");
            cancel.cancel();
        }
    });

    let trajectory = agent.run().await?;

    let status = trajectory
        .steps
        .last()
        .map(|step| step.status)
        .unwrap_or(CompletionStatus::Unknown);
    println!("\nRun finished: {} steps, status {:?}", trajectory.len(), status);
    if let Some(answer) = trajectory.steps.last().and_then(|s| s.answer.clone()) {
        println!("Answer: {answer}");
    }

    Ok(())
}
