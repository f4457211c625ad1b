//! vshell CLI
//!
//! Usage:
//!   vshell -c "command"          Execute one command line
//!   vshell script.vsh            Execute a script file, one command per line
//!   vshell                       Interactive shell over stdin
//!   vshell --agent bot.agent     Run an agent definition against the mock model

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vshell::agent::{AgentDefinition, AgentProcessManager, ProcessState};
use vshell::{SecurityProfile, Shell, ShellConfig};

/// In-process Unix-like shell over a virtual filesystem
#[derive(Parser, Debug)]
#[command(name = "vshell")]
#[command(about = "Unix-like shell over a pluggable virtual filesystem")]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage provider (memory, sqlite, s3)
    #[arg(long)]
    provider: Option<String>,

    /// Provider argument; the value is parsed as JSON, falling back to a string
    #[arg(long = "provider-arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    provider_args: Vec<(String, serde_json::Value)>,

    /// Security profile (default, strict, readonly, untrusted, testing)
    #[arg(long)]
    security: Option<SecurityProfile>,

    /// Command line to execute
    #[arg(short = 'c', conflicts_with = "script")]
    command: Option<String>,

    /// Script file to execute
    script: Option<PathBuf>,

    /// Agent definition file to run
    #[arg(long, conflicts_with_all = ["command", "script"])]
    agent: Option<PathBuf>,

    /// Input handed to the agent
    #[arg(long, requires = "agent", default_value = "")]
    input: String,

    /// Schedule the agent as a background task
    #[arg(long, requires = "agent")]
    background: bool,
}

fn parse_key_value(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load_config(args: &Args) -> anyhow::Result<ShellConfig> {
    let mut config = match &args.config {
        Some(path) => ShellConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ShellConfig::default(),
    };
    if let Some(name) = &args.provider {
        config.provider.name = name.clone();
    }
    for (key, value) in &args.provider_args {
        config.provider.args.insert(key.clone(), value.clone());
    }
    if let Some(profile) = args.security {
        let mut security = config.security.take().unwrap_or_default();
        security.profile = profile;
        config.security = Some(security);
    }
    Ok(config)
}

fn print_output(output: &str) {
    if !output.is_empty() {
        println!("{}", output);
    }
}

fn run_script(shell: &mut Shell, path: &Path) -> anyhow::Result<()> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        print_output(&shell.execute(line));
        if !shell.is_running() {
            break;
        }
    }
    Ok(())
}

fn run_interactive(shell: &mut Shell) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    while shell.is_running() {
        write!(stdout, "{}", shell.prompt())?;
        stdout.flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }
        print_output(&shell.execute(&line));
    }
    Ok(())
}

async fn run_agent(
    config: &ShellConfig,
    path: &Path,
    input: &str,
    background: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read agent file {}", path.display()))?;
    let definition: AgentDefinition = text
        .parse()
        .with_context(|| format!("failed to parse agent file {}", path.display()))?;

    let shell = Shell::from_config(config).context("failed to create shell")?;
    let manager = Arc::new(AgentProcessManager::from_config(
        Arc::new(Mutex::new(shell)),
        &config.agents,
    ));
    let process = manager.create_process(definition, background);

    let reply = if background {
        let task = manager.spawn_process(Arc::clone(&process), input);
        let pid = process
            .lock()
            .map_err(|_| anyhow::anyhow!("process lock poisoned"))?
            .pid()
            .to_string();
        eprintln!("[1] {}", pid);
        task.await.context("agent task panicked")??
    } else {
        manager.run_process(&process, input).await?
    };

    let process = process
        .lock()
        .map_err(|_| anyhow::anyhow!("process lock poisoned"))?;
    let state = process.state();
    if state == ProcessState::Completed {
        print_output(&reply);
    } else {
        eprintln!("{}", process.error_buffer());
    }
    eprintln!(
        "[{}] {} in {:.2}s",
        process.pid(),
        state,
        process.get_runtime().as_secs_f64()
    );
    if state != ProcessState::Completed {
        bail!("agent {} {}", process.pid(), state);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr keeps logs out of command output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(agent) = &args.agent {
        return run_agent(&config, agent, &args.input, args.background).await;
    }

    let mut shell = Shell::from_config(&config).context("failed to create shell")?;
    tracing::debug!(provider = %shell.fs().provider_name(), "shell ready");

    match (&args.command, &args.script) {
        (Some(command), _) => print_output(&shell.execute(command)),
        (None, Some(script)) => run_script(&mut shell, script)?,
        (None, None) => run_interactive(&mut shell)?,
    }
    Ok(())
}
