use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bioguard_agent::agent::BioGuardAgent;
use bioguard_agent::dispatch::{
    AlertCueChannel, ChannelDispatcher, DialChannel, LogChannel, SmsChannel,
};
use bioguard_agent::perception::{JsonLinesSource, PerceptionSource, SimulatedSource};
use bioguard_agent::scheduler::Scheduler;
use bioguard_agent::timer::{Clock, SystemClock};
use bioguard_agent::{AgentConfig, Contact};
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceKind {
    /// Randomised scenes
    Simulated,
    /// Newline-delimited JSON perception frames on stdin
    Stdin,
}

#[derive(Parser, Debug)]
#[command(name = "bioguard", about = "Fall detection alert agent")]
struct Cli {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "simulated")]
    source: SourceKind,

    /// Seed for the simulated source
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Chance per sample that the simulated source reports a fall
    #[arg(long)]
    fall_chance: Option<f64>,

    #[arg(long, requires = "contact_number")]
    contact_name: Option<String>,

    #[arg(long)]
    contact_number: Option<String>,

    /// Stop sampling after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Override the sampling cadence in milliseconds
    #[arg(long)]
    sample_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bioguard_agent=info,bioguard=info".into()),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AgentConfig::default(),
    };
    if let Some(number) = cli.contact_number.clone() {
        config.contact = Some(Contact {
            name: cli.contact_name.clone().unwrap_or_else(|| number.clone()),
            number,
        });
    }
    if let Some(ms) = cli.sample_ms {
        config.sample_interval_ms = ms;
    }
    config.validate()?;

    info!("bioguard v{} starting", env!("CARGO_PKG_VERSION"));
    if config.contact.is_none() {
        info!("no caregiver contact configured; alerts will stay local");
    }

    let (cue, cue_rx) = AlertCueChannel::new();
    let (dial, dial_rx) = DialChannel::new();
    let (sms, sms_rx) = SmsChannel::new();
    let dispatcher = ChannelDispatcher::new()
        .with_channel(cue)
        .with_channel(LogChannel)
        .with_channel(dial)
        .with_channel(sms);
    info!(channels = ?dispatcher.channel_names(), "dispatcher ready");

    // Stand-ins for the presentation, telephony and messaging layers.
    std::thread::spawn(move || {
        for cue in cue_rx {
            info!(session = cue.session.0, "ALERT cue raised");
        }
    });
    std::thread::spawn(move || {
        for req in dial_rx {
            info!(session = req.session.0, uri = %req.uri, "dial requested");
        }
    });
    std::thread::spawn(move || {
        for req in sms_rx {
            info!(session = req.session.0, uri = %req.uri, "text message requested");
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let agent = BioGuardAgent::new(&config, dispatcher, clock.clone());

    let stats = match cli.source {
        SourceKind::Simulated => {
            let mut source = SimulatedSource::new(cli.seed);
            if let Some(chance) = cli.fall_chance {
                source = source.with_fall_chance(chance);
            }
            run(agent, source, clock, &config, cli.max_frames)
        }
        SourceKind::Stdin => {
            let source = JsonLinesSource::new(BufReader::new(std::io::stdin()));
            run(agent, source, clock, &config, cli.max_frames)
        }
    };

    info!(
        samples = stats.samples,
        rejected = stats.rejected,
        escalations = stats.escalations,
        dispatches = stats.dispatches,
        "done"
    );
    Ok(())
}

fn run<S: PerceptionSource>(
    agent: BioGuardAgent<ChannelDispatcher>,
    source: S,
    clock: Arc<dyn Clock>,
    config: &AgentConfig,
    max_frames: Option<u64>,
) -> bioguard_agent::scheduler::RunStats {
    let mut scheduler = Scheduler::new(agent, source, clock, config.sample_interval());
    scheduler.run(max_frames)
}
