// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use codrive::prelude::*;
use codrive::metrics::analyzer::{self, BatchReport};
use codrive::metrics::logger::SummaryLogger;
use codrive::planner::{JamLevel, plan};
use codrive::simulation::{Prompt, RecordingDecisions};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one episode and write its log as JSON.
    Run {
        #[command(flatten)]
        params: Params,
        /// Replay override tokens from a response script.
        #[arg(long, conflicts_with = "interactive")]
        script: Option<PathBuf>,
        /// Answer override prompts from the terminal.
        #[arg(short, long)]
        interactive: bool,
        /// Save the override tokens used as a response script.
        #[arg(long)]
        record: Option<PathBuf>,
        #[arg(long)]
        label: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        cf_seed: Option<u64>,
        #[arg(long)]
        cf_ai_scaler: Option<f64>,
        #[arg(long)]
        cf_human_scaler: Option<f64>,
    },

    /// Simulate one episode per seed and summarize the batch.
    Batch {
        #[command(flatten)]
        params: Params,
        #[arg(short = 'n', long, default_value_t = 20)]
        episodes: u64,
        #[arg(long, default_value = "results")]
        out_dir: PathBuf,
    },

    /// Derive a counterfactual response script from a factual one.
    Counterfactual {
        script: PathBuf,
        /// Resolve the branch with a takeover (`ycf`) instead of `ncf`.
        #[arg(long)]
        take_over: bool,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the cost-to-go grid of a world under its true hazards.
    Plan {
        world: PathBuf,
        #[arg(short, long, default_value_t = 10)]
        delay: u32,
    },
}

#[derive(Args)]
struct Params {
    world: PathBuf,
    /// JSON configuration; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    seed: Option<u64>,
    #[arg(long)]
    initial_driver: Option<Driver>,
    #[arg(long)]
    ai_scaler: Option<f64>,
    #[arg(long)]
    human_scaler: Option<f64>,
    #[arg(long)]
    ai_switching: Option<f64>,
    #[arg(long)]
    human_switching: Option<f64>,
    #[arg(long)]
    sim_scaler: Option<f64>,
    #[arg(long)]
    rollouts: Option<usize>,
    #[arg(long)]
    horizon: Option<u32>,
    #[arg(long)]
    max_ticks: Option<u32>,
}

impl Params {
    fn load(&self) -> Result<(GridMap, SimConfig)> {
        let text = fs::read_to_string(&self.world)
            .with_context(|| format!("reading world {}", self.world.display()))?;
        let map = GridMap::parse(&text)?;

        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };
        if let Some(stem) = self.world.file_stem() {
            config = config.with_name(stem.to_string_lossy());
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(driver) = self.initial_driver {
            config.initial_driver = driver;
        }
        if self.ai_scaler.is_some() {
            config.ai_scaler = self.ai_scaler;
        }
        if self.human_scaler.is_some() {
            config.human_scaler = self.human_scaler;
        }
        if let Some(p) = self.ai_switching {
            config.ai_switching = p;
        }
        if let Some(p) = self.human_switching {
            config.human_switching = p;
        }
        if let Some(scaler) = self.sim_scaler {
            config.sim_scaler = scaler;
        }
        if let Some(rollouts) = self.rollouts {
            config.rollouts = rollouts;
        }
        if self.horizon.is_some() {
            config.horizon = self.horizon;
        }
        if self.max_ticks.is_some() {
            config.max_ticks = self.max_ticks;
        }
        Ok((map, config))
    }
}

/// Reads override tokens line by line, asking again until the answer fits the prompt.
/// End of input means no more answers; a failed read or write is an i/o error.
struct TerminalDecisions<R, W> {
    input: R,
    output: W,
}

impl TerminalDecisions<BufReader<io::Stdin>, io::Stdout> {
    fn stdio() -> Self {
        Self {
            input: BufReader::new(io::stdin()),
            output: io::stdout(),
        }
    }
}

impl<R, W> fmt::Debug for TerminalDecisions<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TerminalDecisions")
    }
}

impl<R: BufRead + Send, W: Write + Send> DecisionSource for TerminalDecisions<R, W> {
    fn decide(&mut self, prompt: &Prompt) -> codrive::Result<String> {
        loop {
            writeln!(self.output, "{}", prompt)?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(SimError::ScriptExhausted {
                    prompt: prompt.to_string(),
                });
            }
            let token = line.trim().to_string();
            if prompt.accepts(&token) {
                return Ok(token);
            }
            writeln!(self.output, "Incorrect input: {:?}", token)?;
        }
    }

    fn name(&self) -> &str {
        "terminal"
    }
}

fn main() -> Result<()> {
    let program_start = Instant::now();
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            params,
            script,
            interactive,
            record,
            label,
            output,
            cf_seed,
            cf_ai_scaler,
            cf_human_scaler,
        } => {
            let (map, mut config) = params.load()?;
            if let Some(seed) = cf_seed {
                config = config.with_counterfactual(seed, cf_ai_scaler, cf_human_scaler);
            }
            run_episode(map, config, script, interactive, record, label, output)?;
        }

        Commands::Batch {
            params,
            episodes,
            out_dir,
        } => {
            let (map, config) = params.load()?;
            run_batch(map, config, episodes, &out_dir)?;
        }

        Commands::Counterfactual {
            script,
            take_over,
            output,
        } => {
            let factual: ResponseScript = serde_json::from_str(&fs::read_to_string(&script)?)?;
            let Some(branch) = factual.counterfactual(take_over) else {
                anyhow::bail!("{} never offered a handoff, nothing to branch from", script.display());
            };
            fs::write(&output, serde_json::to_string_pretty(&branch)?)?;
            info!("Counterfactual script saved to: {}", output.display());
        }

        Commands::Plan { world, delay } => {
            let map = GridMap::parse(&fs::read_to_string(&world)?)?;
            print_plan(&map, delay);
        }
    }

    info!("Total runtime: {:.2}s", program_start.elapsed().as_secs_f64());
    Ok(())
}

fn run_episode(
    map: GridMap,
    mut config: SimConfig,
    script: Option<PathBuf>,
    interactive: bool,
    record: Option<PathBuf>,
    label: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut source: Option<Box<dyn DecisionSource>> = None;
    let mut label = label;

    if let Some(path) = &script {
        let script: ResponseScript = serde_json::from_str(&fs::read_to_string(path)?)?;
        if let Some(driver) = script.initial_driver {
            config.initial_driver = driver;
        }
        label = label.or_else(|| script.label.clone());
        source = Some(Box::new(script.decisions()));
    } else if interactive {
        config.initial_driver = ask_initial_driver()?;
        source = Some(Box::new(TerminalDecisions::stdio()));
    }

    let mut tape = None;
    if record.is_some() {
        if let Some(inner) = source.take() {
            let recorder = RecordingDecisions::new(inner);
            tape = Some(recorder.tape());
            source = Some(Box::new(recorder));
        }
    }

    info!("codrive: single episode");
    let sim = Simulation::new(map, config.clone());
    let log = sim.run(source)?;

    let output = match output {
        Some(path) => path,
        None => {
            fs::create_dir_all("results")?;
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let suffix = label.as_deref().map(|l| format!("_{}", l)).unwrap_or_default();
            PathBuf::from(format!("results/{}_{}{}.json", config.name, timestamp, suffix))
        }
    };
    fs::write(&output, serde_json::to_string_pretty(&log)?)?;
    info!("Log saved to: {}", output.display());

    if let (Some(path), Some(tape)) = (record, tape) {
        let recorded = ResponseScript {
            initial_driver: Some(config.initial_driver),
            tokens: tape.lock().clone(),
            label,
        };
        fs::write(&path, serde_json::to_string_pretty(&recorded)?)?;
        info!("Responses saved to: {}", path.display());
    }

    let summary = log.summary();
    info!(
        "Outcome: {:?} | Length: {} | Reward: {} | Handoffs: {}",
        summary.outcome, summary.length, summary.total_reward, summary.handoffs
    );
    let snapshot = sim.metrics.snapshot();
    info!(
        "Plans: {} | Cache hit rate: {:.1}% | Rollouts: {}",
        snapshot.plans_computed,
        snapshot.cache_hit_rate * 100.0,
        snapshot.rollouts
    );
    Ok(())
}

fn ask_initial_driver() -> Result<Driver> {
    let stdin = io::stdin();
    println!("Who is the initial agent (ai/human)?");
    loop {
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            anyhow::bail!("stdin closed before the initial agent was chosen");
        }
        match line.trim().parse::<Driver>() {
            Ok(driver) => return Ok(driver),
            Err(_) => println!("Incorrect input. Please type either ai or human."),
        }
    }
}

fn run_batch(map: GridMap, config: SimConfig, episodes: u64, out_dir: &Path) -> Result<()> {
    info!("codrive: batch of {} episodes", episodes);
    let seeds: Vec<u64> = (config.seed..config.seed + episodes).collect();
    let name = config.name.clone();

    let sim = Simulation::new(map, config);
    let logs = sim.run_batch(&seeds)?;
    let summaries: Vec<_> = logs.iter().map(EpisodeLog::summary).collect();

    fs::create_dir_all(out_dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    let csv_path = out_dir.join(format!("{}_{}.csv", name, timestamp));
    let mut logger = SummaryLogger::new(&csv_path)?;
    logger.log_batch(&summaries)?;
    info!("Summaries saved to: {}", csv_path.display());

    let report = analyzer::analyze(&summaries, &name);
    let json_path = out_dir.join(format!("{}_{}_analysis.json", name, timestamp));
    fs::write(&json_path, serde_json::to_string_pretty(&report)?)?;
    info!("Analysis saved to: {}", json_path.display());

    report_table(&report);
    Ok(())
}

fn report_table(report: &BatchReport) {
    println!("\n╔════════════════════╦═══════════╦═══════════╦═══════════╦═══════════╦═══════════╗");
    println!("║ World              ║ Goal (%)  ║ Avg len   ║ Avg reward║ Handoff % ║ AI end %  ║");
    println!("╠════════════════════╬═══════════╬═══════════╬═══════════╬═══════════╬═══════════╣");
    println!(
        "║ {:<18} ║ {:>9.1} ║ {:>9.2} ║ {:>9.2} ║ {:>9.1} ║ {:>9.1} ║",
        report.name,
        report.goal_rate * 100.0,
        report.avg_length,
        report.avg_reward,
        report.handoff_rate * 100.0,
        report.ai_final_share * 100.0,
    );
    println!("╚════════════════════╩═══════════╩═══════════╩═══════════╩═══════════╩═══════════╝\n");
}

fn print_plan(map: &GridMap, delay: u32) {
    let key = HazardKey::new(
        map.closure(),
        map.accident(),
        map.traffic().iter().map(|t| JamLevel::from_jammed(t.jammed)),
    );
    let table = plan(map, &key, delay);

    println!();
    for row in 0..map.rows() as i32 {
        let line: Vec<String> = (0..map.cols() as i32)
            .map(|col| {
                let cell = Cell::new(row, col);
                if !map.is_road(cell) {
                    format!("{:>6}", "#")
                } else {
                    table
                        .get(cell)
                        .map(|cost| format!("{:>6.1}", cost))
                        .unwrap_or_else(|| format!("{:>6}", "--"))
                }
            })
            .collect();
        println!("{}", line.join(""));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"))
        }
    }

    fn offer() -> Prompt {
        Prompt::Offer { driver: Driver::Ai }
    }

    #[test]
    fn terminal_asks_again_after_a_bad_answer() {
        let mut terminal = TerminalDecisions {
            input: "maybe\n y \n".as_bytes(),
            output: Vec::new(),
        };
        assert_eq!(terminal.decide(&offer()).unwrap(), "y");
        let shown = String::from_utf8(terminal.output).unwrap();
        assert_eq!(shown.matches(&offer().to_string()).count(), 2);
        assert!(shown.contains("Incorrect input: \"maybe\""));
    }

    #[test]
    fn end_of_input_exhausts_the_terminal() {
        let mut terminal = TerminalDecisions {
            input: "".as_bytes(),
            output: Vec::new(),
        };
        assert!(matches!(terminal.decide(&offer()), Err(SimError::ScriptExhausted { .. })));
    }

    #[test]
    fn read_failures_are_io_errors() {
        let mut terminal = TerminalDecisions {
            input: BufReader::new(BrokenPipe),
            output: Vec::new(),
        };
        match terminal.decide(&offer()) {
            Err(SimError::Io(message)) => assert!(message.contains("terminal went away")),
            other => panic!("expected an i/o error, got {:?}", other),
        }
    }
}
