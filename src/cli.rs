use crate::config::CliOverrides;
use crate::handlers::{Device, GenerationOverrides};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "qllama",
    author,
    version,
    about = "Chat with locally hosted language and vision models",
    long_about = None
)]
pub struct Args {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a model in interactive mode
    Run(RunArgs),
    /// List available models
    List,
    /// Check external tools and backend reachability
    Check {
        /// Inference server base URL
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Model name to run (see `qllama list`)
    pub model: String,

    /// Device to use (auto, cpu, cuda, cuda:N, metal)
    #[arg(long)]
    pub device: Option<Device>,

    /// Temperature for generation
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long = "max-tokens")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling threshold
    #[arg(long = "top-p")]
    pub top_p: Option<f32>,

    /// Force sampling on
    #[arg(long, conflicts_with = "greedy")]
    pub sample: bool,

    /// Force greedy decoding
    #[arg(long)]
    pub greedy: bool,

    /// Inference server base URL
    #[arg(long)]
    pub base_url: Option<String>,
}

impl RunArgs {
    pub fn overrides(&self) -> CliOverrides {
        let sampling_enabled = match (self.sample, self.greedy) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };

        CliOverrides {
            device: self.device.clone(),
            base_url: self.base_url.clone(),
            generation: GenerationOverrides {
                max_new_tokens: self.max_tokens,
                temperature: self.temperature,
                top_p: self.top_p,
                sampling_enabled,
            },
        }
    }
}
