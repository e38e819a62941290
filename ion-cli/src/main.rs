// CLI application
use clap::Parser;
use ion_cli::commands::{dump_cfg, print_liveness};
use ion_core::config::IterationOrder;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ion")]
#[command(about = "CFG construction and liveness analysis for pseudo-assembly")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the wired control flow graph
    Cfg {
        /// Path to the source file
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Print live-in / live-out sets for every block
    Liveness {
        /// Path to the source file
        #[arg(short, long)]
        input: PathBuf,

        /// Emit the JSON report instead of text
        #[arg(long)]
        json: bool,

        /// Block order inside each solver pass (postorder, reverse-program, program)
        #[arg(long)]
        order: Option<IterationOrder>,

        /// Path to a JSON analysis config
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Cfg { input } => {
            dump_cfg(&input)?;
        }
        Commands::Liveness {
            input,
            json,
            order,
            config,
        } => {
            print_liveness(&input, json, order, config.as_deref())?;
        }
    }

    Ok(())
}
