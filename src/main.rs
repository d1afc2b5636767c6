use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use lattice_vmc::parallel::{LocalTransport, Transport};
use lattice_vmc::sampling::{MetropolisLocal, Sr};
use lattice_vmc::Input;

#[derive(Parser, Debug)]
#[command(version, about = "Variational Monte Carlo ground-state optimizer", long_about = None)]
struct Args {
    /// Path to the JSON input file
    input: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = run(&args.input) {
        eprintln!("# Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(path: &Path) -> anyhow::Result<()> {
    // Single-process group; a message-passing transport slots in here.
    let transport = LocalTransport;

    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot open input file: {}", path.display()))?;
    let input = Input::from_str(&text)
        .with_context(|| format!("cannot parse input file: {}", path.display()))?;

    if transport.rank() == 0 {
        println!("# lattice_vmc ground-state optimizer");
    }

    let graph = input.graph.build()?;
    let hilbert = input.hilbert.build()?;
    let hamiltonian = input.hamiltonian.build(&graph)?;
    let machine = input.machine.build(&graph, &hilbert)?;

    input.sampler.validate()?;
    let sampler = MetropolisLocal::new(machine, hilbert, &transport, input.sampler.seed)?;

    let stepper = input.optimizer.build()?;
    let options = input.learning.build()?;

    let mut learning = Sr::new(hamiltonian, sampler, stepper, transport, options)?;
    learning.run()?;
    Ok(())
}
