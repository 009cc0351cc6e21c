// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, CheckConfig, Health, Serve, Version};

command_enum! {
    (CheckConfig, CheckConfig),
    (Health, Health),
    (Serve, Serve),
    (Version, Version),
}

impl Command {
    fn worker_threads(&self) -> Option<usize> {
        match self {
            Command::Serve(serve) => serve.worker_threads(),
            _ => None,
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(workers) = args.command.worker_threads() {
        runtime.worker_threads(workers);
    }
    let runtime = match runtime.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start the async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = cli::op::OpContext::new(args.remote);

    match runtime.block_on(args.command.execute(&ctx)) {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
