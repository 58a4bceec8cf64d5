//! `generator <spec-file> <output-file>` (§6.6): compiles an
//! instruction-description file into the packed blob format `blob::write_blob`
//! defines, for callers that want the tables without going through a build
//! script (the normal `xdec-decoder` build uses `xdec-tablegen` directly and
//! never shells out to this binary).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use xdec_tablegen::error::GeneratorErrors;

/// Compiles an instruction-description file into a packed dispatch-table blob.
#[derive(Parser, Debug)]
#[command(name = "generator", version, about)]
struct Args {
    /// Path to the textual instruction-description file.
    spec_file: PathBuf,

    /// Path the packed table blob is written to.
    output_file: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.spec_file)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", args.spec_file.display()))?;

    let graph = xdec_tablegen::parse_spec_str(&text).map_err(|errors: GeneratorErrors| {
        anyhow::anyhow!("{}: {errors}", args.spec_file.display())
    })?;
    info!(
        "parsed {} bytes into {} nodes, {} terminals, {} mnemonics",
        text.len(),
        graph.nodes.len(),
        graph.terminals.len(),
        graph.mnemonic_ids.len()
    );

    let blob = xdec_tablegen::blob::write_blob(&graph);
    fs::write(&args.output_file, &blob)
        .map_err(|e| anyhow::anyhow!("writing {}: {e}", args.output_file.display()))?;
    info!("wrote {} bytes to {}", blob.len(), args.output_file.display());
    Ok(())
}
