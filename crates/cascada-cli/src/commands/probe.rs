//! Device negotiation report.

use super::common::{OutputArgs, open_device};
use clap::Args;

#[derive(Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    output: OutputArgs,
}

pub fn run(args: ProbeArgs) -> anyhow::Result<()> {
    let config = args.output.resolve()?;
    let requested = config.format();
    let mut device = open_device(&config)?;
    let capacity = device.check();

    println!("Output Device");
    println!("=============\n");
    println!("  Driver:     {}", device.driver_name());
    println!("  Model:      {}", device.model());
    println!("  Requested:  {} ({})", requested, config.class);
    println!("  Negotiated: {}", device.format());
    println!("  Class:      {}", device.class());
    println!("  State:      {:?}", device.state());
    println!(
        "  Chunk:      {} frames ({} bytes)",
        device.frames_per_chunk(),
        device.chunk_bytes()
    );
    match capacity {
        Ok(chunks) => println!("  Capacity:   {} chunk(s)", chunks),
        Err(err) => println!("  Capacity:   unavailable ({})", err),
    }

    device.close();
    Ok(())
}
