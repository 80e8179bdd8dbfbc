use clap::Parser;
use color_eyre::Result;
use hdfs_fsimage_exporter::{
    init_errors,
    init_logging,
    run,
    Args,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_errors()?;
    init_logging(args.verbose)?;
    run(args).await
}
