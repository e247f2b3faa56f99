use std::time::Duration;

use colored::Colorize;

use ferry_client::{ClientConfig, UploadSession, UploadSource};

use crate::cli::{Cli, Command, UploadArgs};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Upload(args) => cmd_upload(args),
    }
}

fn cmd_upload(args: UploadArgs) -> anyhow::Result<()> {
    let source = UploadSource::from_path(&args.file)?;
    let mut config = ClientConfig::new(&args.server, &args.id).with_port(args.port);
    if let Some(secs) = args.timeout_secs {
        config = config.with_response_timeout(Duration::from_secs(secs));
    }

    println!(
        "Uploading {} ({} bytes) to {}",
        source.key.bold(),
        source.size,
        config.addr().bold()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        let session = UploadSession::connect(config).await?;
        session.run(&source).await
    })?;

    if report.storage_key != source.key {
        println!("  stored as {} (name was taken)", report.storage_key.yellow());
    }
    println!("  {} blocks, {} bytes sent", report.blocks_sent, report.bytes_sent);

    if report.verified {
        println!(
            "{} digest verified: {}",
            "✓".green().bold(),
            report.local_digest.dimmed()
        );
        Ok(())
    } else {
        println!(
            "{} digest mismatch: sent {}, server stored {}",
            "✗".red().bold(),
            report.local_digest,
            report.server_digest
        );
        anyhow::bail!("upload completed but the stored copy failed verification")
    }
}
