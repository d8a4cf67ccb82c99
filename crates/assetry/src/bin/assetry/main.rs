mod cli;

use assetry::host::{AssetHost, HostMode};
use assetry::value::Value;
use assetry::vfs::{packed, FileOrFolder};
use assetry::{AssetContext, Loader, Options};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ASSETRY_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match context(&cli.options) {
        Ok(cx) => match cli.command {
            cli::Command::Resolve(resolve_cli) => resolve(cx, resolve_cli).await,
            cli::Command::List(list_cli) => list(cx, list_cli).await,
            cli::Command::Pack(pack_cli) => pack(cx, pack_cli).await,
            cli::Command::Serve(serve_cli) => serve(cx, serve_cli).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn context(options: &cli::OptionArgs) -> anyhow::Result<AssetContext> {
    let options = Options {
        max_inheritance_depth: options.max_depth,
        document_extension: options.extension.clone(),
        ..Default::default()
    };
    Ok(AssetContext::builder().options(options).build()?)
}

pub async fn resolve(cx: AssetContext, cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let loader = Loader::open(cx, cli.location).await?;
    let resolved = loader.resolve(&cli.document).await?;
    for issue in &resolved.issues {
        eprintln!("warning: {issue}");
    }

    output(&cli.output, &resolved.document)
}

pub async fn list(cx: AssetContext, cli: cli::ListCommand) -> anyhow::Result<()> {
    let loader = Loader::open(cx, cli.location).await?;
    let files = match &cli.pattern {
        Some(pattern) => loader.find_files(pattern).await?,
        None => loader.files().await?,
    };
    for file in files {
        println!("{}", file.full_name());
    }
    Ok(())
}

pub async fn pack(cx: AssetContext, cli: cli::PackCommand) -> anyhow::Result<()> {
    let loader = Loader::open(cx, cli.location).await?;
    let archive = packed::pack(loader.root()?.as_ref()).await?;
    std::fs::write(&cli.output, &archive)?;
    tracing::info!(output = %cli.output.display(), len = archive.len(), "archive written");
    Ok(())
}

pub async fn serve(cx: AssetContext, cli: cli::ServeCommand) -> anyhow::Result<()> {
    let loader = Loader::open(cx, cli.location).await?;
    let mode = if cli.packed {
        HostMode::Packed
    } else {
        HostMode::Listing
    };
    let host = Arc::new(AssetHost::new(loader.root()?, mode));
    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    eprintln!("serving {} on http://{}", loader.location(), cli.addr);
    assetry::host::serve(host, listener).await?;
    Ok(())
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
        cli::OutputFormat::Hcl => print!("{}", assetry::document::to_text(value)?),
    };

    Ok(())
}
