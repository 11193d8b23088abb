use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use genai_core::{
    config::ClientConfig,
    model::{Client, ModelParams},
};

#[derive(Parser)]
#[command(author, version, about = "genai CLI smoke tool", long_about = None)]
struct Cli {
    /// Path to a JSON or TOML client config; falls back to GENAI_API_KEY.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a one-shot generation request
    Generate {
        #[arg(long)]
        model: String,
        #[arg(short, long, help = "Prompt text")]
        prompt: String,
    },
    /// Stream a generation (prints deltas live)
    GenerateStream {
        #[arg(long)]
        model: String,
        #[arg(short, long, help = "Prompt text")]
        prompt: String,
    },
    /// Count the tokens a prompt would consume
    CountTokens {
        #[arg(long)]
        model: String,
        #[arg(short, long, help = "Prompt text")]
        prompt: String,
    },
    /// Embed a piece of text
    Embed {
        #[arg(long)]
        model: String,
        #[arg(short, long, help = "Input text")]
        input: String,
    },
}

fn build_client(config: Option<&std::path::Path>) -> anyhow::Result<Client> {
    let cfg = match config {
        Some(path) => ClientConfig::from_path(path)?,
        None => ClientConfig::default(),
    };
    Ok(Client::from_config(&cfg)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = build_client(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate { model, prompt } => {
            let model = client.generative_model(ModelParams::new(model))?;
            let resp = model.generate_content(prompt.as_str(), None).await?;
            println!("{}", resp.text());
            if let Some(reason) = resp.finish_reason() {
                eprintln!("[finish: {:?}]", reason);
            }
        }
        Commands::GenerateStream { model, prompt } => {
            let model = client.generative_model(ModelParams::new(model))?;
            let mut result = model
                .generate_content_stream(prompt.as_str(), None)
                .await?;

            use std::io::{self, Write};
            let mut saw_delta = false;
            while let Some(chunk) = result.stream.next().await {
                match chunk {
                    Ok(resp) => {
                        saw_delta = true;
                        print!("{}", resp.text());
                        io::stdout().flush().ok();
                    }
                    Err(err) => {
                        eprintln!("[error: {err}]");
                        break;
                    }
                }
            }
            if saw_delta {
                println!();
            }
            let full = result.response.resolve().await?;
            if let Some(reason) = full.finish_reason() {
                eprintln!("[finish: {:?}]", reason);
            }
        }
        Commands::CountTokens { model, prompt } => {
            let model = client.generative_model(ModelParams::new(model))?;
            let resp = model.count_tokens(prompt.as_str(), None).await?;
            println!("{}", resp.total_tokens);
        }
        Commands::Embed { model, input } => {
            let model = client.generative_model(ModelParams::new(model))?;
            let resp = model.embed_content(input.as_str(), None).await?;
            println!("dim={}", resp.embedding.values.len());
        }
    }

    Ok(())
}
