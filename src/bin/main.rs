use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use httputils::{Client, FileSource, Multipart, Params, Response, TimeoutConfig};
use tracing::Level;

#[derive(Parser)]
#[command(name = "httputils")]
#[command(about = "Send form, JSON and multipart requests through a pooled HTTP client")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Options {
    /// Request headers (format: "Name: Value")
    #[arg(short = 'H', long = "header", global = true)]
    headers: Vec<String>,

    /// Connect and response timeout in seconds
    #[arg(short, long, default_value = "30", global = true)]
    timeout: u64,

    /// Show response headers
    #[arg(long, global = true)]
    show_headers: bool,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Text,
    Json,
    Headers,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a GET request
    Get {
        /// URL to request
        url: String,
        /// Query parameters (format: key=value)
        #[arg(short, long)]
        query: Vec<String>,
    },
    /// POST a JSON document
    PostJson {
        /// URL to request
        url: String,
        /// JSON text, or @path to read it from a file
        body: String,
    },
    /// POST a URL-encoded form
    PostForm {
        /// URL to request
        url: String,
        /// Form fields (format: key=value)
        fields: Vec<String>,
    },
    /// Upload files as multipart/form-data
    Upload {
        /// URL to request
        url: String,
        /// Files to attach (format: field=path)
        #[arg(long = "file", required = true)]
        files: Vec<String>,
        /// Text fields (format: key=value)
        #[arg(long = "field")]
        fields: Vec<String>,
    },
}

fn split_pair<'a>(pair: &'a str, separator: char, what: &str) -> anyhow::Result<(&'a str, &'a str)> {
    pair.split_once(separator)
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| anyhow!("invalid {} {:?}", what, pair))
}

fn params(pairs: &[String]) -> anyhow::Result<Params> {
    pairs
        .iter()
        .map(|pair| split_pair(pair, '=', "parameter"))
        .collect::<anyhow::Result<Vec<_>>>()
        .map(|pairs| pairs.into_iter().collect())
}

fn print_response(response: &Response, options: &Options) -> anyhow::Result<()> {
    let status = response.status();
    let status_line = if status.is_success() {
        status.to_string().green()
    } else if status.is_client_error() || status.is_server_error() {
        status.to_string().red()
    } else {
        status.to_string().yellow()
    };

    match options.format {
        OutputFormat::Text => {
            if options.show_headers {
                println!("Status: {}", status_line);
                println!("Headers:");
                for (name, value) in response.headers() {
                    println!("  {}: {}", name.cyan(), value);
                }
                println!();
            }
            println!("{}", response.string_body());
        }
        OutputFormat::Json => {
            let headers: Vec<_> = response
                .headers()
                .iter()
                .map(|(name, value)| serde_json::json!([name, value]))
                .collect();
            let json_response = serde_json::json!({
                "status": status.as_u16(),
                "mime_type": response.mime_type(),
                "charset": response.charset().name(),
                "headers": headers,
                "body": response.string_body(),
            });
            println!("{}", serde_json::to_string_pretty(&json_response)?);
        }
        OutputFormat::Headers => {
            println!("Status: {}", status_line);
            for (name, value) in response.headers() {
                println!("{}: {}", name, value);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let options = cli.options;

    let level = match options.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let timeout = Duration::from_secs(options.timeout);
    let client = Client::builder()
        .timeouts(TimeoutConfig::new(timeout))
        .build()
        .context("failed to build client")?;

    let headers = options
        .headers
        .iter()
        .map(|header| split_pair(header, ':', "header"))
        .collect::<anyhow::Result<Vec<_>>>()?
        .into_iter()
        .collect::<Params>();

    let response = match cli.command {
        Commands::Get { url, query } => {
            let query = params(&query)?;
            client.get(&url, Some(&query), Some(&headers)).await?
        }
        Commands::PostJson { url, body } => {
            let body = match body.strip_prefix('@') {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read {}", path))?,
                None => body,
            };
            client.post_json(&url, &body, Some(&headers)).await?
        }
        Commands::PostForm { url, fields } => {
            client.post_form(&url, &params(&fields)?, Some(&headers)).await?
        }
        Commands::Upload { url, files, fields } => {
            let mut multipart = Multipart::new().fields(params(&fields)?);
            for file in &files {
                let (field, path) = split_pair(file, '=', "file")?;
                multipart = multipart.file(field, FileSource::from_path(path));
            }
            client.post_multipart(&url, multipart, None, Some(&headers)).await?
        }
    };

    print_response(&response, &options)
}
