use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use telegram_admaker::{
    ADS_PORTAL, Config, DEFAULT_BATCH_SIZE, DEFAULT_PATTERN, Target, build_client,
    dedup_usernames, extract_usernames, pace, run, search_target_with_client,
    write_resolved_to_csv,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Scan an HTML snapshot and print the usernames found in it
    Extract {
        #[arg(short, long)]
        input: String,
        #[arg(short, long, default_value = DEFAULT_PATTERN)]
        pattern: String,
    },
    /// Resolve extracted usernames to platform ids and write them to a CSV
    Resolve {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        output: String,
        #[arg(long, default_value = "channel")]
        target: Target,
        #[arg(long)]
        hash: String,
        #[arg(long)]
        cookie: String,
        #[arg(long, default_value_t = 0.0)]
        delay: f64,
        #[arg(long, default_value = DEFAULT_PATTERN)]
        pattern: String,
        #[arg(long, default_value = ADS_PORTAL, hide = true)]
        api_base: String,
        #[arg(long)]
        dedup: bool,
    },
    /// Full pipeline: extract, resolve, then submit ad drafts in batches
    Run {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long, default_value = "channel")]
        target: Target,
        #[arg(long)]
        hash: String,
        #[arg(long)]
        cookie: String,
        #[arg(long)]
        owner_id: String,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        #[arg(long, default_value_t = 0.0)]
        delay: f64,
        #[arg(long, default_value = DEFAULT_PATTERN)]
        pattern: String,
        #[arg(long, default_value = ADS_PORTAL, hide = true)]
        api_base: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        promote_url: String,
        #[arg(long, default_value = "")]
        ad_info: String,
        #[arg(long)]
        dedup: bool,
        #[arg(long)]
        draft_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if !Path::new("output").exists() {
        std::fs::create_dir("output")?;
    }

    match cli.mode {
        Mode::Extract { input, pattern } => {
            let content = std::fs::read_to_string(&input)?;
            let usernames = extract_usernames(&content, &pattern)?;

            println!("{} usernames found", usernames.len());
            for username in &usernames {
                println!("{username}");
            }
        }
        Mode::Resolve {
            input,
            output,
            target,
            hash,
            cookie,
            delay,
            pattern,
            api_base,
            dedup,
        } => {
            let config = Config {
                target,
                api_base,
                hash,
                cookie,
                rate_limit_delay: delay,
                pattern,
                dedup,
                ..Config::default()
            };

            let content = std::fs::read_to_string(&input)?;
            let mut usernames = extract_usernames(&content, &config.pattern)?;
            if config.dedup {
                usernames = dedup_usernames(usernames);
            }
            println!("{} usernames found", usernames.len());

            let client = build_client().await?;

            let pb = ProgressBar::new(usernames.len() as u64);
            pb.set_style(ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?
                .progress_chars("##-"));

            let mut resolved = Vec::new();
            for username in &usernames {
                pb.set_message(format!("Resolving: {username}"));

                match search_target_with_client(&client, &config, username).await {
                    Ok(response) => {
                        if let Some(id) = response.target_id(config.target) {
                            resolved.push((username.clone(), id));
                        } else {
                            tracing::warn!(
                                "could not resolve {username}: {}",
                                response.error.as_deref().unwrap_or("not found")
                            );
                        }
                    }
                    Err(_) => {
                        // Skip failed requests
                    }
                }

                pace(config.rate_limit_delay).await;
                pb.inc(1);
            }

            pb.finish_with_message("Resolution complete");

            if !resolved.is_empty() {
                let output_path = format!("output/{}", output);
                write_resolved_to_csv(&resolved, &output_path)?;
                println!("You can see the output in: {}", output_path);
            } else {
                println!("Sorry, none of the usernames could be resolved");
            }
        }
        Mode::Run {
            input,
            output,
            target,
            hash,
            cookie,
            owner_id,
            batch_size,
            delay,
            pattern,
            api_base,
            title,
            text,
            promote_url,
            ad_info,
            dedup,
            draft_only,
        } => {
            let config = Config {
                target,
                api_base,
                hash,
                cookie,
                owner_id,
                batch_size,
                rate_limit_delay: delay,
                pattern,
                title,
                text,
                promote_url,
                ad_info,
                dedup,
                draft_only,
            };

            let client = build_client().await?;
            let output_path = output.map(|name| format!("output/{name}"));

            match run(&client, &config, &input, output_path.as_deref()).await {
                Ok(report) => {
                    println!(
                        "{} usernames found, {} resolved",
                        report.usernames_found, report.ids_resolved
                    );
                    println!(
                        "{} batches submitted, {} failed",
                        report.batches_submitted, report.batches_failed
                    );
                    if let Some(path) = output_path {
                        println!("You can see the resolved ids in: {}", path);
                    }
                }
                Err(e) => {
                    tracing::error!("an error occurred: {e}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
