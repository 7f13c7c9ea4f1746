use anyhow::Result;
use fake_useragent::UserAgents;
use regex::Regex;
use reqwest::{Client, cookie::Jar, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use csv::Writer;

pub const ADS_PORTAL: &str = "https://ads.telegram.org";
pub const DEFAULT_PATTERN: &str = r#"\d+-([^">]+)"#;
pub const DEFAULT_BATCH_SIZE: usize = 100;

// Characters that never appear in a valid username; matches carrying any of
// them are markup fragments the extraction pattern picked up by accident.
const USERNAME_BLACKLIST: &str = ".\\ =@#$%^&*()+-~/\"`'[]{}|,<>!?:;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Channel,
    Bot,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Channel => "channel",
            Target::Bot => "bot",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Target::Channel => "channels",
            Target::Bot => "bots",
        }
    }

    pub fn capitalized(self) -> &'static str {
        match self {
            Target::Channel => "Channel",
            Target::Bot => "Bot",
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(Target::Channel),
            "bot" => Ok(Target::Bot),
            other => Err(format!("unknown target type: {other} (expected channel or bot)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target: Target,
    pub api_base: String,
    pub hash: String,
    pub cookie: String,
    pub owner_id: String,
    pub batch_size: usize,
    pub rate_limit_delay: f64,
    pub pattern: String,
    pub title: String,
    pub text: String,
    pub promote_url: String,
    pub ad_info: String,
    pub dedup: bool,
    pub draft_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target: Target::Channel,
            api_base: ADS_PORTAL.to_string(),
            hash: String::new(),
            cookie: String::new(),
            owner_id: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_delay: 0.0,
            pattern: DEFAULT_PATTERN.to_string(),
            title: String::new(),
            text: String::new(),
            promote_url: String::new(),
            ad_info: String::new(),
            dedup: false,
            draft_only: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FoundTarget {
    pub id: Value,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub ok: Option<bool>,
    pub error: Option<String>,
    pub channel: Option<FoundTarget>,
    pub bot: Option<FoundTarget>,
}

impl SearchResponse {
    pub fn target_id(&self, target: Target) -> Option<String> {
        let found = match target {
            Target::Channel => self.channel.as_ref(),
            Target::Bot => self.bot.as_ref(),
        }?;

        match &found.id {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdResponse {
    #[serde(default)]
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct SubmitSummary {
    pub submitted: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct RunReport {
    pub usernames_found: usize,
    pub ids_resolved: usize,
    pub batches_submitted: usize,
    pub batches_failed: usize,
}

pub fn extract_usernames(html: &str, pattern: &str) -> Result<Vec<String>> {
    let re = Regex::new(pattern)?;

    let usernames = re
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| !name.chars().any(|c| USERNAME_BLACKLIST.contains(c)))
        .collect();

    Ok(usernames)
}

pub fn dedup_usernames(usernames: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    usernames
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

pub async fn search_target(config: &Config, username: &str) -> Result<SearchResponse> {
    search_target_with_client(&build_client().await?, config, username).await
}

pub async fn search_target_with_client(
    client: &Client,
    config: &Config,
    username: &str,
) -> Result<SearchResponse> {
    let headers = build_headers(config)?;
    let url = format!("{}/api?hash={}", config.api_base, config.hash);

    let mut data = HashMap::new();
    data.insert("query", format!("@{username}"));
    data.insert("field", format!("{}s", config.target.as_str()));
    data.insert("method", format!("search{}", config.target.capitalized()));

    let response = client
        .post(&url)
        .headers(headers)
        .form(&data)
        .send()
        .await?
        .error_for_status()?;

    let text = response.text().await?;
    parse_search_response(&text)
}

pub fn parse_search_response(text: &str) -> Result<SearchResponse> {
    let parsed: SearchResponse = serde_json::from_str(text)?;
    Ok(parsed)
}

pub async fn resolve_usernames(
    client: &Client,
    config: &Config,
    usernames: &[String],
) -> Vec<(String, String)> {
    let mut resolved = Vec::new();

    for username in usernames {
        match search_target_with_client(client, config, username).await {
            Ok(response) => {
                if response.ok == Some(false) {
                    tracing::warn!(
                        "failed to process username {username}: {}",
                        response.error.as_deref().unwrap_or("unknown error")
                    );
                } else if let Some(id) = response.target_id(config.target) {
                    resolved.push((username.clone(), id));
                } else {
                    tracing::warn!("invalid response format for username {username}");
                }
            }
            Err(e) => {
                tracing::error!("error searching for {username}: {e}");
            }
        }

        pace(config.rate_limit_delay).await;
    }

    resolved
}

pub async fn pace(delay_secs: f64) {
    if delay_secs > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;
    }
}

pub fn partition_ids(ids: &[String], batch_size: usize) -> Vec<&[String]> {
    ids.chunks(batch_size.max(1)).collect()
}

pub fn batch_number(offset: usize, batch_size: usize) -> usize {
    offset / batch_size.max(1) + 1
}

pub async fn create_ad(config: &Config, ids: &str, batch_no: usize) -> Result<AdResponse> {
    create_ad_with_client(&build_client().await?, config, ids, batch_no).await
}

pub async fn create_ad_with_client(
    client: &Client,
    config: &Config,
    ids: &str,
    batch_no: usize,
) -> Result<AdResponse> {
    let headers = build_headers(config)?;
    let url = format!("{}/api?hash={}", config.api_base, config.hash);
    let data = build_ad_form(config, ids, batch_no);

    let response = client
        .post(&url)
        .headers(headers)
        .form(&data)
        .send()
        .await?
        .error_for_status()?;

    let text = response.text().await?;
    parse_ad_response(&text)
}

pub fn parse_ad_response(text: &str) -> Result<AdResponse> {
    let parsed: AdResponse = serde_json::from_str(text)?;
    Ok(parsed)
}

pub fn build_ad_form(config: &Config, ids: &str, batch_no: usize) -> HashMap<&'static str, String> {
    let mut data = HashMap::new();
    data.insert("owner_id", config.owner_id.clone());
    data.insert("title", format!("{} {batch_no}", config.title));
    data.insert("text", config.text.clone());
    data.insert("promote_url", config.promote_url.clone());
    data.insert("website_name", String::new());
    data.insert("website_photo", String::new());
    data.insert("media", String::new());
    data.insert("ad_info", config.ad_info.clone());
    data.insert("cpm", "0.1".to_string());
    data.insert("views_per_user", "1".to_string());
    data.insert("budget", "0.1".to_string());
    data.insert("daily_budget", "0".to_string());
    data.insert("active", "1".to_string());
    data.insert("target_type", config.target.plural().to_string());
    data.insert("langs", String::new());
    data.insert("topics", String::new());
    data.insert("exclude_topics", String::new());
    data.insert("exclude_channels", String::new());
    data.insert(
        "method",
        if config.draft_only { "saveAdDraft" } else { "createAd" }.to_string(),
    );

    match config.target {
        Target::Channel => data.insert("channels", ids.to_string()),
        Target::Bot => data.insert("bots", ids.to_string()),
    };

    data
}

pub async fn submit_in_batches(
    client: &Client,
    config: &Config,
    channel_ids: &[String],
) -> SubmitSummary {
    let mut summary = SubmitSummary::default();
    let mut offset = 0;

    for batch in partition_ids(channel_ids, config.batch_size) {
        let batch_no = batch_number(offset, config.batch_size);
        let joined = batch.join(";");

        tracing::info!(
            "processing batch {batch_no} ({} {})",
            batch.len(),
            config.target.plural()
        );

        match create_ad_with_client(client, config, &joined, batch_no).await {
            Ok(response) if response.ok => {
                tracing::info!("successfully created ad for batch {batch_no}");
                summary.submitted += 1;
            }
            Ok(response) => {
                tracing::error!(
                    "failed to create ad for batch {batch_no}: {}",
                    response.error.as_deref().unwrap_or("unknown error")
                );
                summary.failed += 1;
            }
            Err(e) => {
                tracing::error!("error creating ad for batch {batch_no}: {e}");
                summary.failed += 1;
            }
        }

        pace(config.rate_limit_delay).await;
        offset += batch.len();
    }

    summary
}

pub async fn run(
    client: &Client,
    config: &Config,
    html_path: &str,
    output: Option<&str>,
) -> Result<RunReport> {
    let content = std::fs::read_to_string(html_path)?;

    let mut usernames = extract_usernames(&content, &config.pattern)?;
    if config.dedup {
        usernames = dedup_usernames(usernames);
    }
    tracing::info!("usernames found: {}", usernames.len());

    let resolved = resolve_usernames(client, config, &usernames).await;
    tracing::info!("{} of {} usernames resolved", resolved.len(), usernames.len());

    if let Some(path) = output {
        write_resolved_to_csv(&resolved, path)?;
    }

    let ids: Vec<String> = resolved.iter().map(|(_, id)| id.clone()).collect();
    let summary = submit_in_batches(client, config, &ids).await;

    Ok(RunReport {
        usernames_found: usernames.len(),
        ids_resolved: ids.len(),
        batches_submitted: summary.submitted,
        batches_failed: summary.failed,
    })
}

pub fn write_resolved_to_csv(resolved: &[(String, String)], filename: &str) -> Result<()> {
    if resolved.is_empty() {
        return Ok(());
    }

    let file = File::create(filename)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(["username", "id"])?;
    for (username, id) in resolved {
        wtr.write_record([username.as_str(), id.as_str()])?;
    }

    wtr.flush()?;
    Ok(())
}

pub async fn build_client() -> Result<Client> {
    let jar = Arc::new(Jar::default());
    let client = Client::builder()
        .cookie_provider(jar)
        .build()?;
    Ok(client)
}

pub fn build_headers(config: &Config) -> Result<HeaderMap> {
    let ua = UserAgents::new();
    let user_agent = ua.random();

    let mut headers = HeaderMap::new();
    headers.insert("Accept", "application/json, text/javascript, */*; q=0.01".parse()?);
    headers.insert("Accept-Language", "en-US,en;q=0.9".parse()?);
    headers.insert(
        "Content-Type",
        "application/x-www-form-urlencoded; charset=UTF-8".parse()?,
    );
    headers.insert("Cookie", config.cookie.parse()?);
    headers.insert("Origin", ADS_PORTAL.parse()?);
    headers.insert("Referer", format!("{ADS_PORTAL}/account/ad/new").parse()?);
    headers.insert("User-Agent", user_agent.parse()?);

    Ok(headers)
}
