// Example usage of telegram_admaker library
// This is not meant to be run against the real portal as it requires a valid
// session cookie and auth hash, but it demonstrates the API usage

use telegram_admaker::*;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Example 1: Extract usernames from an HTML snapshot
    let html = r#"<td>5-alpha">6-beta">7-bad.name"</td>"#;
    let usernames = extract_usernames(html, DEFAULT_PATTERN)?;
    println!("Extracted usernames: {:?}", usernames);

    // Example 2: Parse a search response and pull out the resolved id
    let search_response = r#"{"channel": {"id": 42, "title": "Alpha"}}"#;
    let response = parse_search_response(search_response)?;
    println!("Resolved id: {:?}", response.target_id(Target::Channel));

    // Example 3: Build a create-ad form for the first batch
    let config = Config {
        owner_id: "555".to_string(),
        title: "Campaign".to_string(),
        text: "ad body".to_string(),
        promote_url: "https://t.me/promoted".to_string(),
        ..Config::default()
    };
    let form = build_ad_form(&config, "42;43", 1);
    println!("Ad form method: {:?}", form.get("method"));
    println!("Ad form title: {:?}", form.get("title"));

    // Example 4: Write resolved pairs to CSV
    let resolved = vec![
        ("alpha".to_string(), "42".to_string()),
        ("beta".to_string(), "43".to_string()),
    ];
    write_resolved_to_csv(&resolved, "example_resolved.csv")?;
    println!("Resolved ids written to example_resolved.csv");

    Ok(())
}
