//! Fetches one listing page and prints what the extractors see on it.
//!
//! Usage: probe_listing <url> [--browser] [--save <file>]

use anyhow::{bail, Result};
use std::fs;

use listing_monitor::config::Config;
use listing_monitor::extractors::{BrowserExtractor, ListingExtractor};
use listing_monitor::parsers::{extract_listing, normalize_price};
use listing_monitor::utils::http::{create_client, fetch_markup};

struct Args {
    url: String,
    browser: bool,
    save: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut url = None;
    let mut browser = false;
    let mut save = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--browser" => browser = true,
            "--save" => match args.next() {
                Some(path) => save = Some(path),
                None => bail!("--save needs a file name"),
            },
            _ if url.is_none() => url = Some(arg),
            other => bail!("unexpected argument '{}'", other),
        }
    }

    match url {
        Some(url) => Ok(Args { url, browser, save }),
        None => bail!("usage: probe_listing <url> [--browser] [--save <file>]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let config = Config::load()?;

    if args.browser {
        println!("Rendering {} in the browser...", args.url);
        let mut extractor = BrowserExtractor::new(config.browser.clone(), config.user_agent.clone());
        let result = extractor.extract(&args.url).await;
        extractor.shutdown().await;

        let extraction = result?;
        println!("Title:   {}", extraction.title);
        println!("Reading: {:?}", extraction.reading);
        if args.save.is_some() {
            println!("--save only applies to static pages, ignored");
        }
        return Ok(());
    }

    println!("Fetching {}...", args.url);
    let client = create_client(&config)?;
    let markup = fetch_markup(&client, &args.url, config.http_timeout(), &config.http_retry()).await?;
    println!("Got {} bytes", markup.len());

    if let Some(path) = &args.save {
        fs::write(path, &markup)?;
        println!("Markup saved to {}", path);
    }

    let fields = extract_listing(&markup, &config.listing);
    println!("Title:   '{}'", fields.title);
    println!("Company: '{}'", fields.company);
    println!("Price:   '{}' -> {}", fields.price_raw, normalize_price(&fields.price_raw));

    for (name, value, query) in [
        ("title", &fields.title, &config.listing.title),
        ("price", &fields.price_raw, &config.listing.price),
        ("company", &fields.company, &config.listing.company),
    ] {
        if value.is_empty() {
            println!("Selector for {} matched nothing: {}", name, query);
        }
    }

    Ok(())
}
