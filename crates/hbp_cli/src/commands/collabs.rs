//! Collabs command implementation.

use super::{load_pages, Format, Services};
use hbp_client::CollabQuery;

/// Runs the collabs command.
pub async fn run(
    services: &Services,
    mine: bool,
    search: Option<String>,
    pages: usize,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let collabs = if mine {
        services.collabs.mine(search.as_deref()).await?
    } else {
        let mut query = CollabQuery::new();
        if let Some(search) = search {
            query = query.with_search(search);
        }
        services.collabs.list(&query).await?
    };
    load_pages(&collabs, pages).await?;

    let count = collabs.count();
    let collabs = collabs.into_results();
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&collabs)?),
        Format::Text => {
            for collab in &collabs {
                let id = collab.id.map(|id| id.to_string()).unwrap_or_default();
                println!("{id}\t{}", collab.title);
            }
            println!("{} of {count} collabs", collabs.len());
        }
    }
    Ok(())
}
