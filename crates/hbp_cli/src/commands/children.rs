//! Children command implementation.

use super::{Format, Services};
use hbp_client::Entity;
use hbp_paging::ChildrenQuery;

/// Runs the children command.
pub async fn run(
    services: &Services,
    entity_type: &str,
    uuid: &str,
    pages: usize,
    accept: Vec<String>,
    sort: Option<String>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let parent = Entity::new(uuid, entity_type, "");
    let mut query = ChildrenQuery::new()
        .with_accept(accept)
        .with_resolve_user_id(true);
    if let Some(sort) = sort {
        query = query.with_sort(sort);
    }

    let loader = services.entities.loader(parent, query);
    loader.ready().await?;
    for _ in 1..pages {
        if !loader.has_next() {
            break;
        }
        loader.next().await?;
    }

    let children = loader.entities();
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&children)?),
        Format::Text => {
            for child in &children {
                println!(
                    "{}\t{}\t{}\t{}",
                    child.uuid,
                    child.entity_type,
                    child.name,
                    child.created_by_name.as_deref().unwrap_or("-")
                );
            }
            if loader.has_next() {
                println!("... more children available (use --pages)");
            }
        }
    }
    Ok(())
}
