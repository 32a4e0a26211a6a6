//! Entity command implementation.

use super::{Format, Services};
use serde_json::json;

/// Runs the entity command: prints the entity and its path.
pub async fn run(
    services: &Services,
    id: &str,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let entity = services.entities.get(id).await?;
    let path = services.entities.path(&entity).await?;

    match format {
        Format::Json => {
            let output = json!({ "entity": entity, "path": path });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Format::Text => {
            println!("Entity: {}", entity.uuid);
            println!("  Name:    {}", entity.name);
            println!("  Type:    {}", entity.entity_type);
            println!("  Path:    {path}");
            if let Some(parent) = &entity.parent {
                println!("  Parent:  {parent}");
            }
            for (key, value) in &entity.attributes {
                println!("  {key}: {value}");
            }
        }
    }
    Ok(())
}
