//! Members command implementation.

use super::{load_pages, Format, Services};
use serde_json::Value;

/// Runs the members command. `group` is a group id or name.
pub async fn run(
    services: &Services,
    group: &str,
    pages: usize,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = if is_group_id(group) {
        group.to_string()
    } else {
        services
            .identity
            .group_by_name(group)
            .await?
            .ok_or_else(|| format!("No group named {group}"))?
            .id
    };

    let members = services.identity.group_members(&id).await?;
    load_pages(&members, pages).await?;

    let members = members.into_results();
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&members)?),
        Format::Text => {
            for member in &members {
                println!("{}\t{}", field(member, "id"), label(member));
            }
        }
    }
    Ok(())
}

/// Group ids are `S` followed by digits.
fn is_group_id(group: &str) -> bool {
    group
        .strip_prefix('S')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn field<'a>(member: &'a Value, key: &str) -> &'a str {
    member.get(key).and_then(Value::as_str).unwrap_or("")
}

fn label(member: &Value) -> &str {
    ["displayName", "name", "username"]
        .iter()
        .map(|key| field(member, key))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_ids() {
        assert!(is_group_id("S123"));
        assert!(!is_group_id("S"));
        assert!(!is_group_id("hbp-sp1"));
        assert!(!is_group_id("Staff"));
    }

    #[test]
    fn member_labels() {
        assert_eq!(label(&json!({"id": "1", "displayName": "Ada"})), "Ada");
        assert_eq!(label(&json!({"id": "1", "name": "ada"})), "ada");
        assert_eq!(label(&json!({"id": "1"})), "");
    }
}
