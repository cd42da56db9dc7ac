use anyhow::Result;
use courier_core::routing::RouteRegistry;

use crate::demo;

/// One line per route, in the order requests try them
fn table(registry: &RouteRegistry) -> Vec<String> {
    registry
        .routes()
        .iter()
        .enumerate()
        .map(|(index, route)| format!("{:>2}. {}", index + 1, route.describe()))
        .collect()
}

/// Print the demo route table.
pub fn run() -> Result<()> {
    let registry = demo::registry()?;
    println!("{} routes:", registry.len());
    for line in table(&registry) {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_follows_priority_order() {
        let registry = demo::registry().unwrap();
        let lines = table(&registry);
        assert_eq!(lines.len(), registry.len());
        assert!(lines[0].starts_with(" 1. "));
        // the constrained test route outranks the generic item route
        let test_route = lines.iter().position(|l| l.contains("/api/test/")).unwrap();
        let item_route = lines.iter().position(|l| l.contains("/api/items/")).unwrap();
        assert!(test_route < item_route);
    }
}
