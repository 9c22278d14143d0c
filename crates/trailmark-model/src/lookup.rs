//! Name lookup and completion for command surfaces.

use crate::path::Path;

/// First path whose name matches `name` case-insensitively, searching
/// `primary` before `secondary`.
pub fn find_by_name<'a, P, S>(primary: P, secondary: S, name: &str) -> Option<&'a Path>
where
    P: IntoIterator<Item = &'a Path>,
    S: IntoIterator<Item = &'a Path>,
{
    let wanted = name.trim();
    if wanted.is_empty() {
        return None;
    }
    primary
        .into_iter()
        .find(|p| p.name().eq_ignore_ascii_case(wanted))
        .or_else(|| {
            secondary
                .into_iter()
                .find(|p| p.name().eq_ignore_ascii_case(wanted))
        })
}

/// Names starting with `prefix` (case-insensitive), de-duplicated
/// case-insensitively, in input order, at most `limit` of them.
pub fn suggest_names<'a, I>(names: I, prefix: &str, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = prefix.trim().to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for name in names {
        if out.len() >= limit {
            break;
        }
        let lower = name.to_lowercase();
        if !lower.starts_with(&prefix) || seen.contains(&lower) {
            continue;
        }
        seen.push(lower);
        out.push(name.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ActorId;

    fn named(name: &str) -> Path {
        Path::new(Some(name), ActorId::new(), "owner", "overworld")
    }

    #[test]
    fn test_find_prefers_primary() {
        let primary = vec![named("Home"), named("Mine")];
        let secondary = vec![named("mine"), named("Farm")];

        let hit = find_by_name(&primary, &secondary, "MINE").unwrap();
        assert_eq!(hit.id(), primary[1].id());

        let hit = find_by_name(&primary, &secondary, "farm").unwrap();
        assert_eq!(hit.id(), secondary[1].id());

        assert!(find_by_name(&primary, &secondary, "nether").is_none());
        assert!(find_by_name(&primary, &secondary, "  ").is_none());
    }

    #[test]
    fn test_suggest_dedups_and_bounds() {
        let names = ["Mine", "mine", "Mill", "Home", "Market"];
        assert_eq!(
            suggest_names(names.iter().copied(), "m", 10),
            vec!["Mine", "Mill", "Market"]
        );
        assert_eq!(suggest_names(names.iter().copied(), "M", 2), vec!["Mine", "Mill"]);
        assert_eq!(suggest_names(names.iter().copied(), "", 1), vec!["Mine"]);
        assert!(suggest_names(names.iter().copied(), "x", 10).is_empty());
    }
}
