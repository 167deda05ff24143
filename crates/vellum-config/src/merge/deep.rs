use super::{ConfigLayer, FieldSources};

/// Deep-merge `overlay` into `base`, recording which layer set each leaf
/// field. `prefix` is the dotted path prefix (e.g. `"retention"`) and `layer`
/// identifies where the overlay came from.
///
/// - Tables merge recursively per-field.
/// - Scalars and arrays from the overlay **replace** the base value, so a
///   layer that lists `retention.rules` replaces the whole rule set.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };

                if let Some(base_val) = base_table.get_mut(key) {
                    if overlay_val.is_table() {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    } else {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    }
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_all_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Walk a value tree and record all leaf paths with their source layer.
pub(crate) fn record_all_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            record_all_leaves(child, &path, layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_overlay_replaces_scalars_and_keeps_siblings() {
        let mut base = parse("[query]\nmax_limit = 1000\naudit_cross_tenant = true\n");
        let overlay = parse("[query]\nmax_limit = 50\n");
        let mut sources = FieldSources::new();

        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::User, &mut sources);

        assert_eq!(base["query"]["max_limit"].as_integer(), Some(50));
        assert_eq!(base["query"]["audit_cross_tenant"].as_bool(), Some(true));
        assert_eq!(sources.get("query.max_limit"), Some(&ConfigLayer::User));
        assert!(!sources.contains_key("query.audit_cross_tenant"));
    }

    #[test]
    fn test_overlay_arrays_replace_wholesale() {
        let mut base = parse(
            "[[retention.rules]]\nprefix = \"auth\"\nperiod = \"2y\"\n\
             [[retention.rules]]\nprefix = \"billing\"\nperiod = \"10y\"\n",
        );
        let overlay = parse("[[retention.rules]]\nprefix = \"hr\"\nperiod = \"5y\"\n");
        let mut sources = FieldSources::new();

        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::System, &mut sources);

        let rules = base["retention"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0]["prefix"].as_str(), Some("hr"));
        assert_eq!(sources.get("retention.rules"), Some(&ConfigLayer::System));
    }

    #[test]
    fn test_new_tables_record_every_leaf() {
        let mut base = parse("[query]\nmax_limit = 1\n");
        let overlay = parse("[storage]\nbackend = \"surrealkv\"\npath = \"/var/lib/vellum\"\n");
        let mut sources = FieldSources::new();

        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::Explicit, &mut sources);

        assert_eq!(sources.get("storage.backend"), Some(&ConfigLayer::Explicit));
        assert_eq!(sources.get("storage.path"), Some(&ConfigLayer::Explicit));
    }
}
