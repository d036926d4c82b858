//! ---
//! hsim_section: "02-scenario-configuration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Common-fragment merging over YAML values."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use serde_yaml::{Mapping, Value};

/// Merge a `common` fragment into a copy of a scenario override.
///
/// The rules operate key by key from `common` into the override, over the
/// closed set of value kinds that scenario files use:
///
/// * key absent in the override: deep-copied from common;
/// * both values sequences: concatenated with the common elements first, so
///   override arguments read last on the resulting command line;
/// * both values strings: joined with a single space, common first
///   (`"x"` + `"y"` -> `"x y"`);
/// * both values mappings: merged recursively per named sub-entry;
/// * anything else (scalars, type mismatches): the override wins and the
///   common value is discarded.
pub fn merge_values(common: &Value, scenario: &Value) -> Value {
    match (common, scenario) {
        (Value::Mapping(common_map), Value::Mapping(scenario_map)) => {
            Value::Mapping(merge_mappings(common_map, scenario_map))
        }
        (Value::Sequence(common_seq), Value::Sequence(scenario_seq)) => {
            let mut merged = common_seq.clone();
            merged.extend(scenario_seq.iter().cloned());
            Value::Sequence(merged)
        }
        (Value::String(common_str), Value::String(scenario_str)) => {
            Value::String(format!("{} {}", common_str, scenario_str))
        }
        _ => scenario.clone(),
    }
}

fn merge_mappings(common: &Mapping, scenario: &Mapping) -> Mapping {
    let mut merged = Mapping::new();
    for (key, scenario_value) in scenario {
        let value = match common.get(key) {
            Some(common_value) => merge_values(common_value, scenario_value),
            None => scenario_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    // Sub-entries present only in the common fragment are added after the
    // override's own keys, preserving each side's declaration order.
    for (key, common_value) in common {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), common_value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).expect("valid yaml")
    }

    #[test]
    fn empty_common_is_identity() {
        let common = Value::Mapping(Mapping::new());
        let scenario = yaml("extra_args: [\"-DCONF_FILE=other.conf\"]\ntags: bluetooth");
        assert_eq!(merge_values(&common, &scenario), scenario);
    }

    #[test]
    fn sequences_concatenate_common_first() {
        let common = yaml("extra_args: [\"a\"]");
        let scenario = yaml("extra_args: [\"b\"]");
        let merged = merge_values(&common, &scenario);
        assert_eq!(merged, yaml("extra_args: [\"a\", \"b\"]"));
    }

    #[test]
    fn strings_join_with_single_space() {
        let common = yaml("tags: x");
        let scenario = yaml("tags: y");
        assert_eq!(merge_values(&common, &scenario), yaml("tags: x y"));
    }

    #[test]
    fn missing_keys_are_copied_from_common() {
        let common = yaml("tags: bluetooth\nextra_args: [\"a\"]");
        let scenario = yaml("platform_allow: nrf52_bsim");
        let merged = merge_values(&common, &scenario);
        let map = merged.as_mapping().expect("mapping");
        assert_eq!(map.get("tags"), Some(&yaml_scalar("bluetooth")));
        assert_eq!(map.get("platform_allow"), Some(&yaml_scalar("nrf52_bsim")));
        assert_eq!(map.get("extra_args"), Some(&yaml("[\"a\"]")));
    }

    #[test]
    fn nested_mappings_merge_per_sub_entry() {
        let common = yaml(
            "sim:\n  devices:\n    central:\n      extra_run_args: [\"-rs=23\"]\n    observer: {}",
        );
        let scenario = yaml(
            "sim:\n  devices:\n    central:\n      extra_run_args: [\"-argstest\"]\n    peripheral: {}",
        );
        let merged = merge_values(&common, &scenario);
        let devices = merged["sim"]["devices"].as_mapping().expect("devices map");
        // Sub-entry in both: sequences inside merged common-first.
        assert_eq!(
            devices.get("central"),
            Some(&yaml("extra_run_args: [\"-rs=23\", \"-argstest\"]"))
        );
        // Only in override: untouched. Only in common: added.
        assert!(devices.contains_key("peripheral"));
        assert!(devices.contains_key("observer"));
    }

    #[test]
    fn scalar_mismatch_lets_override_win() {
        let common = yaml("timeout: 30");
        let scenario = yaml("timeout: 60");
        assert_eq!(merge_values(&common, &scenario), yaml("timeout: 60"));

        let common = yaml("tags: [\"a\"]");
        let scenario = yaml("tags: b");
        assert_eq!(merge_values(&common, &scenario), yaml("tags: b"));
    }

    fn yaml_scalar(text: &str) -> Value {
        Value::String(text.to_owned())
    }
}
