//! Maps vehicle types reported by the server onto the modules that represent them.
//!
//! A mapping string is a space separated list of `class=value` tokens:
//!
//! * `"a"` maps every class to `a`,
//! * `"a=b c=d"` maps class `a` to `b` and `c` to `d`; any other class is an error,
//! * `"a=b *=e"` maps `a` to `b` and everything else to `e`,
//! * `"a=b c=0"` creates no module for class `c`.
//!
//! Values containing `=` (display strings) are protected with single quotes,
//! e.g. `"a='i=block/process' b='i=misc/sun'"`.

use crate::error::ConfigError;
use std::collections::BTreeMap;

/// The class matching every class without an explicit entry.
pub const WILDCARD: &str = "*";

/// The module type that means "do not instantiate".
pub const SKIP_TYPE: &str = "0";

/// One parsed mapping parameter.
pub type TypeMapping = BTreeMap<String, String>;

/// The module to instantiate for a vehicle class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleChoice {
    pub type_name: String,
    pub name: String,
    pub display_string: String,
}

/// The module type, name and display string mappings, checked for consistency.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleMappings {
    types: TypeMapping,
    names: TypeMapping,
    display_strings: TypeMapping,
}

impl ModuleMappings {
    /// Parses the three mapping parameters. Type and name must map the same classes;
    /// display strings may be empty but must not map a class without a type.
    pub fn parse(types: &str, names: &str, display_strings: &str) -> Result<Self, ConfigError> {
        let types = parse_mapping(types, "moduleType", false)?;
        let names = parse_mapping(names, "moduleName", false)?;
        let display_strings = parse_mapping(display_strings, "moduleDisplayString", true)?;

        if !types.keys().eq(names.keys()) {
            return Err(ConfigError::MismatchedKeys {
                parameter: "moduleName",
            });
        }
        if display_strings.keys().any(|class| !types.contains_key(class)) {
            return Err(ConfigError::MismatchedKeys {
                parameter: "moduleDisplayString",
            });
        }

        Ok(Self {
            types,
            names,
            display_strings,
        })
    }

    /// Looks up the module for a vehicle class, falling back to the wildcard entry.
    /// Returns `None` if the class should not be instantiated.
    pub fn resolve(&self, class: &str) -> Result<Option<ModuleChoice>, ConfigError> {
        let type_name = lookup(&self.types, class, "module type")?;
        if type_name == SKIP_TYPE {
            return Ok(None);
        }
        let name = lookup(&self.names, class, "module name")?;
        let display_string = if self.display_strings.is_empty() {
            String::new()
        } else {
            lookup(&self.display_strings, class, "module display string")?.to_string()
        };
        Ok(Some(ModuleChoice {
            type_name: type_name.to_string(),
            name: name.to_string(),
            display_string,
        }))
    }
}

fn lookup<'a>(map: &'a TypeMapping, class: &str, parameter: &'static str) -> Result<&'a str, ConfigError> {
    map.get(class)
        .or_else(|| map.get(WILDCARD))
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingMapping {
            parameter,
            class: class.to_string(),
        })
}

/// Parses one mapping parameter.
pub fn parse_mapping(
    parameter: &str,
    parameter_name: &'static str,
    allow_empty: bool,
) -> Result<TypeMapping, ConfigError> {
    let tokens = parameter.split(' ').filter(|t| !t.is_empty()).collect::<Vec<_>>();
    let mut map = TypeMapping::new();

    if tokens.is_empty() {
        if allow_empty {
            return Ok(map);
        }
        return Err(ConfigError::EmptyMapping {
            parameter: parameter_name,
        });
    }

    for token in &tokens {
        let parts = split_token(token, parameter_name)?;
        match parts.as_slice() {
            [value] => {
                if tokens.len() != 1 {
                    return Err(ConfigError::UnmappedValue {
                        parameter: parameter_name,
                        value: value.clone(),
                    });
                }
                map.insert(WILDCARD.to_string(), value.clone());
            }
            [class, value] => {
                if map.contains_key(class) {
                    return Err(ConfigError::DuplicateMapping {
                        parameter: parameter_name,
                        class: class.clone(),
                    });
                }
                map.insert(class.clone(), value.clone());
            }
            _ => {
                return Err(ConfigError::InvalidMapping {
                    parameter: parameter_name,
                    token: token.to_string(),
                })
            }
        }
    }

    Ok(map)
}

/// Splits `a=b` into its parts, honouring a quoted value such as `a='x=y'`.
fn split_token(token: &str, parameter_name: &'static str) -> Result<Vec<String>, ConfigError> {
    let invalid = || ConfigError::InvalidMapping {
        parameter: parameter_name,
        token: token.to_string(),
    };

    let Some(first) = token.find('\'') else {
        return Ok(token
            .split('=')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect());
    };

    // The closing quote must end the token.
    let second = token[first + 1..].find('\'').map(|i| i + first + 1).ok_or_else(invalid)?;
    if second != token.len() - 1 {
        return Err(invalid());
    }
    let value = token[first + 1..second].to_string();

    if first == 0 {
        return Ok(vec![value]);
    }
    match token.find('=') {
        Some(eq) if eq + 1 == first => Ok(vec![token[..eq].to_string(), value]),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_value_maps_everything() {
        let map = parse_mapping("Car", "moduleType", false).unwrap();
        assert_eq!(map.get(WILDCARD).map(String::as_str), Some("Car"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn parses_classes_and_wildcard() {
        let map = parse_mapping("car=Car  bus=Bus *=0", "moduleType", false).unwrap();
        assert_eq!(map["car"], "Car");
        assert_eq!(map["bus"], "Bus");
        assert_eq!(map["*"], "0");
    }

    #[test]
    fn rejects_bad_syntax() {
        assert!(matches!(
            parse_mapping("a=b=c", "moduleType", false),
            Err(ConfigError::InvalidMapping { token, .. }) if token == "a=b=c"
        ));
        assert!(matches!(
            parse_mapping("a b=c", "moduleType", false),
            Err(ConfigError::UnmappedValue { value, .. }) if value == "a"
        ));
        assert!(matches!(
            parse_mapping("a=b a=c", "moduleType", false),
            Err(ConfigError::DuplicateMapping { class, .. }) if class == "a"
        ));
        assert!(matches!(
            parse_mapping("", "moduleType", false),
            Err(ConfigError::EmptyMapping { .. })
        ));
        assert!(parse_mapping("", "moduleDisplayString", true).unwrap().is_empty());
    }

    #[test]
    fn quoted_display_strings() {
        let map = parse_mapping("a='i=block/process' b='i=misc/sun'", "moduleDisplayString", true).unwrap();
        assert_eq!(map["a"], "i=block/process");
        assert_eq!(map["b"], "i=misc/sun");

        let map = parse_mapping("'i=veh'", "moduleDisplayString", true).unwrap();
        assert_eq!(map["*"], "i=veh");

        assert!(parse_mapping("a='x=y'z", "moduleDisplayString", true).is_err());
        assert!(parse_mapping("a-'x'", "moduleDisplayString", true).is_err());
    }

    #[test]
    fn resolves_with_fallback_and_skip() {
        let mappings = ModuleMappings::parse("car=Car bus=Bus *=0", "car=car bus=bus *=none", "").unwrap();
        let car = mappings.resolve("car").unwrap().unwrap();
        assert_eq!(car.type_name, "Car");
        assert_eq!(car.name, "car");
        assert_eq!(car.display_string, "");
        assert_eq!(mappings.resolve("bus").unwrap().unwrap().type_name, "Bus");
        assert_eq!(mappings.resolve("truck").unwrap(), None);
    }

    #[test]
    fn missing_class_without_wildcard() {
        let mappings = ModuleMappings::parse("car=Car", "car=node", "").unwrap();
        assert!(matches!(
            mappings.resolve("bus"),
            Err(ConfigError::MissingMapping { class, .. }) if class == "bus"
        ));
    }

    #[test]
    fn keys_must_agree() {
        assert!(matches!(
            ModuleMappings::parse("car=Car bus=Bus", "car=node", ""),
            Err(ConfigError::MismatchedKeys { .. })
        ));
        assert!(matches!(
            ModuleMappings::parse("car=Car", "car=node", "bus='i=x'"),
            Err(ConfigError::MismatchedKeys { .. })
        ));
    }
}
