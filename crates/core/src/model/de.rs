//! Lenient deserializers for flags the backend sends as `0`/`1`.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Null(()),
}

/// Accepts `true`/`false`, integers (non-zero is true) and `null` (false).
///
/// # Errors
///
/// Returns the deserializer's error for any other JSON type.
pub fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
        Flag::Null(()) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "bool_or_int")]
        flag: bool,
    }

    #[test]
    fn accepts_bools_ints_and_null() {
        let parse = |json: &str| serde_json::from_str::<Probe>(json).unwrap().flag;
        assert!(parse(r#"{"flag":true}"#));
        assert!(parse(r#"{"flag":1}"#));
        assert!(!parse(r#"{"flag":0}"#));
        assert!(!parse(r#"{"flag":null}"#));
        assert!(!parse("{}"));
        assert!(serde_json::from_str::<Probe>(r#"{"flag":"yes"}"#).is_err());
    }
}
