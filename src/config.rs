use serde::Deserialize;

use crate::error::Error;

/// Options for both compilation stages.
///
/// Every field has a default, so a partial JSON object is enough:
///
/// ```json
/// { "dump_ir": true, "static_introspection": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log the IR text before and after each rewritten function (debug level).
    pub dump_ir: bool,
    /// Allow the rewrite to open sources at compile time to recover dataset types.
    pub static_introspection: bool,
    pub target_triple: String,
    pub data_layout: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dump_ir: false,
            static_introspection: true,
            target_triple: "x86_64-unknown-linux-gnu".to_owned(),
            data_layout: "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128"
                .to_owned(),
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = Config::from_json(r#"{ "dump_ir": true }"#).unwrap();
        assert!(cfg.dump_ir);
        assert!(cfg.static_introspection);
        assert_eq!(cfg.target_triple, Config::default().target_triple);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_json(r#"{ "dumpir": true }"#).unwrap_err();
        assert_eq!(err.diagnostic_code(), "E0600");
    }
}
