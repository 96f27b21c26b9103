//! Decoder plugin RPC payload shape.
//!
//! The original engine hands a finished playlist off to an external
//! process over a local RPC for further handling (e.g. muxing). That
//! transport and the plugin process lifecycle are both out of scope here;
//! this module documents only the JSON payload shape a caller would send.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginInvocation {
    pub file: String,
}

impl PluginInvocation {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_the_specified_shape() {
        let invocation = PluginInvocation::new("/tmp/show/index.m3u8");
        assert_eq!(
            invocation.to_json().unwrap(),
            r#"{"file":"/tmp/show/index.m3u8"}"#
        );
    }
}
