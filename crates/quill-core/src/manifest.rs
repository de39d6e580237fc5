//! The contract manifest: the JSON side-car describing the ABI,
//! permissions, and declared standards.
//!
//! Field names and nesting are a fixed external contract consumed by the
//! deploying runtime; serde struct order gives deterministic output.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::metadata::{PermissionContract, PermissionMethods, Trusts};

/// A list that may instead be the wildcard sentinel `"*"`.
///
/// Serializes as the string `"*"` for the wildcard and as a JSON array
/// otherwise; the wildcard is distinct from an explicit empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardList {
    Wildcard,
    List(Vec<String>),
}

impl Serialize for WildcardList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WildcardList::Wildcard => serializer.serialize_str("*"),
            WildcardList::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for WildcardList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WildcardVisitor;

        impl<'de> Visitor<'de> for WildcardVisitor {
            type Value = WildcardList;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("\"*\" or a list of strings")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<WildcardList, E> {
                if value == "*" {
                    Ok(WildcardList::Wildcard)
                } else {
                    Err(E::custom("expected the wildcard \"*\""))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WildcardList, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element::<String>()? {
                    items.push(item);
                }
                Ok(WildcardList::List(items))
            }
        }

        deserializer.deserialize_any(WildcardVisitor)
    }
}

/// One ABI method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
}

/// One ABI method entry. Order matches code-generator assignment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbiMethod {
    pub name: String,
    pub parameters: Vec<AbiParameter>,
    pub returntype: String,
    /// Bytecode offset of the method entry point.
    pub offset: u32,
    /// Declared read-only.
    pub safe: bool,
}

/// One ABI event entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbiEvent {
    pub name: String,
    pub parameters: Vec<AbiParameter>,
}

/// The contract's callable interface.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Abi {
    pub methods: Vec<AbiMethod>,
    pub events: Vec<AbiEvent>,
}

/// A manifest group entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestGroup {
    pub pubkey: String,
    pub signature: String,
}

/// One manifest permission entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPermission {
    /// `"*"`, a contract hash, or a group public key.
    pub contract: String,
    pub methods: WildcardList,
}

/// The complete manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub groups: Vec<ManifestGroup>,
    /// Reserved; always an empty object today.
    pub features: Map<String, JsonValue>,
    pub supportedstandards: Vec<String>,
    pub abi: Abi,
    pub permissions: Vec<ManifestPermission>,
    pub trusts: WildcardList,
    pub extra: JsonValue,
}

impl Manifest {
    /// Serialize to the canonical JSON text written to disk.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&PermissionContract> for String {
    fn from(contract: &PermissionContract) -> String {
        match contract {
            PermissionContract::Wildcard => "*".to_string(),
            PermissionContract::Hash(hash) => hash.clone(),
            PermissionContract::Group(key) => key.clone(),
        }
    }
}

impl From<&PermissionMethods> for WildcardList {
    fn from(methods: &PermissionMethods) -> WildcardList {
        match methods {
            PermissionMethods::Wildcard => WildcardList::Wildcard,
            PermissionMethods::List(items) => WildcardList::List(items.clone()),
        }
    }
}

impl From<&Trusts> for WildcardList {
    fn from(trusts: &Trusts) -> WildcardList {
        match trusts {
            Trusts::None => WildcardList::List(Vec::new()),
            Trusts::Wildcard => WildcardList::Wildcard,
            Trusts::List(items) => WildcardList::List(items.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_serializes_as_star() {
        let json = serde_json::to_string(&WildcardList::Wildcard).unwrap();
        assert_eq!(json, "\"*\"");
        let back: WildcardList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WildcardList::Wildcard);
    }

    #[test]
    fn empty_list_is_not_wildcard() {
        let json = serde_json::to_string(&WildcardList::List(Vec::new())).unwrap();
        assert_eq!(json, "[]");
        let back: WildcardList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WildcardList::List(Vec::new()));
    }

    #[test]
    fn manifest_field_names_are_fixed() {
        let manifest = Manifest {
            name: "token".to_string(),
            groups: Vec::new(),
            features: Map::new(),
            supportedstandards: vec!["NEP-17".to_string()],
            abi: Abi::default(),
            permissions: vec![ManifestPermission {
                contract: "*".to_string(),
                methods: WildcardList::Wildcard,
            }],
            trusts: WildcardList::List(Vec::new()),
            extra: JsonValue::Null,
        };
        let json = manifest.to_json().unwrap();
        for field in [
            "\"name\"",
            "\"groups\"",
            "\"features\"",
            "\"supportedstandards\"",
            "\"abi\"",
            "\"methods\"",
            "\"events\"",
            "\"permissions\"",
            "\"trusts\"",
            "\"extra\"",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn abi_parameter_uses_type_key() {
        let param = AbiParameter {
            name: "amount".to_string(),
            param_type: "Integer".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&param).unwrap(),
            "{\"name\":\"amount\",\"type\":\"Integer\"}"
        );
    }
}
