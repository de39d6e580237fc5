//! Contract-level metadata accumulated during analysis.
//!
//! The type analyser interprets the `@metadata` function and records its
//! declarations here; the standard analyser and the file generator read
//! the result. The value lives in the compilation context and is reset at
//! the start of every top-level compilation, so no global state exists.

use serde_json::Value as JsonValue;

/// The callee side of a permission declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionContract {
    /// Any contract.
    Wildcard,
    /// A specific contract script hash (hex, `0x`-prefixed).
    Hash(String),
    /// A group public key (hex-encoded compressed point).
    Group(String),
}

/// The methods a permission entry allows calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionMethods {
    /// Any method. Distinct from an empty list, which allows nothing.
    Wildcard,
    /// Specific method names.
    List(Vec<String>),
}

impl PermissionMethods {
    /// Merge another declaration into this one.
    ///
    /// Most permissive wins: a wildcard absorbs any list and is never
    /// narrowed by a later specific declaration. List merges are
    /// idempotent.
    pub fn merge(&mut self, other: PermissionMethods) {
        match (&mut *self, other) {
            (PermissionMethods::Wildcard, _) => {}
            (_, PermissionMethods::Wildcard) => *self = PermissionMethods::Wildcard,
            (PermissionMethods::List(mine), PermissionMethods::List(theirs)) => {
                for method in theirs {
                    if !mine.contains(&method) {
                        mine.push(method);
                    }
                }
            }
        }
    }
}

/// One permission entry: a callee target plus allowed methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub contract: PermissionContract,
    pub methods: PermissionMethods,
}

/// The trusted-contracts declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Trusts {
    /// No trust declared; serializes as an empty list.
    #[default]
    None,
    /// Every contract is trusted.
    Wildcard,
    /// Specific contract hashes.
    List(Vec<String>),
}

/// A manifest group: public key plus signature over the contract hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub pubkey: String,
    pub signature: String,
}

/// Everything the contract declares about itself.
///
/// Mutated incrementally while the type analyser visits metadata
/// declarations; read once by the standard analyser and the file
/// generator; never mutated after code generation begins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractMetadata {
    /// Contract name; defaults to the entry file's stem when unset.
    pub name: Option<String>,
    pub author: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    /// Declared standard tags, e.g. `"NEP-17"`.
    pub supported_standards: Vec<String>,
    pub permissions: Vec<Permission>,
    pub trusts: Trusts,
    pub groups: Vec<Group>,
    /// Free-form key/value entries surfaced in the manifest's `extra`.
    pub extras: Vec<(String, JsonValue)>,
}

impl ContractMetadata {
    /// Fresh metadata for a new compilation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the initial state. Called by the façade before each
    /// top-level compilation.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Declare a supported standard tag; duplicates collapse.
    pub fn add_standard(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.supported_standards.contains(&tag) {
            self.supported_standards.push(tag);
        }
    }

    /// Declare a permission, merging with any existing entry for the same
    /// contract target (most permissive wins, wildcard absorbs specific).
    pub fn add_permission(&mut self, contract: PermissionContract, methods: PermissionMethods) {
        if let Some(existing) = self
            .permissions
            .iter_mut()
            .find(|p| p.contract == contract)
        {
            existing.methods.merge(methods);
        } else {
            self.permissions.push(Permission { contract, methods });
        }
    }

    /// Declare a trusted contract. A wildcard absorbs every specific
    /// declaration, before or after.
    pub fn add_trust(&mut self, contract: Option<String>) {
        match contract {
            None => self.trusts = Trusts::Wildcard,
            Some(hash) => match &mut self.trusts {
                Trusts::Wildcard => {}
                Trusts::List(list) => {
                    if !list.contains(&hash) {
                        list.push(hash);
                    }
                }
                Trusts::None => self.trusts = Trusts::List(vec![hash]),
            },
        }
    }

    /// Declare a manifest group.
    pub fn add_group(&mut self, pubkey: String, signature: String) {
        let group = Group { pubkey, signature };
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
    }

    /// Record an `extra` entry; a repeated key overwrites.
    pub fn set_extra(&mut self, key: String, value: JsonValue) {
        if let Some(slot) = self.extras.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.extras.push((key, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wildcard() -> PermissionContract {
        PermissionContract::Wildcard
    }

    #[test]
    fn duplicate_permission_is_idempotent() {
        let mut meta = ContractMetadata::new();
        let methods = PermissionMethods::List(vec!["m".to_string()]);
        meta.add_permission(wildcard(), methods.clone());
        meta.add_permission(wildcard(), methods);
        assert_eq!(meta.permissions.len(), 1);
        assert_eq!(
            meta.permissions[0].methods,
            PermissionMethods::List(vec!["m".to_string()])
        );
    }

    #[test]
    fn wildcard_absorbs_specific_methods() {
        let mut meta = ContractMetadata::new();
        meta.add_permission(wildcard(), PermissionMethods::List(vec!["m".to_string()]));
        meta.add_permission(wildcard(), PermissionMethods::Wildcard);
        assert_eq!(meta.permissions.len(), 1);
        assert_eq!(meta.permissions[0].methods, PermissionMethods::Wildcard);

        // A later specific declaration does not narrow the wildcard.
        meta.add_permission(wildcard(), PermissionMethods::List(vec!["n".to_string()]));
        assert_eq!(meta.permissions[0].methods, PermissionMethods::Wildcard);
    }

    #[test]
    fn distinct_targets_stay_separate() {
        let mut meta = ContractMetadata::new();
        meta.add_permission(
            PermissionContract::Hash("0xabc".to_string()),
            PermissionMethods::Wildcard,
        );
        meta.add_permission(wildcard(), PermissionMethods::Wildcard);
        assert_eq!(meta.permissions.len(), 2);
    }

    #[test]
    fn trust_wildcard_absorbs() {
        let mut meta = ContractMetadata::new();
        meta.add_trust(Some("0x01".to_string()));
        meta.add_trust(None);
        meta.add_trust(Some("0x02".to_string()));
        assert_eq!(meta.trusts, Trusts::Wildcard);
    }

    #[test]
    fn reset_clears_everything() {
        let mut meta = ContractMetadata::new();
        meta.add_standard("NEP-17");
        meta.add_permission(wildcard(), PermissionMethods::Wildcard);
        meta.reset();
        assert_eq!(meta, ContractMetadata::default());
    }
}
