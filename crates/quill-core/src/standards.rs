//! Interface-standard definitions.
//!
//! A standard is a named set of required method and event signatures a
//! contract can declare conformance to. New standards are added to the
//! registration table below, not by subclassing anything.

/// A method a standard requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardMethod {
    pub name: &'static str,
    /// Required parameter count.
    pub params: usize,
    /// Whether the method must be declared safe (read-only).
    pub safe: bool,
}

/// An event a standard requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardEvent {
    pub name: &'static str,
    /// Required parameter count.
    pub params: usize,
}

/// A named interface standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standard {
    /// The tag contracts declare, e.g. `"NEP-17"`.
    pub tag: &'static str,
    pub methods: &'static [StandardMethod],
    pub events: &'static [StandardEvent],
}

/// The fungible-token standard.
pub const NEP_17: Standard = Standard {
    tag: "NEP-17",
    methods: &[
        StandardMethod { name: "symbol", params: 0, safe: true },
        StandardMethod { name: "decimals", params: 0, safe: true },
        StandardMethod { name: "totalSupply", params: 0, safe: true },
        StandardMethod { name: "balanceOf", params: 1, safe: true },
        StandardMethod { name: "transfer", params: 4, safe: false },
    ],
    events: &[StandardEvent { name: "Transfer", params: 3 }],
};

/// The non-fungible-token standard.
pub const NEP_11: Standard = Standard {
    tag: "NEP-11",
    methods: &[
        StandardMethod { name: "symbol", params: 0, safe: true },
        StandardMethod { name: "decimals", params: 0, safe: true },
        StandardMethod { name: "totalSupply", params: 0, safe: true },
        StandardMethod { name: "balanceOf", params: 1, safe: true },
        StandardMethod { name: "tokensOf", params: 1, safe: true },
        StandardMethod { name: "ownerOf", params: 1, safe: true },
        StandardMethod { name: "transfer", params: 3, safe: false },
    ],
    events: &[StandardEvent { name: "Transfer", params: 4 }],
};

/// All standards the compiler knows how to validate.
pub const ALL: &[Standard] = &[NEP_17, NEP_11];

/// Look up a standard by its declared tag. Unknown tags are passed through
/// to the manifest unvalidated.
pub fn by_tag(tag: &str) -> Option<&'static Standard> {
    ALL.iter().find(|s| s.tag.eq_ignore_ascii_case(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(by_tag("nep-17").map(|s| s.tag), Some("NEP-17"));
        assert_eq!(by_tag("NEP-11").map(|s| s.tag), Some("NEP-11"));
        assert!(by_tag("NEP-99").is_none());
    }

    #[test]
    fn nep17_requires_transfer() {
        let std = by_tag("NEP-17").unwrap();
        let transfer = std.methods.iter().find(|m| m.name == "transfer").unwrap();
        assert_eq!(transfer.params, 4);
        assert!(!transfer.safe);
    }
}
