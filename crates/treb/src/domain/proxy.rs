//! Proxy-relationship graph.
//!
//! Represented as `map<address, ProxyRelationship>` rather than owning
//! pointers between deployments: proxy/implementation references can form
//! cycles, which a tree of owned pointers cannot express, so relationships
//! cross-reference by address and are resolved at query time.

use {alloy_primitives::Address, std::collections::HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProxyKind {
    Minimal,
    Uups,
    Transparent,
    Beacon,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProxyRelationship {
    pub proxy: Address,
    pub implementation: Address,
    pub kind: ProxyKind,
    pub admin: Option<Address>,
    pub beacon: Option<Address>,
}

#[derive(Debug, Default, Clone)]
pub struct ProxyGraph {
    relationships: HashMap<Address, ProxyRelationship>,
}

impl ProxyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, proxy: &Address) -> Option<&ProxyRelationship> {
        self.relationships.get(proxy)
    }

    pub fn into_map(self) -> HashMap<Address, ProxyRelationship> {
        self.relationships
    }

    /// `Upgraded(proxy, implementation)`: first occurrence creates a UUPS
    /// relationship; a later occurrence on an already-Transparent or
    /// already-Beacon proxy only updates the implementation, preserving the
    /// promoted kind.
    pub fn upgraded(&mut self, proxy: Address, implementation: Address) {
        self.relationships
            .entry(proxy)
            .and_modify(|r| r.implementation = implementation)
            .or_insert(ProxyRelationship {
                proxy,
                implementation,
                kind: ProxyKind::Uups,
                admin: None,
                beacon: None,
            });
    }

    /// `AdminChanged(proxy, prev, new)`: promotes a UUPS proxy to
    /// Transparent. If the proxy has not been seen yet (admin set before any
    /// `Upgraded`), a placeholder relationship is created so the admin is
    /// not lost.
    pub fn admin_changed(&mut self, proxy: Address, new_admin: Address) {
        self.relationships
            .entry(proxy)
            .and_modify(|r| {
                r.kind = ProxyKind::Transparent;
                r.admin = Some(new_admin);
            })
            .or_insert(ProxyRelationship {
                proxy,
                implementation: Address::ZERO,
                kind: ProxyKind::Transparent,
                admin: Some(new_admin),
                beacon: None,
            });
    }

    /// `BeaconUpgraded(proxy, beacon)`: sets the proxy's kind to Beacon.
    pub fn beacon_upgraded(&mut self, proxy: Address, beacon: Address) {
        self.relationships
            .entry(proxy)
            .and_modify(|r| {
                r.kind = ProxyKind::Beacon;
                r.beacon = Some(beacon);
            })
            .or_insert(ProxyRelationship {
                proxy,
                implementation: Address::ZERO,
                kind: ProxyKind::Beacon,
                admin: None,
                beacon: Some(beacon),
            });
    }

    /// No address may appear as its own implementation via any chain of
    /// `Upgraded` events, i.e. following `implementation` pointers from any
    /// proxy never returns to that proxy.
    pub fn is_acyclic(&self) -> bool {
        for start in self.relationships.keys() {
            let mut seen = std::collections::HashSet::new();
            let mut current = *start;
            loop {
                if !seen.insert(current) {
                    return false;
                }
                match self.relationships.get(&current) {
                    Some(rel) if rel.implementation != Address::ZERO => {
                        if rel.implementation == *start {
                            return false;
                        }
                        current = rel.implementation;
                    }
                    _ => break,
                }
            }
        }
        true
    }
}
