use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single claim on an [`Identity`]: a type/value pair plus free-form
/// properties (e.g. `destination`, a space-separated, ordinally-compared
/// set of token kinds the claim should be emitted into).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub properties: HashMap<String, String>,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_destination(mut self, destinations: impl Into<String>) -> Self {
        self.properties
            .insert("destination".to_string(), destinations.into());
        self
    }

    /// Ordinal membership test against the claim's space-separated
    /// `destination` property. A claim with no `destination` property is
    /// considered destined everywhere.
    pub fn has_destination(&self, destination: &str) -> bool {
        match self.properties.get("destination") {
            Some(list) => list.split(' ').any(|d| d == destination),
            None => true,
        }
    }
}

/// A single identity: a flat set of claims, plus an optional nested *actor*
/// identity representing who is acting on this identity's behalf.
///
/// The actor chain is a linked list, not a cycle (`SPEC_FULL.md` §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub claims: Vec<Claim>,
    pub actor: Option<Box<Identity>>,
}

impl Identity {
    pub fn new(claims: Vec<Claim>) -> Self {
        Self { claims, actor: None }
    }

    pub fn with_actor(mut self, actor: Identity) -> Self {
        self.actor = Some(Box::new(actor));
        self
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Recursively clones this identity (and its actor chain), retaining
    /// only claims for which `filter` returns `true`.
    fn clone_filtered(&self, filter: &dyn Fn(&Claim) -> bool) -> Identity {
        Identity {
            claims: self.claims.iter().filter(|c| filter(c)).cloned().collect(),
            actor: self
                .actor
                .as_ref()
                .map(|actor| Box::new(actor.clone_filtered(filter))),
        }
    }
}

/// One or more [`Identity`] values carried by a [`Ticket`](super::Ticket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub identities: Vec<Identity>,
}

impl Principal {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    pub fn primary(&self) -> Option<&Identity> {
        self.identities.first()
    }

    pub fn subject(&self) -> Option<&str> {
        self.primary().and_then(|id| id.find_first("sub"))
    }

    /// Produces an independent principal: mutating the returned value never
    /// observes through to `self`, and the filter is applied transitively
    /// through every identity's actor chain (`SPEC_FULL.md` §3 invariant 6).
    pub fn clone_with_filter(&self, filter: impl Fn(&Claim) -> bool) -> Principal {
        Principal {
            identities: self
                .identities
                .iter()
                .map(|id| id.clone_filtered(&filter))
                .collect(),
        }
    }
}
