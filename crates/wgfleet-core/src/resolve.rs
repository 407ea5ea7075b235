// ── Handle resolution ──
//
// Callers name resources loosely (a public key, `*1a`, `1A`, a comment);
// the device wants its exact handle. Resolution is a pure function over
// a fresh listing, trying strategies from strictest to loosest.

use crate::model::{Peer, ResourceHandle, Route, WgInterface};

/// One resource from a fresh listing with every string it answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleCandidate {
    pub handle: ResourceHandle,
    pub identifiers: Vec<String>,
}

impl HandleCandidate {
    pub fn new(handle: ResourceHandle, identifiers: Vec<String>) -> Self {
        Self {
            handle,
            identifiers,
        }
    }

    fn with_fields(handle: Option<&ResourceHandle>, fields: &[Option<&str>]) -> Option<Self> {
        let handle = handle?.clone();
        let mut identifiers = vec![handle.as_str().to_owned()];
        identifiers.extend(
            fields
                .iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .map(|s| (*s).to_owned()),
        );
        Some(Self::new(handle, identifiers))
    }

    /// Handle, public key, name and comment.
    pub fn for_peer(peer: &Peer) -> Option<Self> {
        Self::with_fields(
            peer.handle.as_ref(),
            &[
                Some(peer.public_key.as_str()),
                peer.name.as_deref(),
                peer.comment.as_deref(),
            ],
        )
    }

    /// Handle and name.
    pub fn for_interface(iface: &WgInterface) -> Option<Self> {
        Self::with_fields(iface.handle.as_ref(), &[Some(iface.name.as_str())])
    }

    /// Handle, destination and comment.
    pub fn for_route(route: &Route) -> Option<Self> {
        Self::with_fields(
            route.handle.as_ref(),
            &[Some(route.dst_address.as_str()), route.comment.as_deref()],
        )
    }
}

/// How a wanted identifier is compared against a known one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    CaseInsensitive,
    /// Handles print as `*1A` but often travel without the `*`.
    PrefixStripped,
}

impl MatchStrategy {
    /// Strictest first.
    pub const ORDER: [Self; 3] = [Self::Exact, Self::CaseInsensitive, Self::PrefixStripped];

    pub fn matches(self, wanted: &str, known: &str) -> bool {
        match self {
            Self::Exact => wanted == known,
            Self::CaseInsensitive => wanted.eq_ignore_ascii_case(known),
            Self::PrefixStripped => {
                let wanted = strip_handle_prefix(wanted);
                !wanted.is_empty() && wanted.eq_ignore_ascii_case(strip_handle_prefix(known))
            }
        }
    }
}

fn strip_handle_prefix(raw: &str) -> &str {
    raw.trim().trim_start_matches('*')
}

/// Resolve the first of `candidates` that any strategy can match.
///
/// Strategies run in [`MatchStrategy::ORDER`]; within one strategy the
/// candidates are tried in order, so an exact match on a later candidate
/// beats a case-insensitive match on an earlier one.
pub fn resolve_handle(candidates: &[String], known: &[HandleCandidate]) -> Option<ResourceHandle> {
    MatchStrategy::ORDER.iter().find_map(|strategy| {
        candidates.iter().find_map(|wanted| {
            known
                .iter()
                .find(|k| k.identifiers.iter().any(|id| strategy.matches(wanted, id)))
                .map(|k| k.handle.clone())
        })
    })
}
