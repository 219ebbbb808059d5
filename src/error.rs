use std::fmt::Write as _;

use thiserror::Error;

use crate::Site;

/// Reported when an owner is destroyed while references to it are still alive.
///
/// The amount of detail depends on the backend the owner was created with: a [`Counted`]
/// owner only knows how many references leaked while a [`Tracked`] owner can also say where
/// each of them was created.
///
/// [`Counted`]: crate::Counted
/// [`Tracked`]: crate::Tracked
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ReferableAfterFree {
    #[error("referable destroyed with {outstanding} outstanding reference(s)")]
    Counted { outstanding: usize },

    #[error(
        "referable created at {owner} destroyed with {outstanding} outstanding reference(s){}",
        format_sites(.references)
    )]
    Tracked {
        owner: Site,
        outstanding: usize,
        /// Creation sites of the outstanding references, most recent first.
        references: Vec<Site>,
    },
}

fn format_sites(sites: &[Site]) -> String {
    let mut out = String::new();

    for site in sites {
        _ = write!(out, "\n    referenced at {site}");
    }

    out
}

impl ReferableAfterFree {
    pub fn outstanding(&self) -> usize {
        match self {
            Self::Counted { outstanding } | Self::Tracked { outstanding, .. } => *outstanding,
        }
    }

    pub fn owner(&self) -> Option<Site> {
        match self {
            Self::Counted { .. } => None,
            Self::Tracked { owner, .. } => Some(*owner),
        }
    }

    pub fn references(&self) -> &[Site] {
        match self {
            Self::Counted { .. } => &[],
            Self::Tracked { references, .. } => references,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::Location;

    use super::ReferableAfterFree;

    #[test]
    fn counted_message() {
        let err = ReferableAfterFree::Counted { outstanding: 3 };

        assert_eq!(
            err.to_string(),
            "referable destroyed with 3 outstanding reference(s)"
        );
        assert_eq!(err.outstanding(), 3);
        assert!(err.owner().is_none());
        assert!(err.references().is_empty());
    }

    #[test]
    fn tracked_message_lists_sites() {
        let owner = Location::caller();
        let site = Location::caller();
        let err = ReferableAfterFree::Tracked {
            owner,
            outstanding: 1,
            references: vec![site],
        };

        let msg = err.to_string();
        assert!(msg.starts_with(&format!("referable created at {owner} destroyed with 1")));
        assert!(msg.ends_with(&format!("referenced at {site}")));
        assert_eq!(err.owner(), Some(owner));
    }
}
