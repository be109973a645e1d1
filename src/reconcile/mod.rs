//! Per-asset decisions comparing the remote payload with local copies.
//!
//! Decisions are recomputed from scratch every run and never stored. The
//! only evidence used is the asset id (which local copy to compare) and the
//! size declared in the payload; no network request is made here.
//!
//! Declared image sizes are known to drift between runs because the source
//! re-encodes covers. A drift still yields [`DecisionKind::FetchReplace`]:
//! re-fetching a thumbnail is cheaper than missing a real content change.

use std::fmt;

use crate::layout::sanitize_segment;
use crate::local::{LocalCopy, LocalState};
use crate::model::Asset;

/// Outcome of comparing one asset with its local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// Local copy is current; nothing is written.
    Skip,
    /// No local copy exists for this asset id.
    FetchNew,
    /// A local copy exists but its size differs from the declared size.
    FetchReplace,
}

impl DecisionKind {
    /// Returns true if the asset has to be downloaded.
    #[must_use]
    pub fn is_fetch(self) -> bool {
        !matches!(self, Self::Skip)
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Skip => "skip",
            Self::FetchNew => "fetch-new",
            Self::FetchReplace => "fetch-replace",
        };
        write!(f, "{label}")
    }
}

/// Decision for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The asset the decision is about.
    pub asset: Asset,
    /// What to do.
    pub kind: DecisionKind,
    /// Local copy the decision was based on, if any.
    pub local: Option<LocalCopy>,
    /// Short explanation for logs.
    pub reason: String,
}

/// Decides what to do with each asset, preserving input order.
#[must_use]
pub fn decide(assets: &[Asset], local: &LocalState) -> Vec<Decision> {
    assets
        .iter()
        .map(|asset| decide_one(asset, local))
        .collect()
}

fn decide_one(asset: &Asset, local: &LocalState) -> Decision {
    let key = sanitize_segment(&asset.id).unwrap_or_else(|_| asset.id.clone());
    let Some(copy) = local.get(&key) else {
        return Decision {
            asset: asset.clone(),
            kind: DecisionKind::FetchNew,
            local: None,
            reason: "no local copy".to_string(),
        };
    };

    let (kind, reason) = match asset.declared_size {
        Some(declared) if declared == copy.size => (
            DecisionKind::Skip,
            format!("local size {declared} matches declared size"),
        ),
        Some(declared) => (
            DecisionKind::FetchReplace,
            format!("local size {} differs from declared size {declared}", copy.size),
        ),
        None if copy.size > 0 => (
            DecisionKind::Skip,
            "no declared size; keeping non-empty local copy".to_string(),
        ),
        None => (
            DecisionKind::FetchReplace,
            "no declared size and local copy is empty".to_string(),
        ),
    };

    Decision {
        asset: asset.clone(),
        kind,
        local: Some(copy.clone()),
        reason,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::{AssetKind, AssetScope};

    fn file(id: &str, name: &str, size: u64) -> Asset {
        Asset {
            id: id.to_string(),
            kind: AssetKind::File,
            file_name: name.to_string(),
            declared_size: Some(size),
            url: None,
            scope: AssetScope::InScope,
        }
    }

    fn image(id: &str) -> Asset {
        Asset {
            declared_size: None,
            kind: AssetKind::Image,
            ..file(id, &format!("{id}.png"), 0)
        }
    }

    fn local(entries: &[(&str, &str, u64)]) -> LocalState {
        entries
            .iter()
            .map(|(id, name, size)| {
                (
                    (*id).to_string(),
                    LocalCopy {
                        file_name: (*name).to_string(),
                        size: *size,
                        path: PathBuf::from(id).join(name),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_decide_fetch_new_without_local_copy() {
        let decisions = decide(&[file("7", "model.fbx", 1000)], &LocalState::new());
        assert_eq!(decisions[0].kind, DecisionKind::FetchNew);
        assert!(decisions[0].local.is_none());
    }

    #[test]
    fn test_decide_skip_when_sizes_match() {
        let decisions = decide(
            &[file("7", "model.fbx", 1000)],
            &local(&[("7", "model.fbx", 1000)]),
        );
        assert_eq!(decisions[0].kind, DecisionKind::Skip);
    }

    #[test]
    fn test_decide_fetch_replace_when_sizes_differ() {
        let decisions = decide(
            &[file("7", "model.fbx", 1200)],
            &local(&[("7", "model.fbx", 1000)]),
        );
        assert_eq!(decisions[0].kind, DecisionKind::FetchReplace);
        assert!(decisions[0].reason.contains("1200"));
    }

    #[test]
    fn test_decide_matches_by_id_not_name() {
        let assets = [file("7", "tex.png", 10), file("9", "tex.png", 20)];
        let decisions = decide(&assets, &local(&[("7", "tex.png", 10)]));
        assert_eq!(decisions[0].kind, DecisionKind::Skip);
        assert_eq!(decisions[1].kind, DecisionKind::FetchNew);
    }

    #[test]
    fn test_decide_renamed_asset_with_same_size_is_skipped() {
        let decisions = decide(&[file("7", "model-v2.fbx", 1000)], &local(&[("7", "model.fbx", 1000)]));
        assert_eq!(decisions[0].kind, DecisionKind::Skip);
    }

    #[test]
    fn test_decide_image_without_declared_size() {
        let assets = [image("c1"), image("c2"), image("c3")];
        let decisions = decide(&assets, &local(&[("c1", "c1.png", 512), ("c2", "c2.png", 0)]));
        let kinds: Vec<DecisionKind> = decisions.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DecisionKind::Skip, DecisionKind::FetchReplace, DecisionKind::FetchNew]
        );
    }

    #[test]
    fn test_decide_preserves_input_order() {
        let assets = [file("3", "c", 1), file("1", "a", 1), file("2", "b", 1)];
        let ids: Vec<String> = decide(&assets, &LocalState::new())
            .into_iter()
            .map(|d| d.asset.id)
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_decide_is_idempotent_after_sync() {
        let assets = [file("7", "model.fbx", 1000), file("9", "tex.png", 64)];
        let first = decide(&assets, &LocalState::new());
        assert!(first.iter().all(|d| d.kind == DecisionKind::FetchNew));

        let synced = local(&[("7", "model.fbx", 1000), ("9", "tex.png", 64)]);
        let second = decide(&assets, &synced);
        assert!(second.iter().all(|d| d.kind == DecisionKind::Skip));
    }

    #[test]
    fn test_decision_kind_labels() {
        assert_eq!(DecisionKind::Skip.to_string(), "skip");
        assert_eq!(DecisionKind::FetchNew.to_string(), "fetch-new");
        assert_eq!(DecisionKind::FetchReplace.to_string(), "fetch-replace");
        assert!(DecisionKind::FetchNew.is_fetch());
        assert!(!DecisionKind::Skip.is_fetch());
    }
}
