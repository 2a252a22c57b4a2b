//! Chain resolution and planning.
//!
//! A [`Chain`] is built once from an injected list of revisions. It is pure:
//! nothing here reads files or touches a schema store.

use std::collections::{BTreeMap, HashMap};

use crate::error::ChainError;
use crate::models::{Direction, Plan, Revision, RevisionId, Target};

/// Revisions in root-to-head order.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    revisions: Vec<Revision>,
    index: HashMap<RevisionId, usize>,
}

impl Chain {
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn root(&self) -> Option<&Revision> {
        self.revisions.first()
    }

    pub fn head(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    pub fn get(&self, id: &RevisionId) -> Option<&Revision> {
        self.index.get(id).map(|&i| &self.revisions[i])
    }

    pub fn contains(&self, id: &RevisionId) -> bool {
        self.index.contains_key(id)
    }

    /// Position of a marker: 0 is base, `i + 1` is "revision `i` applied".
    pub fn position(&self, marker: Option<&RevisionId>) -> Result<usize, ChainError> {
        match marker {
            None => Ok(0),
            Some(id) => self
                .index
                .get(id)
                .map(|&i| i + 1)
                .ok_or_else(|| ChainError::UnknownMarker { marker: id.clone() }),
        }
    }

    fn marker_at(&self, position: usize) -> Option<RevisionId> {
        position
            .checked_sub(1)
            .map(|i| self.revisions[i].id.clone())
    }

    /// Revisions not yet applied when the store sits at `marker`.
    pub fn pending(&self, marker: Option<&RevisionId>) -> Result<&[Revision], ChainError> {
        let position = self.position(marker)?;
        Ok(&self.revisions[position..])
    }

    /// Resolve a target to a marker position, relative to `current`.
    pub fn resolve_target(&self, current: usize, target: &Target) -> Result<usize, ChainError> {
        match target {
            Target::Head => Ok(self.revisions.len()),
            Target::Base => Ok(0),
            Target::Root => {
                if self.revisions.is_empty() {
                    Err(ChainError::UnknownTarget {
                        target: target.to_string(),
                    })
                } else {
                    Ok(1)
                }
            }
            Target::Relative(steps) => {
                match (current as i64).checked_add(*steps) {
                    Some(position) if (0..=self.revisions.len() as i64).contains(&position) => {
                        Ok(position as usize)
                    }
                    _ => Err(ChainError::UnknownTarget {
                        target: target.to_string(),
                    }),
                }
            }
            Target::Revision(id) => self.resolve_id(id).map(|i| i + 1),
        }
    }

    fn resolve_id(&self, id: &str) -> Result<usize, ChainError> {
        if let Some(&i) = self.index.get(&RevisionId::from(id)) {
            return Ok(i);
        }
        if id.is_empty() {
            return Err(ChainError::UnknownTarget {
                target: String::new(),
            });
        }

        let candidates: Vec<usize> = self
            .revisions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.id.as_str().starts_with(id))
            .map(|(i, _)| i)
            .collect();

        match candidates.as_slice() {
            [i] => Ok(*i),
            [] => Err(ChainError::UnknownTarget {
                target: id.to_string(),
            }),
            many => Err(ChainError::AmbiguousTarget {
                target: id.to_string(),
                candidates: many.iter().map(|&i| self.revisions[i].id.clone()).collect(),
            }),
        }
    }
}

/// Resolve an unordered collection of revisions into a single linear chain.
pub fn resolve_chain(revisions: Vec<Revision>) -> Result<Chain, ChainError> {
    let mut by_id: HashMap<RevisionId, usize> = HashMap::with_capacity(revisions.len());
    for (i, revision) in revisions.iter().enumerate() {
        if by_id.insert(revision.id.clone(), i).is_some() {
            return Err(ChainError::DuplicateId {
                id: revision.id.clone(),
            });
        }
    }

    for revision in &revisions {
        if let Some(parent) = &revision.parent_id {
            if !by_id.contains_key(parent) {
                return Err(ChainError::DanglingParent {
                    revision: revision.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    let mut roots: Vec<RevisionId> = revisions
        .iter()
        .filter(|r| r.is_root())
        .map(|r| r.id.clone())
        .collect();
    if roots.len() > 1 {
        roots.sort();
        return Err(ChainError::MultipleRoots { roots });
    }

    // BTreeMap keeps error reporting deterministic.
    let mut children: BTreeMap<&RevisionId, Vec<&RevisionId>> = BTreeMap::new();
    for revision in &revisions {
        if let Some(parent) = &revision.parent_id {
            children.entry(parent).or_default().push(&revision.id);
        }
    }
    if let Some((parent, kids)) = children.iter().find(|(_, kids)| kids.len() > 1) {
        let mut kids: Vec<RevisionId> = kids.iter().map(|&id| id.clone()).collect();
        kids.sort();
        return Err(ChainError::MultipleChildren {
            parent: (*parent).clone(),
            children: kids,
        });
    }

    let limit = revisions.len();
    for revision in &revisions {
        let mut cursor = revision;
        let mut steps = 0;
        while let Some(parent) = &cursor.parent_id {
            steps += 1;
            if steps > limit {
                return Err(ChainError::Cycle {
                    revision: revision.id.clone(),
                });
            }
            cursor = &revisions[by_id[parent]];
        }
    }

    // Every revision reaches the root and no revision has two children, so
    // walking child links from the root visits each revision exactly once.
    let child_of: HashMap<&RevisionId, &RevisionId> = children
        .iter()
        .map(|(parent, kids)| (*parent, kids[0]))
        .collect();

    let mut order = Vec::with_capacity(limit);
    let mut next = roots.first().cloned();
    while let Some(id) = next {
        next = child_of.get(&id).map(|&child| child.clone());
        order.push(by_id[&id]);
    }

    let mut slots: Vec<Option<Revision>> = revisions.into_iter().map(Some).collect();
    let ordered: Vec<Revision> = order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect();
    let index = ordered
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();

    tracing::debug!(revisions = ordered.len(), "resolved revision chain");

    Ok(Chain {
        revisions: ordered,
        index,
    })
}

/// Compute the steps that move the marker from `current` to `target`.
pub fn plan(
    current: Option<&RevisionId>,
    target: &Target,
    chain: &Chain,
) -> Result<Plan, ChainError> {
    let from = chain.position(current)?;
    let to = chain.resolve_target(from, target)?;

    let (direction, steps) = if to > from {
        (Direction::Upgrade, chain.revisions[from..to].to_vec())
    } else {
        let mut steps = chain.revisions[to..from].to_vec();
        steps.reverse();
        (Direction::Downgrade, steps)
    };

    let direction = if steps.is_empty() {
        Direction::Upgrade
    } else {
        direction
    };

    Ok(Plan {
        direction,
        from: chain.marker_at(from),
        to: chain.marker_at(to),
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(id: &str, parent: Option<&str>) -> Revision {
        Revision::new(id, parent.map(RevisionId::from))
    }

    fn ids(revisions: &[Revision]) -> Vec<&str> {
        revisions.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn orders_shuffled_input_root_to_head() {
        let chain = resolve_chain(vec![
            rev("c", Some("b")),
            rev("a", None),
            rev("d", Some("c")),
            rev("b", Some("a")),
        ])
        .unwrap();

        assert_eq!(ids(chain.revisions()), vec!["a", "b", "c", "d"]);
        assert_eq!(chain.root().unwrap().id.as_str(), "a");
        assert_eq!(chain.head().unwrap().id.as_str(), "d");
    }

    #[test]
    fn empty_collection_is_an_empty_chain() {
        let chain = resolve_chain(Vec::new()).unwrap();
        assert!(chain.is_empty());
        assert!(chain.head().is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = resolve_chain(vec![rev("a", None), rev("a", None)]).unwrap_err();
        assert_eq!(err, ChainError::DuplicateId { id: "a".into() });
    }

    #[test]
    fn rejects_dangling_parent() {
        let err = resolve_chain(vec![rev("a", None), rev("b", Some("zz"))]).unwrap_err();
        assert_eq!(
            err,
            ChainError::DanglingParent {
                revision: "b".into(),
                parent: "zz".into(),
            }
        );
    }

    #[test]
    fn rootless_collection_is_a_cycle() {
        let err = resolve_chain(vec![rev("a", Some("b")), rev("b", Some("a"))]).unwrap_err();
        assert!(matches!(err, ChainError::Cycle { .. }));
    }

    #[test]
    fn detached_loop_beside_a_root_is_a_cycle() {
        let err = resolve_chain(vec![
            rev("root", None),
            rev("x", Some("y")),
            rev("y", Some("x")),
        ])
        .unwrap_err();
        assert!(matches!(err, ChainError::Cycle { .. }));
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let err = resolve_chain(vec![rev("root", None), rev("x", Some("x"))]).unwrap_err();
        assert_eq!(err, ChainError::Cycle { revision: "x".into() });
    }

    #[test]
    fn unknown_marker_is_reported() {
        let chain = resolve_chain(vec![rev("a", None)]).unwrap();
        let err = plan(Some(&"gone".into()), &Target::Head, &chain).unwrap_err();
        assert_eq!(err, ChainError::UnknownMarker { marker: "gone".into() });
    }

    #[test]
    fn resolves_unique_prefix_and_rejects_ambiguous_one() {
        let chain = resolve_chain(vec![
            rev("ab12", None),
            rev("ab34", Some("ab12")),
            rev("cd56", Some("ab34")),
        ])
        .unwrap();

        let p = plan(None, &Target::Revision("cd".into()), &chain).unwrap();
        assert_eq!(ids(&p.steps), vec!["ab12", "ab34", "cd56"]);

        let err = plan(None, &Target::Revision("ab".into()), &chain).unwrap_err();
        assert_eq!(
            err,
            ChainError::AmbiguousTarget {
                target: "ab".into(),
                candidates: vec!["ab12".into(), "ab34".into()],
            }
        );
    }

    #[test]
    fn relative_targets_move_from_current_marker() {
        let chain =
            resolve_chain(vec![rev("a", None), rev("b", Some("a")), rev("c", Some("b"))]).unwrap();

        let up = plan(Some(&"a".into()), &Target::Relative(1), &chain).unwrap();
        assert_eq!(up.direction, Direction::Upgrade);
        assert_eq!(ids(&up.steps), vec!["b"]);

        let down = plan(Some(&"c".into()), &Target::Relative(-2), &chain).unwrap();
        assert_eq!(down.direction, Direction::Downgrade);
        assert_eq!(ids(&down.steps), vec!["c", "b"]);
        assert_eq!(down.to, Some("a".into()));

        let err = plan(Some(&"c".into()), &Target::Relative(1), &chain).unwrap_err();
        assert!(matches!(err, ChainError::UnknownTarget { .. }));
    }

    #[test]
    fn root_alias_targets_first_revision() {
        let chain = resolve_chain(vec![rev("a", None), rev("b", Some("a"))]).unwrap();
        let p = plan(Some(&"b".into()), &Target::Root, &chain).unwrap();
        assert_eq!(p.direction, Direction::Downgrade);
        assert_eq!(ids(&p.steps), vec!["b"]);
        assert_eq!(p.to, Some("a".into()));
    }

    #[test]
    fn relative_targets_at_integer_extremes_are_unknown() {
        let chain = resolve_chain(vec![rev("a", None), rev("b", Some("a"))]).unwrap();

        for steps in [i64::MAX, i64::MIN] {
            let err = plan(Some(&"a".into()), &Target::Relative(steps), &chain).unwrap_err();
            assert!(matches!(err, ChainError::UnknownTarget { .. }));
        }
    }

    #[test]
    fn head_of_empty_chain_is_a_no_op() {
        let chain = resolve_chain(Vec::new()).unwrap();
        let p = plan(None, &Target::Head, &chain).unwrap();
        assert!(p.is_empty());
        assert!(plan(None, &Target::Root, &chain).is_err());
    }
}
