//! Relationship walker: recursive expansion of one entity.
//!
//! The walker substitutes every relationship reference with the target's
//! own denormalized form, folding each visited entity into a
//! [`Fingerprint`]. Cycle tracking is path-local: an entity is only "being
//! visited" while its own subtree is under construction, so the same entity
//! may legitimately appear on several disjoint branches.
//!
//! Within one walk, a finished subtree is handed out again wherever the same
//! entity is reached, as long as the current path would build it the same
//! way. A target shared by many parents is built once per walk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use denorm_core::{
    DenormalizeError, DenormalizeResult, DenormalizedEntity, DenormalizerConfig, EntityRef,
    Fingerprint, FingerprintBuilder, MissingPolicy, NotFound, Related, Relationship, StorageView,
    StoredEntity,
};
use tracing::{debug, warn};

use crate::cache::CacheStats;
use crate::resolver::resolve;

/// `(type, id)` of a stored entity, borrowed from the view.
type Key<'v> = (&'v str, &'v str);

fn key_of(entity: &StoredEntity) -> Key<'_> {
    (entity.entity_type.as_str(), entity.id.as_str())
}

/// What a finished subtree read from the path it was built under.
#[derive(Debug, Default)]
struct Scope<'v> {
    /// Entities fully expanded inside the subtree, its root included.
    expanded: HashSet<Key<'v>>,
    /// Entities stubbed because they were on the path above the subtree.
    ancestors: HashSet<Key<'v>>,
}

impl<'v> Scope<'v> {
    fn cycle(key: Key<'v>) -> Self {
        Self {
            expanded: HashSet::new(),
            ancestors: HashSet::from([key]),
        }
    }

    fn absorb(&mut self, child: &Scope<'v>) {
        self.expanded.extend(child.expanded.iter().copied());
        self.ancestors.extend(child.ancestors.iter().copied());
    }

    fn close(mut self, root: Key<'v>) -> Self {
        self.expanded.insert(root);
        let Self {
            expanded,
            ancestors,
        } = &mut self;
        ancestors.retain(|key| !expanded.contains(key));
        self
    }
}

#[derive(Debug)]
struct Finished<'v> {
    node: Node,
    scope: Rc<Scope<'v>>,
}

/// State of one walk: the entities on the current recursion path and the
/// subtrees finished so far.
#[derive(Debug, Default)]
pub struct Visiting<'v> {
    path: HashSet<Key<'v>>,
    finished: HashMap<(Key<'v>, usize), Finished<'v>>,
}

impl<'v> Visiting<'v> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an entity as being visited. Returns false if it already was.
    pub fn enter(&mut self, entity: &'v StoredEntity) -> bool {
        self.path.insert(key_of(entity))
    }

    /// Unmark an entity once its subtree is complete.
    pub fn leave(&mut self, entity: &'v StoredEntity) {
        self.path.remove(&key_of(entity));
    }

    /// Returns true when no entity is on the path.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// A finished subtree for `key` that the current path would rebuild
    /// identically: every ancestor it stubbed is still on the path, and
    /// nothing it expanded is, apart from `key` itself.
    fn reusable(&self, key: Key<'v>, depth: usize) -> Option<(Node, Rc<Scope<'v>>)> {
        let finished = self.finished.get(&(key, depth))?;
        let scope = &finished.scope;
        let ancestors_on_path = scope.ancestors.iter().all(|k| self.path.contains(k));
        let expanded_off_path = self
            .path
            .iter()
            .all(|k| *k == key || !scope.expanded.contains(k));
        (ancestors_on_path && expanded_off_path)
            .then(|| (finished.node.clone(), Rc::clone(scope)))
    }

    fn remember(&mut self, key: Key<'v>, depth: usize, node: &Node, scope: &Rc<Scope<'v>>) {
        self.finished.insert(
            (key, depth),
            Finished {
                node: node.clone(),
                scope: Rc::clone(scope),
            },
        );
    }
}

/// A built output together with what it was built from.
#[derive(Debug, Clone)]
pub struct Node {
    pub entity: Arc<DenormalizedEntity>,
    pub fingerprint: Fingerprint,
}

/// Outcome of walking a reference.
#[derive(Debug, Clone)]
pub enum Walk {
    Built(Node),
    Missing(NotFound),
}

/// Recursive builder for denormalized entities.
pub struct RelationshipWalker<'a> {
    config: &'a DenormalizerConfig,
    stats: &'a mut CacheStats,
}

impl<'a> RelationshipWalker<'a> {
    pub fn new(config: &'a DenormalizerConfig, stats: &'a mut CacheStats) -> Self {
        Self { config, stats }
    }

    /// Resolve and denormalize a reference.
    ///
    /// A reference that does not resolve is reported as [`Walk::Missing`];
    /// only a malformed relationship somewhere in the subtree is an error.
    pub fn walk<'v>(
        &mut self,
        reference: &EntityRef,
        view: &'v StorageView,
        visiting: &mut Visiting<'v>,
    ) -> DenormalizeResult<Walk> {
        match resolve(reference, view) {
            Ok(stored) => self.build(stored, view, visiting, 0).map(Walk::Built),
            Err(not_found) => Ok(Walk::Missing(not_found)),
        }
    }

    /// Denormalize an already resolved entity.
    pub fn build<'v>(
        &mut self,
        stored: &'v StoredEntity,
        view: &'v StorageView,
        visiting: &mut Visiting<'v>,
        depth: usize,
    ) -> DenormalizeResult<Node> {
        self.build_scoped(stored, view, visiting, depth)
            .map(|(node, _)| node)
    }

    fn build_scoped<'v>(
        &mut self,
        stored: &'v StoredEntity,
        view: &'v StorageView,
        visiting: &mut Visiting<'v>,
        depth: usize,
    ) -> DenormalizeResult<(Node, Rc<Scope<'v>>)> {
        if !visiting.enter(stored) {
            self.stats.cycles_short_circuited += 1;
            debug!(
                entity_type = %stored.entity_type,
                id = %stored.id,
                "cycle detected, emitting stub"
            );
            return Ok((self.stub(stored), Rc::new(Scope::cycle(key_of(stored)))));
        }

        let built = self.build_entered(stored, view, visiting, depth);
        visiting.leave(stored);
        built
    }

    fn build_entered<'v>(
        &mut self,
        stored: &'v StoredEntity,
        view: &'v StorageView,
        visiting: &mut Visiting<'v>,
        depth: usize,
    ) -> DenormalizeResult<(Node, Rc<Scope<'v>>)> {
        if self.config.max_depth.is_some_and(|limit| depth >= limit) {
            self.stats.depth_limited += 1;
            debug!(
                entity_type = %stored.entity_type,
                id = %stored.id,
                depth,
                "depth limit reached, emitting stub"
            );
            return Ok((self.stub(stored), Rc::new(Scope::default())));
        }

        // Subtrees only depend on depth when a limit can cut them.
        let key = key_of(stored);
        let memo_depth = if self.config.max_depth.is_some() { depth } else { 0 };
        if let Some(reused) = visiting.reusable(key, memo_depth) {
            self.stats.subtrees_reused += 1;
            return Ok(reused);
        }

        let (node, scope) = self.expand(stored, view, visiting, depth)?;
        let scope = Rc::new(scope.close(key));
        visiting.remember(key, memo_depth, &node, &scope);
        Ok((node, scope))
    }

    fn expand<'v>(
        &mut self,
        stored: &'v StoredEntity,
        view: &'v StorageView,
        visiting: &mut Visiting<'v>,
        depth: usize,
    ) -> DenormalizeResult<(Node, Scope<'v>)> {
        let mut fingerprint =
            FingerprintBuilder::node(&stored.entity_type, &stored.id, stored.freshness);
        let mut scope = Scope::default();
        let mut relationships = BTreeMap::new();

        for (key, relationship) in &stored.relationships {
            match relationship {
                Relationship::Single(target) => {
                    fingerprint.single(key);
                    match self.child(stored, key, target, view, visiting, depth)? {
                        Some((node, child_scope)) => {
                            fingerprint.child(&node.fingerprint);
                            scope.absorb(&child_scope);
                            relationships.insert(key.clone(), Related::One(node.entity));
                        }
                        None => {
                            fingerprint.missing(target);
                            self.fill_missing_single(key, &mut relationships);
                        }
                    }
                }
                Relationship::Many(targets) => {
                    fingerprint.many(key, targets.len());
                    let mut items = Vec::with_capacity(targets.len());
                    for target in targets {
                        match self.child(stored, key, target, view, visiting, depth)? {
                            Some((node, child_scope)) => {
                                fingerprint.child(&node.fingerprint);
                                scope.absorb(&child_scope);
                                items.push(node.entity);
                            }
                            None => fingerprint.missing(target),
                        }
                    }
                    relationships.insert(key.clone(), Related::Many(items));
                }
                Relationship::Empty => {
                    fingerprint.empty(key);
                    self.fill_missing_single(key, &mut relationships);
                }
                Relationship::Malformed(found) => {
                    return Err(DenormalizeError::MalformedRelationship {
                        entity_type: stored.entity_type.clone(),
                        id: stored.id.clone(),
                        relationship: key.clone(),
                        found: found.clone(),
                    });
                }
            }
        }

        let fingerprint = fingerprint.finish();
        let entity = DenormalizedEntity {
            id: stored.id.clone(),
            entity_type: stored.entity_type.clone(),
            attributes: stored.attributes.clone(),
            relationships,
            freshness: fingerprint.latest(),
        };
        let node = Node {
            entity: Arc::new(entity),
            fingerprint,
        };
        Ok((node, scope))
    }

    fn child<'v>(
        &mut self,
        parent: &StoredEntity,
        key: &str,
        target: &EntityRef,
        view: &'v StorageView,
        visiting: &mut Visiting<'v>,
        depth: usize,
    ) -> DenormalizeResult<Option<(Node, Rc<Scope<'v>>)>> {
        match resolve(target, view) {
            Ok(stored) => self
                .build_scoped(stored, view, visiting, depth + 1)
                .map(Some),
            Err(not_found) => {
                self.stats.missing_references += 1;
                if self.config.log_missing {
                    warn!(
                        entity_type = %parent.entity_type,
                        id = %parent.id,
                        relationship = key,
                        reference = %target,
                        reason = %not_found,
                        "relationship target not found, omitting"
                    );
                }
                Ok(None)
            }
        }
    }

    fn fill_missing_single(&self, key: &str, relationships: &mut BTreeMap<String, Related>) {
        if self.config.missing_single == MissingPolicy::Null {
            relationships.insert(key.to_string(), Related::Null);
        }
    }

    fn stub(&self, stored: &StoredEntity) -> Node {
        let attributes = if self.config.stub_attributes {
            stored.attributes.clone()
        } else {
            Default::default()
        };
        let entity = DenormalizedEntity {
            id: stored.id.clone(),
            entity_type: stored.entity_type.clone(),
            attributes,
            relationships: BTreeMap::new(),
            freshness: stored.freshness,
        };
        Node {
            entity: Arc::new(entity),
            fingerprint: FingerprintBuilder::stub(
                &stored.entity_type,
                &stored.id,
                stored.freshness,
            ),
        }
    }
}
