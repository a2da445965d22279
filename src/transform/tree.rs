//! Transform hierarchy built during scene traversal.
//!
//! Groups open a level with [`TransformTree::push`]; the returned
//! [`TransformScope`] closes it when dropped, so an early `?` return inside
//! a group leaves the stack as it was. Leaves register their own transform
//! under the current level. Nodes whose whole chain is static cache their
//! world matrix once at creation.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use super::Transform;
use crate::util::{Error, Mat4, Result};

/// Index of a node in a [`TransformTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformNodeId(u32);

impl TransformNodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct Node {
    parent: Option<TransformNodeId>,
    transform: Arc<dyn Transform>,
    /// World matrix when the node and all its ancestors are static.
    cached: Option<Mat4>,
}

#[derive(Clone, Copy)]
struct Frame {
    node: Option<TransformNodeId>,
    is_static: bool,
}

const ROOT: Frame = Frame {
    node: None,
    is_static: true,
};

/// Closes a group level on drop.
#[must_use = "the group level closes when the scope is dropped"]
pub struct TransformScope {
    stack: Arc<Mutex<Vec<Frame>>>,
    depth: usize,
}

impl TransformScope {
    /// Close the level now.
    pub fn pop(self) {}
}

impl Drop for TransformScope {
    fn drop(&mut self) {
        self.stack.lock().truncate(self.depth);
    }
}

impl fmt::Debug for TransformScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformScope").field("depth", &self.depth).finish()
    }
}

/// Node arena plus the open-group stack.
pub struct TransformTree {
    nodes: Vec<Node>,
    // Shared with open scopes. Update workers read the tree concurrently, so it must stay Sync.
    stack: Arc<Mutex<Vec<Frame>>>,
}

impl Default for TransformTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            stack: Arc::new(Mutex::new(vec![ROOT])),
        }
    }

    fn top(&self) -> Frame {
        self.stack.lock().last().copied().unwrap_or(ROOT)
    }

    /// Open groups.
    pub fn depth(&self) -> usize {
        self.stack.lock().len().saturating_sub(1)
    }

    /// Number of nodes created.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node under the current level, or the current level itself when the
    /// transform is absent or the identity.
    fn attach(&mut self, transform: Option<&Arc<dyn Transform>>) -> Frame {
        let top = self.top();
        let Some(transform) = transform.filter(|t| !t.is_identity()) else {
            return top;
        };
        let is_static = top.is_static && transform.is_static();
        let cached = is_static.then(|| {
            let parent = top.node.map_or(Mat4::IDENTITY, |p| self.nodes[p.index()].cached.unwrap_or(Mat4::IDENTITY));
            parent * transform.matrix(0.0)
        });
        let id = TransformNodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: top.node,
            transform: transform.clone(),
            cached,
        });
        Frame {
            node: Some(id),
            is_static,
        }
    }

    /// Open a group level with `transform`.
    pub fn push(&mut self, transform: Option<&Arc<dyn Transform>>) -> TransformScope {
        let frame = self.attach(transform);
        let mut stack = self.stack.lock();
        let depth = stack.len();
        stack.push(frame);
        TransformScope {
            stack: self.stack.clone(),
            depth,
        }
    }

    /// Register a leaf transform. Returns its node (`None` means identity
    /// all the way up) and whether the whole chain is static.
    pub fn leaf(&mut self, transform: Option<&Arc<dyn Transform>>) -> (Option<TransformNodeId>, bool) {
        let frame = self.attach(transform);
        (frame.node, frame.is_static)
    }

    /// World matrix of `node` at `time`.
    pub fn matrix(&self, node: Option<TransformNodeId>, time: f32) -> Result<Mat4> {
        let Some(node) = node else {
            return Ok(Mat4::IDENTITY);
        };
        // Walk up to the first cached ancestor, then compose downwards.
        let mut chain: SmallVec<[TransformNodeId; 8]> = SmallVec::new();
        let mut base = Mat4::IDENTITY;
        let mut current = Some(node);
        while let Some(id) = current {
            let n = self.nodes.get(id.index()).ok_or_else(|| {
                Error::TransformStack(format!("unknown transform node {}", id.index()))
            })?;
            if let Some(cached) = n.cached {
                base = cached;
                break;
            }
            chain.push(id);
            current = n.parent;
        }
        Ok(chain
            .iter()
            .rev()
            .fold(base, |m, id| m * self.nodes[id.index()].transform.matrix(time)))
    }
}

impl fmt::Debug for TransformTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformTree")
            .field("nodes", &self.nodes.len())
            .field("depth", &self.depth())
            .finish()
    }
}

/// A dynamic transform node driving one accel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstancedTransform {
    pub node: TransformNodeId,
    pub instance_id: usize,
}

impl InstancedTransform {
    pub fn matrix(&self, tree: &TransformTree, time: f32) -> Result<Mat4> {
        tree.matrix(Some(self.node), time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{KeyframeTransform, MatrixTransform, SrtTransform};
    use crate::util::Vec3;

    fn translate(x: f32) -> Arc<dyn Transform> {
        Arc::new(MatrixTransform::new(Mat4::from_translation(Vec3::new(x, 0.0, 0.0))))
    }

    fn moving() -> Arc<dyn Transform> {
        Arc::new(KeyframeTransform::new(vec![
            (0.0, SrtTransform::default()),
            (1.0, SrtTransform::from_translation(Vec3::new(0.0, 4.0, 0.0))),
        ]))
    }

    #[test]
    fn test_static_chain_is_cached() {
        let mut tree = TransformTree::new();
        let group = tree.push(Some(&translate(1.0)));
        let (node, is_static) = tree.leaf(Some(&translate(2.0)));
        group.pop();
        assert!(is_static);
        let m = tree.matrix(node, 0.0).unwrap();
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_identity_creates_no_node() {
        let mut tree = TransformTree::new();
        let identity: Arc<dyn Transform> = Arc::new(SrtTransform::default());
        let _scope = tree.push(Some(&identity));
        assert_eq!(tree.leaf(None), (None, true));
        assert_eq!(tree.leaf(Some(&identity)), (None, true));
        assert!(tree.is_empty());
        assert_eq!(tree.matrix(None, 3.0).unwrap(), Mat4::IDENTITY);
    }

    #[test]
    fn test_dynamic_ancestor_makes_leaf_dynamic() {
        let mut tree = TransformTree::new();
        let _outer = tree.push(Some(&translate(1.0)));
        let _inner = tree.push(Some(&moving()));
        let (node, is_static) = tree.leaf(Some(&translate(2.0)));
        assert!(!is_static);
        let at = |t| tree.matrix(node, t).unwrap().transform_point3(Vec3::ZERO);
        assert_eq!(at(0.0), Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(at(0.5), Vec3::new(3.0, 2.0, 0.0));
    }

    #[test]
    fn test_tree_is_shareable_across_workers() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransformTree>();
        assert_send_sync::<TransformScope>();
    }

    #[test]
    fn test_scope_unwinds_on_error() {
        fn visit(tree: &mut TransformTree, fail: bool) -> Result<()> {
            let _scope = tree.push(Some(&translate(1.0)));
            let _nested = tree.push(Some(&translate(1.0)));
            if fail {
                return Err(Error::other("child failed"));
            }
            Ok(())
        }
        let mut tree = TransformTree::new();
        assert!(visit(&mut tree, true).is_err());
        assert_eq!(tree.depth(), 0);
        let (node, _) = tree.leaf(None);
        assert_eq!(node, None);
        visit(&mut tree, false).unwrap();
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_instanced_transform() {
        let mut tree = TransformTree::new();
        let (node, is_static) = tree.leaf(Some(&moving()));
        assert!(!is_static);
        let inst = InstancedTransform {
            node: node.unwrap(),
            instance_id: 3,
        };
        assert_eq!(
            inst.matrix(&tree, 1.0).unwrap().transform_point3(Vec3::ZERO),
            Vec3::new(0.0, 4.0, 0.0)
        );
    }
}
