use std::collections::HashMap;
use std::hash::Hash;

/// One-to-one map that can be queried from either side.
///
/// The channel keeps one per role: proxied routes, stubbed objects and owner
/// contexts. Inserting a pair evicts any older pair sharing either key, so the
/// two directions never disagree.
#[derive(Debug, Clone)]
pub struct IdentityMap<L, R> {
    forward: HashMap<L, R>,
    reverse: HashMap<R, L>,
}

impl<L, R> Default for IdentityMap<L, R> {
    fn default() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }
}

impl<L, R> IdentityMap<L, R>
where
    L: Copy + Eq + Hash,
    R: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, left: L, right: R) {
        if let Some(old_right) = self.forward.insert(left, right) {
            self.reverse.remove(&old_right);
        }
        if let Some(old_left) = self.reverse.insert(right, left) {
            if old_left != left {
                self.forward.remove(&old_left);
            }
        }
    }

    pub fn right(&self, left: &L) -> Option<R> {
        self.forward.get(left).copied()
    }

    pub fn left(&self, right: &R) -> Option<L> {
        self.reverse.get(right).copied()
    }

    pub fn remove_left(&mut self, left: &L) -> Option<R> {
        let right = self.forward.remove(left)?;
        self.reverse.remove(&right);
        Some(right)
    }

    pub fn remove_right(&mut self, right: &R) -> Option<L> {
        let left = self.reverse.remove(right)?;
        self.forward.remove(&left);
        Some(left)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (L, R)> + '_ {
        self.forward.iter().map(|(l, r)| (*l, *r))
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }
}
