//! Persistent path trie.
//!
//! [`ImmutableTree`] stores optional values at arbitrary [`Path`]s. It backs
//! compound writes (values are nodes), acknowledgement sets (values are
//! flags) and the sync point hierarchy.

use livetree_snapshot::{LexicalOrder, Path, SortedMap};
use std::fmt;

/// An immutable tree with an optional value at every path.
#[derive(Clone)]
pub struct ImmutableTree<T> {
    value: Option<T>,
    children: SortedMap<String, ImmutableTree<T>, LexicalOrder>,
}

impl<T: Clone> ImmutableTree<T> {
    /// An empty tree.
    pub fn new() -> Self {
        Self {
            value: None,
            children: SortedMap::new(LexicalOrder),
        }
    }

    /// A tree holding `value` at its root.
    pub fn leaf(value: T) -> Self {
        Self {
            value: Some(value),
            children: SortedMap::new(LexicalOrder),
        }
    }

    /// Build a tree from `(path, value)` pairs.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Path, T)>,
    {
        entries
            .into_iter()
            .fold(Self::new(), |tree, (path, value)| tree.set(&path, value))
    }

    /// Value stored at the root.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Whether the tree holds no values at all.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// Direct child subtree.
    pub fn child(&self, name: &str) -> Option<&ImmutableTree<T>> {
        self.children.get(&name.to_string())
    }

    /// Direct child subtrees in key order.
    pub fn children(&self) -> impl Iterator<Item = (&String, &ImmutableTree<T>)> {
        self.children.iter()
    }

    /// Replace the root value.
    pub fn with_value(&self, value: Option<T>) -> Self {
        Self {
            value,
            children: self.children.clone(),
        }
    }

    /// Replace a direct child subtree. Empty subtrees are dropped.
    pub fn set_child(&self, name: &str, child: ImmutableTree<T>) -> Self {
        let children = if child.is_empty() {
            self.children.remove(&name.to_string())
        } else {
            self.children.insert(name.to_string(), child)
        };
        Self {
            value: self.value.clone(),
            children,
        }
    }

    /// The shallowest value on `path` (inclusive) accepted by `predicate`,
    /// with its location relative to this tree.
    pub fn find_rootmost_matching_path(
        &self,
        path: &Path,
        predicate: impl Fn(&T) -> bool,
    ) -> Option<(Path, &T)> {
        let mut tree = self;
        let mut walked: Vec<&str> = Vec::new();
        let mut remaining = path.segments().iter();
        loop {
            if let Some(value) = tree.value.as_ref().filter(|v| predicate(v)) {
                return Some((Path::from_segments(walked), value));
            }
            let front = remaining.next()?;
            tree = tree.child(front)?;
            walked.push(front);
        }
    }

    /// The shallowest value on `path` (inclusive).
    pub fn find_rootmost_value_and_path(&self, path: &Path) -> Option<(Path, &T)> {
        self.find_rootmost_matching_path(path, |_| true)
    }

    /// The subtree rooted at `path`, empty if absent.
    pub fn subtree(&self, path: &Path) -> ImmutableTree<T> {
        self.node_at(path).cloned().unwrap_or_default()
    }

    fn node_at(&self, path: &Path) -> Option<&ImmutableTree<T>> {
        path.segments()
            .iter()
            .try_fold(self, |tree, segment| tree.child(segment))
    }

    /// The value stored exactly at `path`.
    pub fn get(&self, path: &Path) -> Option<&T> {
        self.node_at(path).and_then(|tree| tree.value.as_ref())
    }

    /// Return a tree with `value` stored at `path`.
    pub fn set(&self, path: &Path, value: T) -> Self {
        match path.front() {
            None => Self {
                value: Some(value),
                children: self.children.clone(),
            },
            Some(front) => {
                let child = self.child(front).cloned().unwrap_or_default();
                self.set_child(front, child.set(&path.pop_front(), value))
            }
        }
    }

    /// Return a tree without the value at `path`. Emptied branches are pruned.
    pub fn remove(&self, path: &Path) -> Self {
        match path.front() {
            None => Self {
                value: None,
                children: self.children.clone(),
            },
            Some(front) => match self.child(front) {
                Some(child) => self.set_child(front, child.remove(&path.pop_front())),
                None => self.clone(),
            },
        }
    }

    /// Return a tree with the subtree at `path` replaced by `tree`.
    pub fn set_tree(&self, path: &Path, tree: ImmutableTree<T>) -> Self {
        match path.front() {
            None => tree,
            Some(front) => {
                let child = self.child(front).cloned().unwrap_or_default();
                self.set_child(front, child.set_tree(&path.pop_front(), tree))
            }
        }
    }

    /// Post-order fold. `f` receives the location, the value there and the
    /// folded results of every child subtree in key order.
    pub fn fold<'a, R, F>(&'a self, mut f: F) -> R
    where
        F: FnMut(&Path, Option<&'a T>, Vec<(String, R)>) -> R,
    {
        self.fold_at(&Path::root(), &mut f)
    }

    fn fold_at<'a, R, F>(&'a self, path: &Path, f: &mut F) -> R
    where
        F: FnMut(&Path, Option<&'a T>, Vec<(String, R)>) -> R,
    {
        let folded = self
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.fold_at(&path.child(name), f)))
            .collect();
        f(path, self.value.as_ref(), folded)
    }

    /// Visit values from the root down `path` (inclusive) until `f` returns
    /// something.
    pub fn find_on_path<'a, R>(
        &'a self,
        path: &Path,
        mut f: impl FnMut(&Path, &'a T) -> Option<R>,
    ) -> Option<R> {
        let mut tree = self;
        let mut walked = Path::root();
        let mut remaining = path.segments().iter();
        loop {
            if let Some(found) = tree.value.as_ref().and_then(|v| f(&walked, v)) {
                return Some(found);
            }
            let front = remaining.next()?;
            tree = tree.child(front)?;
            walked = walked.child(front);
        }
    }

    /// Visit every value strictly above `path`, root first, and return the
    /// subtree at `path`.
    pub fn foreach_on_path(&self, path: &Path, mut f: impl FnMut(&Path, &T)) -> ImmutableTree<T> {
        let mut tree = self;
        let mut walked = Path::root();
        for front in path.segments() {
            if let Some(value) = tree.value.as_ref() {
                f(&walked, value);
            }
            match tree.child(front) {
                Some(child) => tree = child,
                None => return Self::new(),
            }
            walked = walked.child(front);
        }
        tree.clone()
    }

    /// Visit every value, children before parents.
    pub fn foreach(&self, mut f: impl FnMut(&Path, &T)) {
        self.foreach_at(&Path::root(), &mut f);
    }

    fn foreach_at(&self, path: &Path, f: &mut impl FnMut(&Path, &T)) {
        for (name, child) in self.children.iter() {
            child.foreach_at(&path.child(name), f);
        }
        if let Some(value) = self.value.as_ref() {
            f(path, value);
        }
    }

    /// Visit the values stored directly on each child.
    pub fn foreach_child(&self, mut f: impl FnMut(&str, &T)) {
        for (name, child) in self.children.iter() {
            if let Some(value) = child.value.as_ref() {
                f(name, value);
            }
        }
    }
}

impl<T: Clone> Default for ImmutableTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for ImmutableTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmutableTree")
            .field("value", &self.value)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, i32)]) -> ImmutableTree<i32> {
        ImmutableTree::from_entries(entries.iter().map(|(p, v)| (Path::new(p), *v)))
    }

    #[test]
    fn test_set_get_remove() {
        let t = tree(&[("a/b", 1), ("a", 2), ("c", 3)]);
        assert_eq!(t.get(&Path::new("a/b")), Some(&1));
        assert_eq!(t.get(&Path::new("a")), Some(&2));
        assert_eq!(t.get(&Path::new("a/x")), None);

        let removed = t.remove(&Path::new("a/b"));
        assert_eq!(removed.get(&Path::new("a/b")), None);
        assert_eq!(removed.get(&Path::new("a")), Some(&2));
        assert_eq!(t.get(&Path::new("a/b")), Some(&1));
    }

    #[test]
    fn test_remove_prunes_empty_branches() {
        let t = tree(&[("a/b/c", 1)]);
        let removed = t.remove(&Path::new("a/b/c"));
        assert!(removed.is_empty());
        assert!(removed.child("a").is_none());
    }

    #[test]
    fn test_find_rootmost() {
        let t = tree(&[("a/b", 1), ("a/b/c/d", 2)]);
        let (path, value) = t.find_rootmost_value_and_path(&Path::new("a/b/c/d/e")).unwrap();
        assert_eq!(path, Path::new("a/b"));
        assert_eq!(*value, 1);
        let (path, value) = t
            .find_rootmost_matching_path(&Path::new("a/b/c/d"), |v| *v > 1)
            .unwrap();
        assert_eq!(path, Path::new("a/b/c/d"));
        assert_eq!(*value, 2);
        assert!(t.find_rootmost_value_and_path(&Path::new("a")).is_none());
    }

    #[test]
    fn test_subtree_and_set_tree() {
        let t = tree(&[("a/b", 1), ("a/c", 2)]);
        let sub = t.subtree(&Path::new("a"));
        assert_eq!(sub.get(&Path::new("c")), Some(&2));
        assert!(t.subtree(&Path::new("zz")).is_empty());

        let replaced = t.set_tree(&Path::new("a"), tree(&[("x", 9)]));
        assert_eq!(replaced.get(&Path::new("a/x")), Some(&9));
        assert_eq!(replaced.get(&Path::new("a/b")), None);
        assert!(t.set_tree(&Path::new("a"), ImmutableTree::new()).is_empty());
    }

    #[test]
    fn test_fold_sums_values() {
        let t = tree(&[("a", 1), ("a/b", 2), ("c/d", 3)]);
        let total = t.fold(|_, value, children| {
            value.copied().unwrap_or(0) + children.into_iter().map(|(_, r)| r).sum::<i32>()
        });
        assert_eq!(total, 6);
    }

    #[test]
    fn test_path_visitors() {
        let t = tree(&[("", 0), ("a", 1), ("a/b", 2), ("a/b/c", 3)]);
        let mut seen = Vec::new();
        let sub = t.foreach_on_path(&Path::new("a/b"), |p, v| seen.push((p.to_string(), *v)));
        assert_eq!(seen, vec![("/".to_string(), 0), ("/a".to_string(), 1)]);
        assert_eq!(sub.value(), Some(&2));

        let found = t.find_on_path(&Path::new("a/b/c"), |p, v| (*v >= 2).then(|| p.clone()));
        assert_eq!(found, Some(Path::new("a/b")));

        let mut order = Vec::new();
        t.foreach(|p, _| order.push(p.to_string()));
        assert_eq!(order, vec!["/a/b/c", "/a/b", "/a", "/"]);
    }

    #[test]
    fn test_foreach_child() {
        let t = tree(&[("a", 1), ("b/c", 2), ("d", 3)]);
        let mut seen = Vec::new();
        t.foreach_child(|name, v| seen.push((name.to_string(), *v)));
        assert_eq!(seen, vec![("a".to_string(), 1), ("d".to_string(), 3)]);
    }
}
