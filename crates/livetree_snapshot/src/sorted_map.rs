//! Persistent sorted map.
//!
//! [`SortedMap`] is a left-leaning red-black tree whose nodes are shared
//! behind [`Arc`]s. Every update copies only the nodes on the path from the
//! root to the changed entry, so older versions of a map stay valid and cheap
//! to keep around. Keys are ordered by a [`KeyComparator`] value carried by
//! the map, which lets the same key type be sorted by different rules (for
//! example children sorted by name and children sorted by priority).

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A total order over keys of type `K`.
pub trait KeyComparator<K>: Clone {
    /// Compare two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders strings by their natural byte order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexicalOrder;

impl KeyComparator<String> for LexicalOrder {
    fn compare(&self, a: &String, b: &String) -> Ordering {
        a.cmp(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

impl Color {
    fn flip(self) -> Self {
        match self {
            Color::Red => Color::Black,
            Color::Black => Color::Red,
        }
    }
}

type Link<K, V> = Option<Arc<TreeNode<K, V>>>;

#[derive(Clone)]
struct TreeNode<K, V> {
    key: K,
    value: V,
    color: Color,
    left: Link<K, V>,
    right: Link<K, V>,
    count: usize,
}

fn is_red<K, V>(link: &Link<K, V>) -> bool {
    link.as_ref().is_some_and(|n| n.color == Color::Red)
}

fn count<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |n| n.count)
}

fn shared<K, V>(node: TreeNode<K, V>) -> Link<K, V> {
    Some(Arc::new(node))
}

impl<K: Clone, V: Clone> TreeNode<K, V> {
    fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            color: Color::Red,
            left: None,
            right: None,
            count: 1,
        }
    }

    fn recount(mut self) -> Self {
        self.count = count(&self.left) + 1 + count(&self.right);
        self
    }

    fn left_left_red(&self) -> bool {
        self.left.as_ref().is_some_and(|l| is_red(&l.left))
    }

    fn right_left_red(&self) -> bool {
        self.right.as_ref().is_some_and(|r| is_red(&r.left))
    }

    fn min_node(&self) -> &Self {
        let mut node = self;
        while let Some(left) = node.left.as_deref() {
            node = left;
        }
        node
    }

    fn rotate_left(mut self) -> Self {
        let Some(right) = self.right.take() else {
            return self;
        };
        let mut pivot = Arc::unwrap_or_clone(right);
        self.right = pivot.left.take();
        pivot.color = self.color;
        self.color = Color::Red;
        pivot.left = shared(self.recount());
        pivot.recount()
    }

    fn rotate_right(mut self) -> Self {
        let Some(left) = self.left.take() else {
            return self;
        };
        let mut pivot = Arc::unwrap_or_clone(left);
        self.left = pivot.right.take();
        pivot.color = self.color;
        self.color = Color::Red;
        pivot.right = shared(self.recount());
        pivot.recount()
    }

    fn flip_colors(mut self) -> Self {
        fn flip_link<K: Clone, V: Clone>(link: Link<K, V>) -> Link<K, V> {
            link.map(|n| {
                let mut n = Arc::unwrap_or_clone(n);
                n.color = n.color.flip();
                Arc::new(n)
            })
        }
        self.color = self.color.flip();
        self.left = flip_link(self.left.take());
        self.right = flip_link(self.right.take());
        self
    }

    fn move_red_left(self) -> Self {
        let mut node = self.flip_colors();
        if node.right_left_red() {
            node.right = node
                .right
                .take()
                .map(|r| Arc::new(Arc::unwrap_or_clone(r).rotate_right()));
            node = node.rotate_left().flip_colors();
        }
        node
    }

    fn move_red_right(self) -> Self {
        let mut node = self.flip_colors();
        if node.left_left_red() {
            node = node.rotate_right().flip_colors();
        }
        node
    }

    fn balance(self) -> Self {
        let mut node = self;
        if is_red(&node.right) && !is_red(&node.left) {
            node = node.rotate_left();
        }
        if is_red(&node.left) && node.left_left_red() {
            node = node.rotate_right();
        }
        if is_red(&node.left) && is_red(&node.right) {
            node = node.flip_colors();
        }
        node.recount()
    }
}

fn insert_node<K, V, C>(link: Link<K, V>, key: K, value: V, cmp: &C) -> TreeNode<K, V>
where
    K: Clone,
    V: Clone,
    C: KeyComparator<K>,
{
    let Some(node) = link else {
        return TreeNode::new(key, value);
    };
    let mut node = Arc::unwrap_or_clone(node);
    match cmp.compare(&key, &node.key) {
        Ordering::Less => node.left = shared(insert_node(node.left.take(), key, value, cmp)),
        Ordering::Equal => node.value = value,
        Ordering::Greater => node.right = shared(insert_node(node.right.take(), key, value, cmp)),
    }
    node.balance()
}

fn remove_min<K: Clone, V: Clone>(node: TreeNode<K, V>) -> Option<TreeNode<K, V>> {
    if node.left.is_none() {
        return None;
    }
    let mut node = node;
    if !is_red(&node.left) && !node.left_left_red() {
        node = node.move_red_left();
    }
    node.left = node
        .left
        .take()
        .and_then(|l| remove_min(Arc::unwrap_or_clone(l)))
        .map(Arc::new);
    Some(node.balance())
}

/// Removes `key`, which must be present in the subtree rooted at `node`.
fn remove_node<K, V, C>(node: TreeNode<K, V>, key: &K, cmp: &C) -> Option<TreeNode<K, V>>
where
    K: Clone,
    V: Clone,
    C: KeyComparator<K>,
{
    let mut node = node;
    if cmp.compare(key, &node.key) == Ordering::Less {
        if !is_red(&node.left) && !node.left_left_red() {
            node = node.move_red_left();
        }
        node.left = node
            .left
            .take()
            .and_then(|l| remove_node(Arc::unwrap_or_clone(l), key, cmp))
            .map(Arc::new);
    } else {
        if is_red(&node.left) {
            node = node.rotate_right();
        }
        if cmp.compare(key, &node.key) == Ordering::Equal && node.right.is_none() {
            return None;
        }
        if !is_red(&node.right) && !node.right_left_red() {
            node = node.move_red_right();
        }
        if cmp.compare(key, &node.key) == Ordering::Equal {
            if let Some(right) = node.right.take() {
                let right = Arc::unwrap_or_clone(right);
                let successor = right.min_node();
                node.key = successor.key.clone();
                node.value = successor.value.clone();
                node.right = remove_min(right).map(Arc::new);
            }
        } else {
            node.right = node
                .right
                .take()
                .and_then(|r| remove_node(Arc::unwrap_or_clone(r), key, cmp))
                .map(Arc::new);
        }
    }
    Some(node.balance())
}

/// An immutable map ordered by a runtime comparator.
///
/// Updates return a new map and leave `self` untouched.
#[derive(Clone)]
pub struct SortedMap<K, V, C> {
    root: Link<K, V>,
    comparator: C,
}

impl<K, V, C> SortedMap<K, V, C>
where
    K: Clone,
    V: Clone,
    C: KeyComparator<K>,
{
    /// Create an empty map ordered by `comparator`.
    pub fn new(comparator: C) -> Self {
        Self {
            root: None,
            comparator,
        }
    }

    /// The comparator ordering this map.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        count(&self.root)
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Look up a value.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            match self.comparator.compare(key, &n.key) {
                Ordering::Less => node = n.left.as_deref(),
                Ordering::Equal => return Some(&n.value),
                Ordering::Greater => node = n.right.as_deref(),
            }
        }
        None
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Return a map with `key` set to `value`.
    pub fn insert(&self, key: K, value: V) -> Self {
        let mut root = insert_node(self.root.clone(), key, value, &self.comparator);
        root.color = Color::Black;
        Self {
            root: shared(root),
            comparator: self.comparator.clone(),
        }
    }

    /// Return a map without `key`. Removing an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Self {
        let Some(root) = self.root.as_ref() else {
            return self.clone();
        };
        if !self.contains_key(key) {
            return self.clone();
        }
        let mut root = TreeNode::clone(root);
        if !is_red(&root.left) && !is_red(&root.right) {
            root.color = Color::Red;
        }
        let root = remove_node(root, key, &self.comparator).map(|mut n| {
            n.color = Color::Black;
            Arc::new(n)
        });
        Self {
            root,
            comparator: self.comparator.clone(),
        }
    }

    /// Smallest entry.
    pub fn min(&self) -> Option<(&K, &V)> {
        self.root.as_deref().map(|n| {
            let n = n.min_node();
            (&n.key, &n.value)
        })
    }

    /// Largest entry.
    pub fn max(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_deref()?;
        while let Some(right) = node.right.as_deref() {
            node = right;
        }
        Some((&node.key, &node.value))
    }

    /// The greatest key strictly smaller than `key`.
    pub fn predecessor_key(&self, key: &K) -> Option<&K> {
        let mut node = self.root.as_deref();
        let mut candidate = None;
        while let Some(n) = node {
            if self.comparator.compare(&n.key, key) == Ordering::Less {
                candidate = Some(&n.key);
                node = n.right.as_deref();
            } else {
                node = n.left.as_deref();
            }
        }
        candidate
    }

    /// Entries in ascending order.
    pub fn iter(&self) -> SortedMapIter<'_, K, V> {
        SortedMapIter::new(&self.root, None, &self.comparator, false)
    }

    /// Entries with keys `>= start`, ascending.
    pub fn iter_from(&self, start: &K) -> SortedMapIter<'_, K, V> {
        SortedMapIter::new(&self.root, Some(start), &self.comparator, false)
    }

    /// Entries in descending order.
    pub fn reverse_iter(&self) -> SortedMapIter<'_, K, V> {
        SortedMapIter::new(&self.root, None, &self.comparator, true)
    }

    /// Entries with keys `<= start`, descending.
    pub fn reverse_iter_from(&self, start: &K) -> SortedMapIter<'_, K, V> {
        SortedMapIter::new(&self.root, Some(start), &self.comparator, true)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Whether both maps share the same root allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) -> usize {
        fn walk<K, V, C: KeyComparator<K>>(link: &Link<K, V>, cmp: &C) -> usize {
            let Some(n) = link else { return 1 };
            assert!(!is_red(&n.right), "right-leaning red link");
            if n.color == Color::Red {
                assert!(!is_red(&n.left), "two reds in a row");
            }
            if let Some(l) = &n.left {
                assert_eq!(cmp.compare(&l.key, &n.key), Ordering::Less);
            }
            if let Some(r) = &n.right {
                assert_eq!(cmp.compare(&r.key, &n.key), Ordering::Greater);
            }
            assert_eq!(n.count, count(&n.left) + 1 + count(&n.right));
            let left = walk(&n.left, cmp);
            let right = walk(&n.right, cmp);
            assert_eq!(left, right, "unbalanced black height");
            left + usize::from(n.color == Color::Black)
        }
        assert!(!is_red(&self.root), "red root");
        walk(&self.root, &self.comparator)
    }
}

impl<K, V, C> Default for SortedMap<K, V, C>
where
    K: Clone,
    V: Clone,
    C: KeyComparator<K> + Default,
{
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<K, V, C> fmt::Debug for SortedMap<K, V, C>
where
    K: Clone + fmt::Debug,
    V: Clone + fmt::Debug,
    C: KeyComparator<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// In-order iterator over a [`SortedMap`].
pub struct SortedMapIter<'a, K, V> {
    stack: Vec<&'a TreeNode<K, V>>,
    reverse: bool,
}

impl<'a, K, V> SortedMapIter<'a, K, V> {
    fn new<C: KeyComparator<K>>(
        root: &'a Link<K, V>,
        start: Option<&K>,
        cmp: &C,
        reverse: bool,
    ) -> Self {
        let mut stack = Vec::new();
        let mut node = root.as_deref();
        while let Some(n) = node {
            let ord = match start {
                Some(start) if reverse => cmp.compare(&n.key, start).reverse(),
                Some(start) => cmp.compare(&n.key, start),
                None => Ordering::Greater,
            };
            match ord {
                Ordering::Less => {
                    node = if reverse {
                        n.left.as_deref()
                    } else {
                        n.right.as_deref()
                    };
                }
                Ordering::Equal => {
                    stack.push(n);
                    break;
                }
                Ordering::Greater => {
                    stack.push(n);
                    node = if reverse {
                        n.right.as_deref()
                    } else {
                        n.left.as_deref()
                    };
                }
            }
        }
        Self { stack, reverse }
    }
}

impl<'a, K, V> Iterator for SortedMapIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        let mut child = if self.reverse {
            node.left.as_deref()
        } else {
            node.right.as_deref()
        };
        while let Some(c) = child {
            self.stack.push(c);
            child = if self.reverse {
                c.right.as_deref()
            } else {
                c.left.as_deref()
            };
        }
        Some((&node.key, &node.value))
    }
}
