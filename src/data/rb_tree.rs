//! Ordered map: an arena-backed red-black tree.
//!
//! Nodes live in a [`DictArena`] and are addressed by [`NodeId`]; a tree is
//! just a root id, so several trees can share one arena and the sweep can
//! keep per-segment handles to beach-line nodes. All basic operations take
//! the comparator as a closure, which lets the beach line order segments
//! relative to the current sweep position without storing keys in the
//! nodes.
//!
//! Node identity is stable: removal re-links nodes, it never moves items
//! between slots, so handles held by other data structures stay valid.
//!
//! The tree carries an optional subtree augmentation ([`Augment`]) that is
//! kept up to date through every rotation and re-link; [`Size`] provides
//! order-statistics (`rank`/`select`). `split_by`/`join3` are the
//! red-black versions (spine descent by black height), both `O(log n)`.

use std::cmp::Ordering;

/// Index of a node in a [`DictArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
  pub const NIL: NodeId = NodeId(u32::MAX);

  pub fn is_nil(self) -> bool {
    self == NodeId::NIL
  }

  fn idx(self) -> usize {
    self.0 as usize
  }
}

/// Subtree aggregate recomputed whenever a node's children change
/// (rotations, re-links, splits and joins included).
pub trait Augment<T>: Copy + Default {
  fn compute(item: &T, left: Option<&Self>, right: Option<&Self>) -> Self;
}

/// The trivial augmentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoAug;

impl<T> Augment<T> for NoAug {
  fn compute(_: &T, _: Option<&NoAug>, _: Option<&NoAug>) -> NoAug {
    NoAug
  }
}

/// Subtree size; enables `rank` and `select`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size(pub usize);

impl<T> Augment<T> for Size {
  fn compute(_: &T, left: Option<&Size>, right: Option<&Size>) -> Size {
    Size(1 + left.map_or(0, |s| s.0) + right.map_or(0, |s| s.0))
  }
}

#[derive(Debug)]
struct Node<T, A> {
  item: T,
  aug: A,
  parent: NodeId,
  child: [NodeId; 2],
  red: bool,
}

/// Storage for red-black tree nodes; trees are roots into this arena.
#[derive(Debug)]
pub struct DictArena<T, A: Augment<T> = NoAug> {
  nodes: Vec<Node<T, A>>,
  free: Vec<NodeId>,
}

impl<T, A: Augment<T>> Default for DictArena<T, A> {
  fn default() -> Self {
    DictArena {
      nodes: Vec::new(),
      free: Vec::new(),
    }
  }
}

impl<T, A: Augment<T>> DictArena<T, A> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(n: usize) -> Self {
    DictArena {
      nodes: Vec::with_capacity(n),
      free: Vec::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.nodes.len() - self.free.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop all nodes, keeping the allocation for reuse.
  pub fn clear(&mut self) {
    self.nodes.clear();
    self.free.clear();
  }

  /// Allocate a detached singleton node.
  pub fn alloc(&mut self, item: T) -> NodeId {
    let aug = A::compute(&item, None, None);
    let node = Node {
      item,
      aug,
      parent: NodeId::NIL,
      child: [NodeId::NIL, NodeId::NIL],
      red: true,
    };
    match self.free.pop() {
      Some(id) => {
        self.nodes[id.idx()] = node;
        id
      }
      None => {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("arena overflow"));
        self.nodes.push(node);
        id
      }
    }
  }

  /// Return a node to the free list. The node must already be unlinked.
  pub fn release(&mut self, id: NodeId) {
    debug_assert!(self.parent(id).is_nil() && self.child(id, 0).is_nil());
    self.free.push(id);
  }

  pub fn item(&self, id: NodeId) -> &T {
    &self.nodes[id.idx()].item
  }

  /// The item may be mutated, but not in a way that changes its ordering
  /// relative to its tree neighbors.
  pub fn item_mut(&mut self, id: NodeId) -> &mut T {
    &mut self.nodes[id.idx()].item
  }

  pub fn aug(&self, id: NodeId) -> &A {
    &self.nodes[id.idx()].aug
  }

  fn parent(&self, id: NodeId) -> NodeId {
    self.nodes[id.idx()].parent
  }

  fn child(&self, id: NodeId, side: usize) -> NodeId {
    self.nodes[id.idx()].child[side]
  }

  fn is_red(&self, id: NodeId) -> bool {
    !id.is_nil() && self.nodes[id.idx()].red
  }

  fn is_black(&self, id: NodeId) -> bool {
    !self.is_red(id)
  }

  fn set_red(&mut self, id: NodeId, red: bool) {
    self.nodes[id.idx()].red = red;
  }

  /// Which child of its parent `id` is.
  fn side(&self, parent: NodeId, id: NodeId) -> usize {
    debug_assert!(self.child(parent, 0) == id || self.child(parent, 1) == id);
    (self.child(parent, 1) == id) as usize
  }

  fn link(&mut self, parent: NodeId, side: usize, child: NodeId) {
    self.nodes[parent.idx()].child[side] = child;
    if !child.is_nil() {
      self.nodes[child.idx()].parent = parent;
    }
  }

  fn replace_child(&mut self, root: &mut NodeId, old: NodeId, new: NodeId) {
    let p = self.parent(old);
    if p.is_nil() {
      *root = new;
      if !new.is_nil() {
        self.nodes[new.idx()].parent = NodeId::NIL;
      }
    } else {
      let side = self.side(p, old);
      self.link(p, side, new);
    }
  }

  fn recompute(&mut self, id: NodeId) {
    let [l, r] = self.nodes[id.idx()].child;
    let la = (!l.is_nil()).then(|| self.nodes[l.idx()].aug);
    let ra = (!r.is_nil()).then(|| self.nodes[r.idx()].aug);
    let aug = A::compute(&self.nodes[id.idx()].item, la.as_ref(), ra.as_ref());
    self.nodes[id.idx()].aug = aug;
  }

  fn recompute_path(&mut self, mut id: NodeId) {
    while !id.is_nil() {
      self.recompute(id);
      id = self.parent(id);
    }
  }

  /// Rotate so that `x` ends up as the `side` child of its former child.
  fn rotate(&mut self, root: &mut NodeId, x: NodeId, side: usize) {
    let y = self.child(x, 1 - side);
    debug_assert!(!y.is_nil());
    let moved = self.child(y, side);
    self.nodes[x.idx()].child[1 - side] = moved;
    if !moved.is_nil() {
      self.nodes[moved.idx()].parent = x;
    }
    self.replace_child(root, x, y);
    self.link(y, side, x);
    self.recompute(x);
    self.recompute(y);
  }

  fn insert_fixup(&mut self, root: &mut NodeId, mut x: NodeId) {
    while self.is_red(self.parent(x)) {
      let p = self.parent(x);
      let g = self.parent(p);
      debug_assert!(!g.is_nil()); // a red parent is never the root
      let pside = self.side(g, p);
      let uncle = self.child(g, 1 - pside);
      if self.is_red(uncle) {
        self.set_red(p, false);
        self.set_red(uncle, false);
        self.set_red(g, true);
        x = g;
      } else {
        if self.side(p, x) != pside {
          self.rotate(root, p, pside);
          x = p;
        }
        let p = self.parent(x);
        let g = self.parent(p);
        self.set_red(p, false);
        self.set_red(g, true);
        self.rotate(root, g, 1 - pside);
      }
    }
    self.set_red(*root, false);
  }

  /// Insert an allocated node; duplicates go to the right, so equal items
  /// iterate in insertion order.
  pub fn insert_by(
    &mut self,
    root: &mut NodeId,
    id: NodeId,
    mut cmp: impl FnMut(&T, &T) -> Ordering,
  ) {
    debug_assert!(self.parent(id).is_nil() && self.child(id, 0).is_nil());
    if root.is_nil() {
      *root = id;
      self.set_red(id, false);
      return;
    }
    let mut n = *root;
    loop {
      let side = match cmp(self.item(id), self.item(n)) {
        Ordering::Less => 0,
        _ => 1,
      };
      let next = self.child(n, side);
      if next.is_nil() {
        self.link(n, side, id);
        break;
      }
      n = next;
    }
    self.recompute_path(self.parent(id));
    self.insert_fixup(root, id);
    self.recompute_path(id);
  }

  /// Find any node for which `f` answers `Equal`; `f(item)` orders the
  /// item relative to the probe.
  pub fn find_by(&self, root: NodeId, mut f: impl FnMut(&T) -> Ordering) -> Option<NodeId> {
    let mut n = root;
    while !n.is_nil() {
      match f(self.item(n)) {
        Ordering::Equal => return Some(n),
        Ordering::Less => n = self.child(n, 1),
        Ordering::Greater => n = self.child(n, 0),
      }
    }
    None
  }

  /// First node whose item is not `Less` (i.e. `>=` the probe).
  pub fn lower_bound_by(&self, root: NodeId, mut f: impl FnMut(&T) -> Ordering) -> NodeId {
    let mut best = NodeId::NIL;
    let mut n = root;
    while !n.is_nil() {
      if f(self.item(n)) == Ordering::Less {
        n = self.child(n, 1);
      } else {
        best = n;
        n = self.child(n, 0);
      }
    }
    best
  }

  /// First node whose item is `Greater` than the probe.
  pub fn upper_bound_by(&self, root: NodeId, mut f: impl FnMut(&T) -> Ordering) -> NodeId {
    let mut best = NodeId::NIL;
    let mut n = root;
    while !n.is_nil() {
      if f(self.item(n)) == Ordering::Greater {
        best = n;
        n = self.child(n, 0);
      } else {
        n = self.child(n, 1);
      }
    }
    best
  }

  pub fn first(&self, root: NodeId) -> NodeId {
    self.start(root, 0)
  }

  pub fn last(&self, root: NodeId) -> NodeId {
    self.start(root, 1)
  }

  fn start(&self, root: NodeId, side: usize) -> NodeId {
    let mut n = root;
    if n.is_nil() {
      return NodeId::NIL;
    }
    loop {
      let next = self.child(n, side);
      if next.is_nil() {
        return n;
      }
      n = next;
    }
  }

  pub fn next(&self, id: NodeId) -> NodeId {
    self.step(id, 1)
  }

  pub fn prev(&self, id: NodeId) -> NodeId {
    self.step(id, 0)
  }

  fn step(&self, id: NodeId, side: usize) -> NodeId {
    let down = self.child(id, side);
    if !down.is_nil() {
      return self.start(down, 1 - side);
    }
    let mut n = id;
    let mut p = self.parent(n);
    while !p.is_nil() && self.side(p, n) == side {
      n = p;
      p = self.parent(n);
    }
    p
  }

  /// Exchange the tree positions (links and colors) of two nodes. Items
  /// stay in their slots, so ids held elsewhere remain valid.
  fn swap_nodes(&mut self, root: &mut NodeId, a: NodeId, b: NodeId) {
    debug_assert!(a != b);
    if self.parent(b) == a {
      let d = self.side(a, b);
      let b_child = self.nodes[b.idx()].child;
      let a_other = self.child(a, 1 - d);
      self.replace_child(root, a, b);
      self.link(b, d, a);
      self.link(b, 1 - d, a_other);
      self.nodes[a.idx()].child = [NodeId::NIL, NodeId::NIL];
      self.link(a, 0, b_child[0]);
      self.link(a, 1, b_child[1]);
    } else if self.parent(a) == b {
      return self.swap_nodes(root, b, a);
    } else {
      let ap = self.parent(a);
      let bp = self.parent(b);
      let a_side = if ap.is_nil() { 0 } else { self.side(ap, a) };
      let b_side = if bp.is_nil() { 0 } else { self.side(bp, b) };
      let a_child = self.nodes[a.idx()].child;
      let b_child = self.nodes[b.idx()].child;
      if ap.is_nil() {
        *root = b;
        self.nodes[b.idx()].parent = NodeId::NIL;
      } else {
        self.link(ap, a_side, b);
      }
      if bp.is_nil() {
        *root = a;
        self.nodes[a.idx()].parent = NodeId::NIL;
      } else {
        self.link(bp, b_side, a);
      }
      self.link(a, 0, b_child[0]);
      self.link(a, 1, b_child[1]);
      self.link(b, 0, a_child[0]);
      self.link(b, 1, a_child[1]);
    }
    let a_red = self.nodes[a.idx()].red;
    let b_red = self.nodes[b.idx()].red;
    self.set_red(a, b_red);
    self.set_red(b, a_red);
  }

  /// Unlink a node from its tree and rebalance. The node itself stays
  /// allocated; pass it to [`release`](DictArena::release) to recycle.
  pub fn remove(&mut self, root: &mut NodeId, id: NodeId) {
    if !self.child(id, 0).is_nil() && !self.child(id, 1).is_nil() {
      let succ = self.start(self.child(id, 1), 0);
      self.swap_nodes(root, id, succ);
    }
    // id now has at most one child
    let l = self.child(id, 0);
    let r = self.child(id, 1);
    let child = if l.is_nil() { r } else { l };
    let p = self.parent(id);
    let side = if p.is_nil() { 0 } else { self.side(p, id) };
    let was_black = self.is_black(id);
    self.replace_child(root, id, child);
    self.nodes[id.idx()].parent = NodeId::NIL;
    self.nodes[id.idx()].child = [NodeId::NIL, NodeId::NIL];
    if was_black {
      if self.is_red(child) {
        self.set_red(child, false);
      } else if !p.is_nil() {
        self.remove_fixup(root, p, side);
      }
    }
    self.recompute_path(p);
  }

  /// Restore red-black invariants after a black node was removed from the
  /// `side` subtree of `p`, which is now doubly-black (possibly nil).
  fn remove_fixup(&mut self, root: &mut NodeId, mut p: NodeId, mut side: usize) {
    loop {
      let x = self.child(p, side);
      if self.is_red(x) {
        self.set_red(x, false);
        return;
      }
      let mut w = self.child(p, 1 - side);
      debug_assert!(!w.is_nil());
      if self.is_red(w) {
        self.set_red(w, false);
        self.set_red(p, true);
        self.rotate(root, p, side);
        w = self.child(p, 1 - side);
      }
      if self.is_black(self.child(w, 0)) && self.is_black(self.child(w, 1)) {
        self.set_red(w, true);
        let gp = self.parent(p);
        if self.is_red(p) {
          self.set_red(p, false);
          return;
        }
        if gp.is_nil() {
          return;
        }
        side = self.side(gp, p);
        p = gp;
      } else {
        if self.is_black(self.child(w, 1 - side)) {
          let near = self.child(w, side);
          self.set_red(near, false);
          self.set_red(w, true);
          self.rotate(root, w, 1 - side);
          w = self.child(p, 1 - side);
        }
        let p_red = self.is_red(p);
        self.set_red(w, p_red);
        self.set_red(p, false);
        let far = self.child(w, 1 - side);
        self.set_red(far, false);
        self.rotate(root, p, side);
        return;
      }
    }
  }

  fn black_height(&self, mut n: NodeId) -> u32 {
    let mut h = 0;
    while !n.is_nil() {
      if self.is_black(n) {
        h += 1;
      }
      n = self.child(n, 0);
    }
    h
  }

  /// Join `left`, a detached `pivot` node and `right` into one tree;
  /// every item of `left` must order before the pivot, every item of
  /// `right` after.
  pub fn join3(&mut self, left: NodeId, pivot: NodeId, right: NodeId) -> NodeId {
    debug_assert!(self.parent(pivot).is_nil() && self.child(pivot, 0).is_nil());
    if !left.is_nil() {
      self.set_red(left, false);
    }
    if !right.is_nil() {
      self.set_red(right, false);
    }
    let bhl = self.black_height(left);
    let bhr = self.black_height(right);
    if bhl == bhr {
      self.nodes[pivot.idx()].parent = NodeId::NIL;
      self.link(pivot, 0, left);
      self.link(pivot, 1, right);
      self.set_red(pivot, false);
      self.recompute(pivot);
      return pivot;
    }
    let (tall, short, down_side, mut h, target) = if bhl > bhr {
      (left, right, 1, bhl, bhr)
    } else {
      (right, left, 0, bhr, bhl)
    };
    let mut root = tall;
    // descend the spine to a black node of the short tree's height
    let mut n = tall;
    loop {
      if h == target && self.is_black(n) {
        break;
      }
      if self.is_black(n) {
        h -= 1;
      }
      n = self.child(n, down_side);
    }
    let p = if n.is_nil() {
      // target height 0: attach below the last spine node
      let mut last = tall;
      loop {
        let next = self.child(last, down_side);
        if next.is_nil() {
          break;
        }
        last = next;
      }
      last
    } else {
      self.parent(n)
    };
    debug_assert!(!p.is_nil());
    if !n.is_nil() {
      self.nodes[n.idx()].parent = NodeId::NIL;
    }
    self.link(p, down_side, pivot);
    self.set_red(pivot, true);
    self.link(pivot, down_side, short);
    self.link(pivot, 1 - down_side, n);
    self.recompute(pivot);
    self.insert_fixup(&mut root, pivot);
    self.recompute_path(pivot);
    root
  }

  /// Split a tree by a probe: the first tree keeps every item for which
  /// `f` answers `Less`, the second the rest.
  pub fn split_by(
    &mut self,
    root: NodeId,
    f: &mut dyn FnMut(&T) -> Ordering,
  ) -> (NodeId, NodeId) {
    if root.is_nil() {
      return (NodeId::NIL, NodeId::NIL);
    }
    let l = self.child(root, 0);
    let r = self.child(root, 1);
    self.nodes[root.idx()].child = [NodeId::NIL, NodeId::NIL];
    self.nodes[root.idx()].parent = NodeId::NIL;
    if !l.is_nil() {
      self.nodes[l.idx()].parent = NodeId::NIL;
    }
    if !r.is_nil() {
      self.nodes[r.idx()].parent = NodeId::NIL;
    }
    if f(self.item(root)) == Ordering::Less {
      let (a, b) = self.split_by(r, f);
      (self.join3(l, root, a), b)
    } else {
      let (a, b) = self.split_by(l, f);
      (a, self.join3(b, root, r))
    }
  }

  /// In-order iteration of a tree.
  pub fn iter(&self, root: NodeId) -> Iter<'_, T, A> {
    Iter {
      arena: self,
      next: self.first(root),
    }
  }

  #[cfg(test)]
  fn check_invariants(&self, root: NodeId) -> u32 {
    if root.is_nil() {
      return 1;
    }
    assert!(self.is_black(root), "root must be black");
    self.check_node(root)
  }

  #[cfg(test)]
  fn check_node(&self, n: NodeId) -> u32 {
    if n.is_nil() {
      return 1;
    }
    let l = self.child(n, 0);
    let r = self.child(n, 1);
    if self.is_red(n) {
      assert!(self.is_black(l) && self.is_black(r), "red node with red child");
    }
    if !l.is_nil() {
      assert_eq!(self.parent(l), n);
    }
    if !r.is_nil() {
      assert_eq!(self.parent(r), n);
    }
    let hl = self.check_node(l);
    let hr = self.check_node(r);
    assert_eq!(hl, hr, "black height mismatch");
    hl + self.is_black(n) as u32
  }
}

impl<T> DictArena<T, Size> {
  /// Number of items ordering strictly before `id` in its tree.
  pub fn rank(&self, id: NodeId) -> usize {
    let left = self.child(id, 0);
    let mut r = if left.is_nil() { 0 } else { self.aug(left).0 };
    let mut n = id;
    let mut p = self.parent(n);
    while !p.is_nil() {
      if self.side(p, n) == 1 {
        let pl = self.child(p, 0);
        r += 1 + if pl.is_nil() { 0 } else { self.aug(pl).0 };
      }
      n = p;
      p = self.parent(n);
    }
    r
  }

  /// The `k`-th item (0-based) of a tree.
  pub fn select(&self, root: NodeId, mut k: usize) -> Option<NodeId> {
    let mut n = root;
    while !n.is_nil() {
      let l = self.child(n, 0);
      let ls = if l.is_nil() { 0 } else { self.aug(l).0 };
      match k.cmp(&ls) {
        Ordering::Less => n = l,
        Ordering::Equal => return Some(n),
        Ordering::Greater => {
          k -= ls + 1;
          n = self.child(n, 1);
        }
      }
    }
    None
  }
}

pub struct Iter<'a, T, A: Augment<T>> {
  arena: &'a DictArena<T, A>,
  next: NodeId,
}

impl<'a, T, A: Augment<T>> Iterator for Iter<'a, T, A> {
  type Item = (NodeId, &'a T);

  fn next(&mut self) -> Option<Self::Item> {
    if self.next.is_nil() {
      return None;
    }
    let id = self.next;
    self.next = self.arena.next(id);
    Some((id, self.arena.item(id)))
  }
}
