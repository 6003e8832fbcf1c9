//! Monotone-partition triangulation of polygon sets.
//!
//! Works on the output of path reconstruction: loops whose edges do not
//! cross, with no vertex in an edge interior, nested but never partially
//! overlapping. Vertices are processed in lexicographic `(x, y)` order
//! with a fixed per-kind order at coincident coordinates (closings before
//! openings), which admits collinear runs and the coincident vertices the
//! boolean reducer produces. Split and merge vertices get diagonals to
//! their helpers; the resulting x-monotone faces are triangulated with the
//! two-chain stack scan.
//!
//! Every triangle is emitted counter-clockwise and carries flags for the
//! edges that lie on the input outline.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::arith::DimW;
use crate::data::rb_tree::{DictArena, NodeId};
use crate::data::{Polygon, TriOutline, TriSet, Triangle, Vec2};

use super::reconstruct::pick_cw_predecessor;

#[derive(Debug, Clone, Copy)]
struct Vtx {
  point: usize,
  pos: Vec2,
  prev: u32,
  next: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
  End,
  Merge,
  RegularLower,
  RegularUpper,
  Start,
  Split,
}

impl Kind {
  fn rank(self) -> u8 {
    match self {
      Kind::End => 0,
      Kind::Merge => 1,
      Kind::RegularLower | Kind::RegularUpper => 2,
      Kind::Start => 3,
      Kind::Split => 4,
    }
  }
}

fn turn(a: Vec2, b: Vec2, c: Vec2) -> DimW {
  let abx = (b.x as DimW) - (a.x as DimW);
  let aby = (b.y as DimW) - (a.y as DimW);
  let bcx = (c.x as DimW) - (b.x as DimW);
  let bcy = (c.y as DimW) - (b.y as DimW);
  abx * bcy - aby * bcx
}

fn classify(vtx: &[Vtx], i: usize) -> Kind {
  let v = &vtx[i];
  let p = vtx[v.prev as usize].pos;
  let c = v.pos;
  let n = vtx[v.next as usize].pos;
  // negative for a convex corner of a counter-clockwise loop
  let cp = c.right_cross3_z(p, n);
  let prev_less = p < c;
  let next_less = n < c;
  if !prev_less && !next_less {
    if cp > 0 {
      Kind::Split
    } else {
      Kind::Start
    }
  } else if prev_less && next_less {
    if cp > 0 {
      Kind::Merge
    } else {
      Kind::End
    }
  } else if prev_less {
    Kind::RegularLower
  } else {
    Kind::RegularUpper
  }
}

/// An edge of the status line: a lower-chain edge (interior above),
/// identified by its left vertex, with the helper bookkeeping of the
/// monotone partition.
#[derive(Debug, Clone, Copy)]
struct StatusE {
  from: u32,
  to: u32,
  helper: u32,
  helper_merge: bool,
}

fn edge_vs_point(vtx: &[Vtx], e: &StatusE, q: Vec2) -> Ordering {
  let l = vtx[e.from as usize].pos;
  let r = vtx[e.to as usize].pos;
  let cross = ((r.x as DimW) - (l.x as DimW)) * ((q.y as DimW) - (l.y as DimW))
    - ((r.y as DimW) - (l.y as DimW)) * ((q.x as DimW) - (l.x as DimW));
  // positive: q above the edge, so the edge orders below q
  cross.cmp(&0).reverse()
}

fn status_cmp(vtx: &[Vtx], x: &StatusE, u: &StatusE) -> Ordering {
  if x.from == u.from && x.to == u.to {
    return Ordering::Equal;
  }
  let q = vtx[x.from as usize].pos;
  let c = edge_vs_point(vtx, u, q).reverse();
  if c != Ordering::Equal {
    return c;
  }
  let dx = dir_of(vtx, x);
  let du = dir_of(vtx, u);
  match (du.0 * dx.1 - du.1 * dx.0).cmp(&0) {
    Ordering::Greater => Ordering::Greater,
    Ordering::Less => Ordering::Less,
    Ordering::Equal => (x.from, x.to).cmp(&(u.from, u.to)),
  }
}

fn dir_of(vtx: &[Vtx], e: &StatusE) -> (DimW, DimW) {
  let l = vtx[e.from as usize].pos;
  let r = vtx[e.to as usize].pos;
  ((r.x as DimW) - (l.x as DimW), (r.y as DimW) - (l.y as DimW))
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
  if a <= b {
    (a, b)
  } else {
    (b, a)
  }
}

/// Triangulate a polygon set into counter-clockwise triangles with
/// outline flags. `O(n log n)`.
pub fn triangulate(poly: &Polygon) -> TriSet {
  let mut tri = TriSet {
    points: poly.points.clone(),
    triangles: Vec::new(),
  };

  let mut vtx: Vec<Vtx> = Vec::new();
  for path in &poly.paths {
    let len = path.len();
    if len < 3 {
      continue;
    }
    let base = vtx.len() as u32;
    for (k, &pid) in path.point_idx.iter().enumerate() {
      vtx.push(Vtx {
        point: pid,
        pos: poly.points[pid],
        prev: base + ((k + len - 1) % len) as u32,
        next: base + ((k + 1) % len) as u32,
      });
    }
  }
  if vtx.is_empty() {
    return tri;
  }

  let mut outline: HashSet<(usize, usize)> = HashSet::new();
  let mut adj: HashMap<usize, Vec<usize>> = HashMap::new();
  for v in &vtx {
    let a = v.point;
    let b = vtx[v.next as usize].point;
    outline.insert(ordered(a, b));
    adj.entry(a).or_default().push(b);
    adj.entry(b).or_default().push(a);
  }

  let diagonals = partition(&vtx);

  // assemble the face soup: loop edges once, diagonals in both directions
  let mut from: Vec<u32> = (0..vtx.len() as u32).collect();
  let mut to: Vec<u32> = vtx.iter().map(|v| v.next).collect();
  for &(a, b) in &diagonals {
    from.push(a);
    to.push(b);
    from.push(b);
    to.push(a);
  }
  let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); vtx.len()];
  for (i, &f) in from.iter().enumerate() {
    outgoing[f as usize].push(i);
  }
  let dir = |i: usize| {
    let f = vtx[from[i] as usize].pos;
    let t = vtx[to[i] as usize].pos;
    (
      (t.x as DimW) - (f.x as DimW),
      (t.y as DimW) - (f.y as DimW),
    )
  };

  let ctx = Ctx {
    vtx: &vtx,
    outline: &outline,
    adj: &adj,
    points: &tri.points,
  };

  let mut used = vec![false; from.len()];
  for e0 in 0..from.len() {
    if used[e0] {
      continue;
    }
    let mut face: Vec<u32> = Vec::new();
    let mut cur = e0;
    loop {
      used[cur] = true;
      face.push(from[cur]);
      let t = to[cur] as usize;
      let f = vtx[from[cur] as usize].pos;
      let tp = vtx[t].pos;
      let rd = (
        (f.x as DimW) - (tp.x as DimW),
        (f.y as DimW) - (tp.y as DimW),
      );
      match pick_cw_predecessor(&outgoing[t], |c| !used[c] || c == e0, &dir, rd) {
        Some(n) if n == e0 => break,
        Some(n) => cur = n,
        None => break,
      }
    }
    if face.len() >= 3 {
      triangulate_monotone(&ctx, &face, &mut tri.triangles);
    }
  }

  tri
}

/// Run the monotone partition and return the diagonals it adds.
fn partition(vtx: &[Vtx]) -> Vec<(u32, u32)> {
  let kinds: Vec<Kind> = (0..vtx.len()).map(|i| classify(vtx, i)).collect();
  let mut order: Vec<u32> = (0..vtx.len() as u32).collect();
  order.sort_by(|&a, &b| {
    vtx[a as usize]
      .pos
      .cmp(&vtx[b as usize].pos)
      .then(kinds[a as usize].rank().cmp(&kinds[b as usize].rank()))
      .then(a.cmp(&b))
  });

  let mut st = Partition {
    vtx,
    status: DictArena::new(),
    sroot: NodeId::NIL,
    node_of: HashMap::new(),
    diagonals: Vec::new(),
    seen: HashSet::new(),
  };

  for &vi in &order {
    let kind = kinds[vi as usize];
    let q = vtx[vi as usize].pos;
    match kind {
      Kind::Start => st.insert_edge(vi),
      Kind::Split => {
        let below = st.below_node(q);
        if !below.is_nil() {
          let helper = st.status.item(below).helper;
          st.add_diag(vi, helper);
          let e = st.status.item_mut(below);
          e.helper = vi;
          e.helper_merge = false;
        }
        st.insert_edge(vi);
      }
      Kind::End => st.finish_edge(vi),
      Kind::Merge => {
        st.finish_edge(vi);
        st.mark_below(vi, q, true);
      }
      Kind::RegularLower => {
        st.finish_edge(vi);
        st.insert_edge(vi);
      }
      Kind::RegularUpper => st.mark_below(vi, q, false),
    }
  }
  st.diagonals
}

struct Partition<'a> {
  vtx: &'a [Vtx],
  status: DictArena<StatusE>,
  sroot: NodeId,
  node_of: HashMap<u32, NodeId>,
  diagonals: Vec<(u32, u32)>,
  seen: HashSet<(u32, u32)>,
}

impl Partition<'_> {
  fn add_diag(&mut self, a: u32, b: u32) {
    // never duplicate an existing loop edge
    if a == b || self.vtx[a as usize].next == b || self.vtx[b as usize].next == a {
      return;
    }
    let key = if a < b { (a, b) } else { (b, a) };
    if self.seen.insert(key) {
      self.diagonals.push(key);
    }
  }

  fn insert_edge(&mut self, vi: u32) {
    let e = StatusE {
      from: vi,
      to: self.vtx[vi as usize].next,
      helper: vi,
      helper_merge: false,
    };
    let node = self.status.alloc(e);
    let vtx = self.vtx;
    self
      .status
      .insert_by(&mut self.sroot, node, |a, b| status_cmp(vtx, a, b));
    self.node_of.insert(vi, node);
  }

  /// Close the lower edge arriving at `vi`, connecting a pending merge
  /// helper if there is one.
  fn finish_edge(&mut self, vi: u32) {
    let from = self.vtx[vi as usize].prev;
    if let Some(node) = self.node_of.remove(&from) {
      let e = *self.status.item(node);
      if e.helper_merge {
        self.add_diag(vi, e.helper);
      }
      self.status.remove(&mut self.sroot, node);
      self.status.release(node);
    }
  }

  /// Make `vi` the helper of the edge below it.
  fn mark_below(&mut self, vi: u32, q: Vec2, merge: bool) {
    let below = self.below_node(q);
    if below.is_nil() {
      return;
    }
    if self.status.item(below).helper_merge {
      let helper = self.status.item(below).helper;
      self.add_diag(vi, helper);
    }
    let e = self.status.item_mut(below);
    e.helper = vi;
    e.helper_merge = merge;
  }

  /// The status edge directly below (or through) a probe point.
  fn below_node(&self, q: Vec2) -> NodeId {
    let vtx = self.vtx;
    let ub = self
      .status
      .upper_bound_by(self.sroot, |e| edge_vs_point(vtx, e, q));
    if ub.is_nil() {
      self.status.last(self.sroot)
    } else {
      self.status.prev(ub)
    }
  }
}

struct Ctx<'a> {
  vtx: &'a [Vtx],
  outline: &'a HashSet<(usize, usize)>,
  adj: &'a HashMap<usize, Vec<usize>>,
  points: &'a [Vec2],
}

impl Ctx<'_> {
  fn pos(&self, v: u32) -> Vec2 {
    self.vtx[v as usize].pos
  }

  /// Whether the segment between two pool points runs along the outline.
  fn on_outline(&self, x: usize, y: usize) -> bool {
    if self.outline.contains(&ordered(x, y)) {
      return true;
    }
    // a triangle edge may span a run of collinear outline vertices
    for (s, t) in [(x, y), (y, x)] {
      if let Some(ns) = self.adj.get(&s) {
        for &n in ns {
          if n == t {
            continue;
          }
          let (lo, hi) = (
            self.points[s].min(self.points[t]),
            self.points[s].max(self.points[t]),
          );
          if turn(self.points[s], self.points[n], self.points[t]) == 0
            && lo < self.points[n]
            && self.points[n] < hi
          {
            return true;
          }
        }
      }
    }
    false
  }

  fn emit(&self, out: &mut Vec<Triangle>, a: u32, b: u32, c: u32) {
    let t = turn(self.pos(a), self.pos(b), self.pos(c));
    if t == 0 {
      return;
    }
    let (pa, pb, pc) = (
      self.vtx[a as usize].point,
      self.vtx[b as usize].point,
      self.vtx[c as usize].point,
    );
    let idx = if t > 0 { [pa, pb, pc] } else { [pa, pc, pb] };
    let mut outline = TriOutline::default();
    if self.on_outline(idx[0], idx[1]) {
      outline |= TriOutline::EDGE_01;
    }
    if self.on_outline(idx[1], idx[2]) {
      outline |= TriOutline::EDGE_12;
    }
    if self.on_outline(idx[2], idx[0]) {
      outline |= TriOutline::EDGE_20;
    }
    out.push(Triangle { idx, outline });
  }
}

/// Stack scan of one x-monotone face (given in counter-clockwise order).
fn triangulate_monotone(ctx: &Ctx<'_>, face: &[u32], out: &mut Vec<Triangle>) {
  let np = face.len();
  if np == 3 {
    ctx.emit(out, face[0], face[1], face[2]);
    return;
  }
  let key = |k: usize| (ctx.pos(face[k]), face[k]);
  let mi = (0..np).min_by_key(|&k| key(k)).unwrap();
  let ma = (0..np).max_by_key(|&k| key(k)).unwrap();

  // from the minimum, face order walks the lower chain
  let mut lowers = Vec::new();
  let mut k = mi;
  loop {
    lowers.push(face[k]);
    if k == ma {
      break;
    }
    k = (k + 1) % np;
  }
  let mut uppers = Vec::new();
  k = mi;
  loop {
    uppers.push(face[k]);
    if k == ma {
      break;
    }
    k = (k + np - 1) % np;
  }

  let mut merged: Vec<(u32, bool)> = Vec::with_capacity(np);
  merged.push((lowers[0], true));
  let (mut li, mut ui) = (1, 1);
  while li < lowers.len() - 1 || ui < uppers.len() - 1 {
    let take_lower = if li >= lowers.len() - 1 {
      false
    } else if ui >= uppers.len() - 1 {
      true
    } else {
      (ctx.pos(lowers[li]), lowers[li]) <= (ctx.pos(uppers[ui]), uppers[ui])
    };
    if take_lower {
      merged.push((lowers[li], true));
      li += 1;
    } else {
      merged.push((uppers[ui], false));
      ui += 1;
    }
  }
  merged.push((lowers[lowers.len() - 1], true));

  let n = merged.len();
  if n < 3 {
    return;
  }
  let mut stack: Vec<(u32, bool)> = vec![merged[0], merged[1]];
  for j in 2..n - 1 {
    let (vj, cj) = merged[j];
    if cj != stack.last().unwrap().1 {
      while stack.len() >= 2 {
        let a = stack.pop().unwrap();
        let b = *stack.last().unwrap();
        ctx.emit(out, vj, a.0, b.0);
      }
      stack.pop();
      stack.push(merged[j - 1]);
      stack.push(merged[j]);
    } else {
      let mut last = stack.pop().unwrap();
      while let Some(&top) = stack.last() {
        let t = turn(ctx.pos(top.0), ctx.pos(last.0), ctx.pos(vj));
        let ok = if cj { t >= 0 } else { t <= 0 };
        if !ok {
          break;
        }
        ctx.emit(out, vj, top.0, last.0);
        last = stack.pop().unwrap();
      }
      stack.push(last);
      stack.push(merged[j]);
    }
  }
  let (vn, _) = merged[n - 1];
  while stack.len() >= 2 {
    let a = stack.pop().unwrap();
    let b = *stack.last().unwrap();
    ctx.emit(out, vn, a.0, b.0);
  }
}
