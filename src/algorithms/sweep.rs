//! Plane sweep over integer-grid segments.
//!
//! The sweep resolves all intersections among the input segments and then
//! optionally filters the resolved arrangement through a boolean truth
//! table. The sweep line advances in `(x, y)` order across an event queue
//! of segment endpoints while a balanced search structure (the beach line)
//! maintains the vertical order of the active segments.
//!
//! Intersections are resolved by splitting, snapped to the grid: when two
//! neighboring segments cross, both are cut at the rounded crossing point,
//! and a vertex landing within the half-unit tolerance square of an active
//! segment cuts that segment at the vertex (Hobby's snap rule, see
//! [`cmp_edge_rnd`]). Collinear overlaps collapse into a single segment
//! whose membership mask is the XOR of the parents' masks, so a boundary
//! covered twice by one polygon cancels. The output is a set of
//! interior-disjoint segments; segments may share endpoints only.
//!
//! All scratch objects live in the caller's [`Pool`]; clearing or dropping
//! the pool releases everything at once.

use std::cmp::Ordering;

use log::{debug, trace};

use crate::arith::{cmp_edge_rnd, segment_intersect, DimW, EndMask, SegSeg, DIM_MAX};
use crate::data::rb_tree::{DictArena, NodeId};
use crate::data::segment::{ReduceEntry, Role, SegId, SweepEvent, SweepSeg};
use crate::data::{BoolTable, Bounds, Edge, MemberMask, Polygon, TriSet, Vec2};
use crate::pool::{Arena, Pool};
use crate::{Error, Loc};

/// Per-operation configuration of a [`Sweep`].
#[derive(Debug, Clone)]
pub struct SweepOptions {
  /// Maximum number of polygons composed by one sweep; bounds the width
  /// of acceptable truth tables.
  pub max_simultaneous: u32,
  /// Coalesce collinear consecutive edges in output paths.
  pub drop_collinear: bool,
  /// Short-circuit to an empty result when no input edges were added.
  pub skip_empty: bool,
  /// Report `EmptyInput`/`CollapsedOutput` instead of returning an empty
  /// polygon.
  pub strict: bool,
}

impl Default for SweepOptions {
  fn default() -> SweepOptions {
    SweepOptions {
      max_simultaneous: 8,
      drop_collinear: false,
      skip_empty: false,
      strict: false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Add,
  Intersected,
  Reduced,
}

/// A plane-sweep operation: feed edges, resolve intersections, apply a
/// boolean truth table, then extract edges, paths or triangles.
///
/// After any error the sweep is poisoned and refuses further operations;
/// the caller retries with adjusted inputs (typically a coarser grid).
pub struct Sweep<'p> {
  pool: &'p mut Pool,
  loc: Loc,
  options: SweepOptions,
  qroot: NodeId,
  broot: NodeId,
  out: Vec<Edge>,
  bounds: Bounds,
  phase: Phase,
  added: bool,
  poisoned: Option<Error>,
}

impl<'p> Sweep<'p> {
  /// Prepare a sweep using `pool` for scratch storage. `hint_edge_count`
  /// pre-sizes the pool (0 if unknown; slight over-estimates are fine).
  pub fn new(pool: &'p mut Pool, loc: Loc, hint_edge_count: usize) -> Sweep<'p> {
    Sweep::with_options(pool, loc, hint_edge_count, SweepOptions::default())
  }

  pub fn with_options(
    pool: &'p mut Pool,
    loc: Loc,
    hint_edge_count: usize,
    options: SweepOptions,
  ) -> Sweep<'p> {
    pool.clear();
    pool.segs.reserve(hint_edge_count * 2);
    Sweep {
      pool,
      loc,
      options,
      qroot: NodeId::NIL,
      broot: NodeId::NIL,
      out: Vec::new(),
      bounds: Bounds::EMPTY,
      phase: Phase::Add,
      added: false,
      poisoned: None,
    }
  }

  fn guard(&self) -> Result<(), Error> {
    match &self.poisoned {
      Some(e) => Err(e.clone()),
      None => Ok(()),
    }
  }

  fn fail(&mut self, e: Error) -> Error {
    self.poisoned = Some(e.clone());
    e
  }

  /// Feed one segment tagged with the membership mask of the polygons it
  /// bounds. Degenerate (zero-length) edges are ignored.
  pub fn add_edge(&mut self, a: Vec2, b: Vec2, members: MemberMask) -> Result<(), Error> {
    self.guard()?;
    debug_assert_eq!(self.phase, Phase::Add);
    for p in [a, b] {
      if p.x.unsigned_abs() > DIM_MAX as u32 || p.y.unsigned_abs() > DIM_MAX as u32 {
        let e = Error::Overflow {
          loc: self.loc.clone(),
          what: "input coordinate outside the grid",
        };
        return Err(self.fail(e));
      }
    }
    self.bounds.add(a);
    self.bounds.add(b);
    if a == b {
      return Ok(());
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let sid = self.pool.segs.alloc(SweepSeg::new(lo, hi, members));
    let ev = SweepEvent {
      p: lo,
      role: Role::Start,
      seg: sid,
    };
    let id = self.pool.events.alloc(ev);
    self
      .pool
      .events
      .insert_by(&mut self.qroot, id, |a, b| a.key().cmp(&b.key()));
    self.added = true;
    Ok(())
  }

  /// Feed a closed polygon; every path edge is added under `members`.
  pub fn add_polygon(&mut self, poly: &Polygon, members: MemberMask) -> Result<(), Error> {
    for (a, b) in poly.iter_edges() {
      self.add_edge(a, b, members)?;
    }
    Ok(())
  }

  /// Feed the result edges of another (finished) sweep under a new
  /// membership mask; used to cascade boolean stages.
  pub fn add_sweep(&mut self, other: &Sweep<'_>, members: MemberMask) -> Result<(), Error> {
    for e in other.edges() {
      self.add_edge(e.a, e.b, members)?;
    }
    Ok(())
  }

  /// Bounding box of everything added so far.
  pub fn bounding_box(&self) -> Bounds {
    self.bounds
  }

  /// Resolve all intersections. Idempotent.
  pub fn intersect(&mut self) -> Result<(), Error> {
    self.guard()?;
    if self.phase != Phase::Add {
      return Ok(());
    }
    if self.options.skip_empty && !self.added {
      self.phase = Phase::Intersected;
      return Ok(());
    }
    debug!(
      "sweep intersect: {} segments at {}",
      self.pool.segs.len(),
      self.loc
    );
    let mut engine = Engine {
      segs: &mut self.pool.segs,
      events: &mut self.pool.events,
      beach: &mut self.pool.beach,
      qroot: self.qroot,
      broot: self.broot,
      out: &mut self.out,
    };
    let r = engine.run();
    self.qroot = engine.qroot;
    self.broot = engine.broot;
    match r {
      Ok(()) => {
        debug!("sweep intersect: {} output segments", self.out.len());
        self.phase = Phase::Intersected;
        Ok(())
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Filter the resolved arrangement through a boolean truth table.
  ///
  /// Surviving edges bound the boolean result and are directed with the
  /// result's interior on the left of `a -> b`.
  pub fn reduce(&mut self, table: &BoolTable) -> Result<(), Error> {
    self.guard()?;
    if table.inputs() > self.options.max_simultaneous {
      let e = Error::Unimplemented {
        loc: self.loc.clone(),
        inputs: table.inputs(),
        max: self.options.max_simultaneous,
      };
      return Err(self.fail(e));
    }
    self.intersect()?;
    if self.phase == Phase::Reduced {
      return Ok(());
    }
    if self.options.strict && !self.added {
      let e = Error::EmptyInput {
        loc: self.loc.clone(),
      };
      return Err(self.fail(e));
    }
    self.run_reduce(table);
    debug!("sweep reduce: {} surviving edges", self.out.len());
    self.phase = Phase::Reduced;
    Ok(())
  }

  /// The current edge set: resolved segments after
  /// [`intersect`](Sweep::intersect), directed boundary edges after
  /// [`reduce`](Sweep::reduce).
  pub fn edges(&self) -> &[Edge] {
    &self.out
  }

  /// Whether the result is empty; valid after the result is generated.
  pub fn is_empty(&self) -> bool {
    self.out.is_empty()
  }

  /// Reconstruct the surviving edges into closed paths.
  pub fn into_polygon(self) -> Result<Polygon, Error> {
    if let Some(e) = self.poisoned {
      return Err(e);
    }
    debug_assert_eq!(self.phase, Phase::Reduced);
    if self.options.strict && self.added && self.out.is_empty() {
      return Err(Error::CollapsedOutput { loc: self.loc });
    }
    Ok(super::reconstruct::reconstruct(
      &self.out,
      self.options.drop_collinear,
    ))
  }

  /// Reconstruct paths and triangulate them.
  pub fn into_triangles(self) -> Result<TriSet, Error> {
    let poly = self.into_polygon()?;
    Ok(super::triangulate::triangulate(&poly))
  }
}

///////////////////////////////////////////////////////////////////////////////
// Beach-line predicates

/// Order of point `p` against the beach segment `s` (tolerant).
fn pt_vs_seg(segs: &Arena<SweepSeg>, p: Vec2, sid: SegId) -> Ordering {
  let s = &segs[sid];
  cmp_edge_rnd(p.x, p.y, s.b.x, s.b.y, s.a.x, s.a.y)
}

fn seg_dir(segs: &Arena<SweepSeg>, sid: SegId) -> (DimW, DimW) {
  let s = &segs[sid];
  (
    (s.b.x as DimW) - (s.a.x as DimW),
    (s.b.y as DimW) - (s.a.y as DimW),
  )
}

/// Beach order of a segment being inserted (`x`) against a resident
/// segment (`u`): by the position of x's start point, then by slope, then
/// by allocation order for exact overlaps.
fn beach_order(segs: &Arena<SweepSeg>, x: SegId, u: SegId) -> Ordering {
  if x == u {
    return Ordering::Equal;
  }
  let c = pt_vs_seg(segs, segs[x].a, u);
  if c != Ordering::Equal {
    return c;
  }
  let (ux, uy) = seg_dir(segs, u);
  let (xx, xy) = seg_dir(segs, x);
  match (ux * xy - uy * xx).cmp(&0) {
    Ordering::Greater => Ordering::Greater, // x is steeper, so above beyond the tie
    Ordering::Less => Ordering::Less,
    Ordering::Equal => x.cmp(&u),
  }
}

///////////////////////////////////////////////////////////////////////////////
// The sweep engine

struct Engine<'a> {
  segs: &'a mut Arena<SweepSeg>,
  events: &'a mut DictArena<SweepEvent>,
  beach: &'a mut DictArena<SegId>,
  qroot: NodeId,
  broot: NodeId,
  out: &'a mut Vec<Edge>,
}

impl Engine<'_> {
  fn run(&mut self) -> Result<(), Error> {
    let mut work: Vec<NodeId> = Vec::new();
    while let Some((p, ends, starts)) = self.pop_batch() {
      trace!("event {} ({} ends, {} starts)", p, ends.len(), starts.len());
      self.process_point(&mut work, p, ends, starts)?;
    }
    debug_assert!(self.broot.is_nil(), "beach line not drained");
    Ok(())
  }

  /// Pop all events sharing the smallest pending point.
  fn pop_batch(&mut self) -> Option<(Vec2, Vec<SegId>, Vec<SegId>)> {
    let first = self.events.first(self.qroot);
    if first.is_nil() {
      return None;
    }
    let p = self.events.item(first).p;
    let mut ends = Vec::new();
    let mut starts = Vec::new();
    loop {
      let n = self.events.first(self.qroot);
      if n.is_nil() {
        break;
      }
      let ev = *self.events.item(n);
      if ev.p != p {
        break;
      }
      self.events.remove(&mut self.qroot, n);
      self.events.release(n);
      match ev.role {
        Role::Start => starts.push(ev.seg),
        Role::End => {
          self.segs[ev.seg].end_ev = NodeId::NIL;
          ends.push(ev.seg);
        }
      }
    }
    Some((p, ends, starts))
  }

  fn emit(&mut self, a: Vec2, b: Vec2, members: MemberMask) {
    if a != b {
      debug_assert!(a < b);
      self.out.push(Edge::new(a, b, members));
    }
  }

  fn beach_insert(&mut self, sid: SegId) -> NodeId {
    let node = self.beach.alloc(sid);
    let segs = &*self.segs;
    self
      .beach
      .insert_by(&mut self.broot, node, |a, b| beach_order(segs, *a, *b));
    self.segs[sid].beach = node;
    node
  }

  fn beach_remove(&mut self, sid: SegId) {
    let node = self.segs[sid].beach;
    if !node.is_nil() {
      self.beach.remove(&mut self.broot, node);
      self.beach.release(node);
      self.segs[sid].beach = NodeId::NIL;
    }
  }

  fn queue_push(&mut self, ev: SweepEvent) -> NodeId {
    let id = self.events.alloc(ev);
    self
      .events
      .insert_by(&mut self.qroot, id, |a, b| a.key().cmp(&b.key()));
    id
  }

  fn queue_end(&mut self, sid: SegId) {
    debug_assert!(self.segs[sid].end_ev.is_nil());
    let ev = SweepEvent {
      p: self.segs[sid].b,
      role: Role::End,
      seg: sid,
    };
    let id = self.queue_push(ev);
    self.segs[sid].end_ev = id;
  }

  fn queue_remove_end(&mut self, sid: SegId) {
    let id = self.segs[sid].end_ev;
    if !id.is_nil() {
      self.events.remove(&mut self.qroot, id);
      self.events.release(id);
      self.segs[sid].end_ev = NodeId::NIL;
    }
  }

  fn queue_start(&mut self, sid: SegId) {
    let ev = SweepEvent {
      p: self.segs[sid].a,
      role: Role::Start,
      seg: sid,
    };
    self.queue_push(ev);
  }

  /// A beach node is alive iff its segment still points back at it.
  fn node_alive(&self, n: NodeId) -> bool {
    if n.is_nil() {
      return false;
    }
    let sid = *self.beach.item(n);
    sid.usize() < self.segs.len() && self.segs[sid].beach == n
  }

  fn process_point(
    &mut self,
    work: &mut Vec<NodeId>,
    p: Vec2,
    ends: Vec<SegId>,
    starts: Vec<SegId>,
  ) -> Result<(), Error> {
    let had_removals = !ends.is_empty();

    // all segments ending here leave the beach line first
    for sid in ends {
      self.beach_remove(sid);
      let e = self.segs[sid].edge();
      self.emit(e.a, e.b, e.members);
    }

    // segments whose tolerance square the point hits are cut at the point
    let mut inserts = starts;
    let segs = &*self.segs;
    let lb = self
      .beach
      .lower_bound_by(self.broot, |sid| pt_vs_seg(segs, p, *sid).reverse());
    let mut run = Vec::new();
    let mut n = lb;
    while !n.is_nil() {
      let sid = *self.beach.item(n);
      if pt_vs_seg(&*self.segs, p, sid) != Ordering::Equal {
        break;
      }
      run.push(sid);
      n = self.beach.next(n);
    }
    let had_split = !run.is_empty();
    for sid in run {
      // the segment started left of the point and ends right of it
      debug_assert!(self.segs[sid].a < p && p < self.segs[sid].b);
      let s = &self.segs[sid];
      let (a, members) = (s.a, s.members);
      self.emit(a, p, members);
      self.beach_remove(sid);
      self.segs[sid].a = p;
      inserts.push(sid);
    }

    // insert everything that begins (or continues) at this point
    let mut inserted = Vec::new();
    for sid in inserts {
      if self.segs[sid].a == self.segs[sid].b {
        continue;
      }
      let node = self.beach_insert(sid);
      if self.segs[sid].end_ev.is_nil() {
        self.queue_end(sid);
      }
      inserted.push(node);
    }

    // re-test adjacencies around everything that moved
    for &node in &inserted {
      work.push(self.beach.prev(node));
      work.push(node);
    }
    if inserted.is_empty() && (had_removals || had_split) {
      let segs = &*self.segs;
      let above = self
        .beach
        .lower_bound_by(self.broot, |sid| pt_vs_seg(segs, p, *sid).reverse());
      let below = if above.is_nil() {
        self.beach.last(self.broot)
      } else {
        self.beach.prev(above)
      };
      work.push(below);
    }

    while let Some(n) = work.pop() {
      if !self.node_alive(n) {
        continue;
      }
      let m = self.beach.next(n);
      if m.is_nil() {
        continue;
      }
      self.check_pair(work, p, n, m)?;
    }
    Ok(())
  }

  /// Test two beach neighbors for intersection or overlap and resolve it.
  fn check_pair(
    &mut self,
    work: &mut Vec<NodeId>,
    p: Vec2,
    nlo: NodeId,
    nhi: NodeId,
  ) -> Result<(), Error> {
    let s = *self.beach.item(nlo);
    let t = *self.beach.item(nhi);
    let (sa, sb) = (self.segs[s].a, self.segs[s].b);
    let (ta, tb) = (self.segs[t].a, self.segs[t].b);
    match segment_intersect(sa.into(), sb.into(), ta.into(), tb.into()) {
      SegSeg::Disjoint => Ok(()),
      SegSeg::Cross { at, point } => {
        let s_end = at.contains(EndMask::P1) || at.contains(EndMask::P2);
        let t_end = at.contains(EndMask::P3) || at.contains(EndMask::P4);
        if s_end && t_end {
          // the segments connect at a shared vertex
          Ok(())
        } else if s_end {
          // a vertex of s lies in the interior of t
          let v = if at.contains(EndMask::P1) { sa } else { sb };
          self.split_active(work, p, t, v)
        } else if t_end {
          let v = if at.contains(EndMask::P3) { ta } else { tb };
          self.split_active(work, p, s, v)
        } else {
          let (x, y) = point.round();
          let r = Vec2::new(x, y);
          if sa < r && r < sb {
            self.split_active(work, p, s, r)?;
          }
          if ta < r && r < tb {
            self.split_active(work, p, t, r)?;
          }
          Ok(())
        }
      }
      SegSeg::Collinear => {
        if sa.right_cross3_z(ta, sb) != 0 {
          return Ok(()); // parallel, distinct support lines
        }
        let (u, w) = if sa <= ta { (s, t) } else { (t, s) };
        if self.segs[w].a >= self.segs[u].b {
          return Ok(()); // touching endpoints at most
        }
        self.merge_overlap(work, u, w);
        Ok(())
      }
    }
  }

  /// Cut an active segment at `v` (strictly inside it). A cut at or left
  /// of the sweep point retires the left piece immediately; otherwise the
  /// segment is truncated in place and the right piece is scheduled.
  fn split_active(
    &mut self,
    work: &mut Vec<NodeId>,
    p: Vec2,
    sid: SegId,
    v: Vec2,
  ) -> Result<(), Error> {
    let (a, b, members) = {
      let s = &self.segs[sid];
      (s.a, s.b, s.members)
    };
    debug_assert!(a < v && v < b);
    let right = self.segs.alloc(SweepSeg::new(v, b, members));
    self.segs[sid].b = v;
    self.queue_remove_end(sid);
    if v <= p {
      // the left piece is fully swept
      self.beach_remove(sid);
      self.emit(a, v, members);
      let node = self.beach_insert(right);
      self.queue_end(right);
      work.push(self.beach.prev(node));
      work.push(node);
    } else {
      self.queue_end(sid); // end event moves to v
      self.queue_start(right);
    }
    Ok(())
  }

  /// Replace two overlapping collinear beach segments by their disjoint
  /// pieces; the overlap carries the XOR of the parents' masks.
  fn merge_overlap(&mut self, work: &mut Vec<NodeId>, u: SegId, w: SegId) {
    let (ua, ub, um) = {
      let s = &self.segs[u];
      (s.a, s.b, s.members)
    };
    let (wa, wb, wm) = {
      let s = &self.segs[w];
      (s.a, s.b, s.members)
    };
    debug_assert!(ua <= wa && wa < ub);
    let o2 = ub.min(wb);

    self.queue_remove_end(u);
    self.queue_remove_end(w);
    self.beach_remove(u);
    self.beach_remove(w);

    // left remainder of u is already swept past
    if ua < wa {
      self.emit(ua, wa, um);
    }

    // the overlap piece reuses w
    self.segs[w].b = o2;
    self.segs[w].members = um ^ wm;
    let node = self.beach_insert(w);
    self.queue_end(w);
    work.push(self.beach.prev(node));
    work.push(node);

    // right remainder
    if o2 < ub {
      self.segs[u].a = o2;
      self.queue_start(u);
    } else if o2 < wb {
      let c = self.segs.alloc(SweepSeg::new(o2, wb, wm));
      self.queue_start(c);
    }
  }
}

///////////////////////////////////////////////////////////////////////////////
// The boolean reducer

/// Reduce order of output edge `x` being inserted against resident `u`.
fn edge_order(edges: &[Edge], x: u32, u: u32) -> Ordering {
  if x == u {
    return Ordering::Equal;
  }
  let (xe, ue) = (&edges[x as usize], &edges[u as usize]);
  let c = cmp_edge_rnd(xe.a.x, xe.a.y, ue.b.x, ue.b.y, ue.a.x, ue.a.y);
  if c != Ordering::Equal {
    return c;
  }
  let (ux, uy) = edge_dir(ue);
  let (xx, xy) = edge_dir(xe);
  match (ux * xy - uy * xx).cmp(&0) {
    Ordering::Greater => Ordering::Greater,
    Ordering::Less => Ordering::Less,
    Ordering::Equal => x.cmp(&u),
  }
}

fn edge_dir(e: &Edge) -> (DimW, DimW) {
  (
    (e.b.x as DimW) - (e.a.x as DimW),
    (e.b.y as DimW) - (e.a.y as DimW),
  )
}

impl Sweep<'_> {
  /// Scan the interior-disjoint segments in sweep order, tracking the
  /// inside-mask below each segment. A segment survives iff the truth
  /// table answers differently on its two sides; the survivor is directed
  /// with the inside on its left.
  fn run_reduce(&mut self, table: &BoolTable) {
    let edges = std::mem::take(&mut self.out);

    // (point, is_start, edge): ends sort before starts at equal points,
    // same-point starts in ascending slope order so that each insertion
    // finds its predecessor's inside-mask already computed
    let mut evs: Vec<(Vec2, bool, u32)> = Vec::with_capacity(edges.len() * 2);
    for (i, e) in edges.iter().enumerate() {
      debug_assert!(e.a < e.b);
      evs.push((e.a, true, i as u32));
      evs.push((e.b, false, i as u32));
    }
    evs.sort_by(|l, r| {
      l.0
        .cmp(&r.0)
        .then(l.1.cmp(&r.1))
        .then_with(|| match (l.1, r.1) {
          (true, true) => {
            let (lx, ly) = edge_dir(&edges[l.2 as usize]);
            let (rx, ry) = edge_dir(&edges[r.2 as usize]);
            (lx * ry - ly * rx).cmp(&0).reverse().then(l.2.cmp(&r.2))
          }
          _ => l.2.cmp(&r.2),
        })
    });

    let rb = &mut self.pool.reduce;
    rb.clear();
    let mut root = NodeId::NIL;
    let mut node_of: Vec<NodeId> = vec![NodeId::NIL; edges.len()];
    let mut kept: Vec<Edge> = Vec::new();

    for (_, is_start, idx) in evs {
      if !is_start {
        let n = node_of[idx as usize];
        rb.remove(&mut root, n);
        rb.release(n);
        node_of[idx as usize] = NodeId::NIL;
        continue;
      }
      let entry = ReduceEntry {
        edge: idx,
        below: MemberMask::EMPTY,
      };
      let node = rb.alloc(entry);
      let edges_ref = &edges[..];
      rb.insert_by(&mut root, node, |a, b| {
        edge_order(edges_ref, a.edge, b.edge)
      });
      node_of[idx as usize] = node;
      let below = {
        let pred = rb.prev(node);
        if pred.is_nil() {
          MemberMask::EMPTY
        } else {
          let pe = rb.item(pred);
          pe.below ^ edges[pe.edge as usize].members
        }
      };
      rb.item_mut(node).below = below;

      let e = &edges[idx as usize];
      let lo = below;
      let hi = below ^ e.members;
      let inside_right = table.get(lo);
      let inside_left = table.get(hi);
      if inside_right != inside_left {
        if inside_left {
          kept.push(Edge::new(e.a, e.b, e.members));
        } else {
          kept.push(Edge::new(e.b, e.a, e.members));
        }
      }
    }
    debug_assert!(root.is_nil());
    self.out = kept;
  }
}
