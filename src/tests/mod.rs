use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::{
  segment_intersections_naive, BoolTable, Edge, Loc, MemberMask, Pool, Sweep, TriSet, Vec2,
};

fn add_path(s: &mut Sweep<'_>, pts: &[(i32, i32)], mask: u32) {
  for i in 0..pts.len() {
    let a = pts[i];
    let b = pts[(i + 1) % pts.len()];
    s.add_edge(a.into(), b.into(), MemberMask(mask)).unwrap();
  }
}

fn intersect_edges(edges: &[((i32, i32), (i32, i32), u32)]) -> Vec<Edge> {
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), edges.len());
  for &(a, b, m) in edges {
    s.add_edge(a.into(), b.into(), MemberMask(m)).unwrap();
  }
  s.intersect().unwrap();
  s.edges().to_vec()
}

fn reduce_paths(paths: &[(&[(i32, i32)], u32)], table: &BoolTable) -> Vec<Edge> {
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 32);
  for &(p, m) in paths {
    add_path(&mut s, p, m);
  }
  s.intersect().unwrap();
  s.reduce(table).unwrap();
  s.edges().to_vec()
}

fn canonical_triangles(t: &TriSet) -> Vec<[Vec2; 3]> {
  let mut tris: Vec<[Vec2; 3]> = t
    .triangles
    .iter()
    .map(|tr| {
      let mut pts = tr.idx.map(|i| t.points[i]);
      pts.sort();
      pts
    })
    .collect();
  tris.sort();
  tris
}

fn undirected(edges: &[Edge]) -> BTreeSet<(Vec2, Vec2)> {
  edges.iter().map(|e| e.sorted()).collect()
}

const SQUARE_A: [(i32, i32); 4] = [(0, 0), (100, 0), (100, 100), (0, 100)];
const SQUARE_B: [(i32, i32); 4] = [(50, 50), (150, 50), (150, 150), (50, 150)];

#[test]
fn intersect_output_is_interior_disjoint() {
  let mut rng = SmallRng::seed_from_u64(42);
  for _ in 0..40 {
    let n = rng.gen_range(2..14);
    let mut input = Vec::new();
    for _ in 0..n {
      let a = (rng.gen_range(-40..40), rng.gen_range(-40..40));
      let b = (rng.gen_range(-40..40), rng.gen_range(-40..40));
      let m = 1u32 << rng.gen_range(0..3);
      input.push((a, b, m));
    }
    let out = intersect_edges(&input);
    assert_eq!(
      segment_intersections_naive(&out),
      vec![],
      "input: {:?}",
      input
    );
  }
}

#[test]
fn intersect_preserves_mask_parity_on_vertical_lines() {
  // the XOR of masks crossing any vertical line is invariant
  let input = [
    ((0, 0), (100, 0), 1u32),
    ((0, 0), (100, 100), 2),
    ((0, 100), (100, 0), 2),
    ((0, 0), (100, 0), 4),
  ];
  let out = intersect_edges(&input);
  let xor_at = |edges: &[Edge], x2: i64| {
    let mut m = 0u32;
    for e in edges {
      let (a, b) = (e.a, e.b);
      // crossing test against the vertical line x = x2/2
      if (2 * a.x as i64) < x2 && x2 < (2 * b.x as i64) {
        m ^= e.members.0;
      }
    }
    m
  };
  let inp: Vec<Edge> = input
    .iter()
    .map(|&(a, b, m)| Edge::new(a.into(), b.into(), MemberMask(m)))
    .map(|e| {
      let (a, b) = e.sorted();
      Edge::new(a, b, e.members)
    })
    .collect();
  for x2 in [1, 51, 99, 151, 199] {
    assert_eq!(xor_at(&out, x2), xor_at(&inp, x2));
  }
}

#[test]
fn reduced_edges_have_even_vertex_degree() {
  let edges = reduce_paths(
    &[(&SQUARE_A, 1), (&SQUARE_B, 2)],
    &BoolTable::union2(),
  );
  let mut degree: BTreeMap<Vec2, usize> = BTreeMap::new();
  for e in &edges {
    *degree.entry(e.a).or_default() += 1;
    *degree.entry(e.b).or_default() += 1;
  }
  assert!(!degree.is_empty());
  for (p, d) in degree {
    assert_eq!(d % 2, 0, "odd degree at {}", p);
  }
}

#[test]
fn input_order_does_not_change_the_result() {
  let mut base: Vec<((i32, i32), (i32, i32), u32)> = Vec::new();
  for i in 0..4 {
    base.push((SQUARE_A[i], SQUARE_A[(i + 1) % 4], 1));
    base.push((SQUARE_B[i], SQUARE_B[(i + 1) % 4], 2));
  }
  base.push(((20, 120), (90, 120), 1));
  base.push(((90, 120), (20, 180), 1));
  base.push(((20, 180), (20, 120), 1));

  let run = |edges: &[((i32, i32), (i32, i32), u32)]| {
    let mut pool = Pool::new();
    let mut s = Sweep::new(&mut pool, Loc::default(), edges.len());
    for &(a, b, m) in edges {
      s.add_edge(a.into(), b.into(), MemberMask(m)).unwrap();
    }
    s.reduce(&BoolTable::union2()).unwrap();
    let edges = s.edges().to_vec();
    let tris = s.into_triangles().unwrap();
    (undirected(&edges), canonical_triangles(&tris))
  };

  let (edges0, tris0) = run(&base);
  let mut rng = SmallRng::seed_from_u64(7);
  for _ in 0..8 {
    let mut shuffled = base.clone();
    shuffled.shuffle(&mut rng);
    let (edges1, tris1) = run(&shuffled);
    assert_eq!(edges0, edges1);
    assert_eq!(tris0, tris1);
  }
}

#[test]
fn reduce_is_a_fixed_point() {
  let reduced = reduce_paths(&[(&SQUARE_A, 1), (&SQUARE_B, 2)], &BoolTable::union2());

  // the reduced boundary, taken as a single polygon, reduces to itself
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), reduced.len());
  for e in &reduced {
    s.add_edge(e.a, e.b, MemberMask::bit(0)).unwrap();
  }
  s.reduce(&BoolTable::even_odd(1)).unwrap();
  assert_eq!(undirected(s.edges()), undirected(&reduced));
}

#[test]
fn simple_polygon_round_trips() {
  let concave: [(i32, i32); 8] = [
    (0, 0),
    (40, 0),
    (40, 30),
    (25, 30),
    (25, 15),
    (10, 15),
    (10, 30),
    (0, 30),
  ];
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 8);
  add_path(&mut s, &concave, 1);
  s.reduce(&BoolTable::even_odd(1)).unwrap();
  let poly = s.into_polygon().unwrap();
  assert_eq!(poly.paths.len(), 1);
  assert_eq!(poly.paths[0].len(), 8);
  let got: BTreeSet<Vec2> = poly.points.iter().copied().collect();
  let want: BTreeSet<Vec2> = concave.iter().map(|&p| p.into()).collect();
  assert_eq!(got, want);
  // CCW outer loop
  let mut area2 = 0i64;
  for i in 0..8 {
    let (px, py) = concave[i];
    let (qx, qy) = concave[(i + 1) % 8];
    area2 += (px as i64) * (qy as i64) - (qx as i64) * (py as i64);
  }
  assert_eq!(poly.signed_area_2x(), area2);
}

#[test]
fn triangulation_area_matches_polygon_area() {
  let cases: Vec<Vec<(&[(i32, i32)], u32)>> = vec![
    vec![(&SQUARE_A, 1)],
    vec![(&SQUARE_A, 1), (&SQUARE_B, 2)],
  ];
  for paths in cases {
    let mut pool = Pool::new();
    let mut s = Sweep::new(&mut pool, Loc::default(), 16);
    for &(p, m) in &paths {
      add_path(&mut s, p, m);
    }
    let inputs = paths.iter().map(|&(_, m)| m).fold(0, |a, m| a | m);
    let table = BoolTable::from_fn(3, |mask| mask.0 & inputs != 0);
    s.reduce(&table).unwrap();
    let area = {
      let mut pool2 = Pool::new();
      let mut s2 = Sweep::new(&mut pool2, Loc::default(), 16);
      for &(p, m) in &paths {
        add_path(&mut s2, p, m);
      }
      s2.reduce(&table).unwrap();
      s2.into_polygon().unwrap().signed_area_2x()
    };
    let tris = s.into_triangles().unwrap();
    assert_eq!(tris.signed_area_2x(), area);
  }
}

#[test]
fn pool_is_reusable_across_sweeps() {
  let mut pool = Pool::new();
  for _ in 0..3 {
    let mut s = Sweep::new(&mut pool, Loc::default(), 8);
    add_path(&mut s, &SQUARE_A, 1);
    s.reduce(&BoolTable::even_odd(1)).unwrap();
    let poly = s.into_polygon().unwrap();
    assert_eq!(poly.signed_area_2x(), 20_000);
  }
}

#[test]
fn add_sweep_cascades_boolean_stages() {
  let mut pool_a = Pool::new();
  let mut stage_a = Sweep::new(&mut pool_a, Loc::default(), 8);
  add_path(&mut stage_a, &SQUARE_A, 1);
  add_path(&mut stage_a, &SQUARE_B, 2);
  stage_a.reduce(&BoolTable::union2()).unwrap();

  // subtract a square bite from the union in a second stage
  let bite: [(i32, i32); 4] = [(60, 60), (140, 60), (140, 140), (60, 140)];
  let mut pool_b = Pool::new();
  let mut stage_b = Sweep::new(&mut pool_b, Loc::default(), 16);
  stage_b.add_sweep(&stage_a, MemberMask::bit(0)).unwrap();
  add_path(&mut stage_b, &bite, 2);
  stage_b.reduce(&BoolTable::difference2()).unwrap();
  let poly = stage_b.into_polygon().unwrap();
  // the bite lies entirely inside the union, so it becomes a hole
  assert_eq!(poly.paths.len(), 2);
  assert_eq!(poly.signed_area_2x(), 2 * 17_500 - 2 * 80 * 80);
  let tri = crate::triangulate(&poly);
  assert_eq!(tri.signed_area_2x(), poly.signed_area_2x());
}
