//! End-to-end boolean scenarios through the public API.

use claims::assert_ok;

use polybool2d::{BoolTable, Loc, MemberMask, Pool, Sweep, TriOutline, Vec2};

fn add_path(s: &mut Sweep<'_>, pts: &[(i32, i32)], mask: u32) {
  for i in 0..pts.len() {
    let a = pts[i];
    let b = pts[(i + 1) % pts.len()];
    assert_ok!(s.add_edge(a.into(), b.into(), MemberMask(mask)));
  }
}

#[test]
fn union_of_two_axis_aligned_squares() {
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::new("union.scad", 1), 8);
  add_path(&mut s, &[(0, 0), (100, 0), (100, 100), (0, 100)], 1);
  add_path(&mut s, &[(50, 50), (150, 50), (150, 150), (50, 150)], 2);
  assert_ok!(s.intersect());
  assert_ok!(s.reduce(&BoolTable::union2()));

  let tris = s.into_triangles().unwrap();
  assert_eq!(tris.triangles.len(), 6);
  assert_eq!(tris.signed_area_2x(), 2 * (100 * 100 + 100 * 100 - 50 * 50));

  // and the path form: one 8-vertex loop
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 8);
  add_path(&mut s, &[(0, 0), (100, 0), (100, 100), (0, 100)], 1);
  add_path(&mut s, &[(50, 50), (150, 50), (150, 150), (50, 150)], 2);
  assert_ok!(s.reduce(&BoolTable::union2()));
  let poly = s.into_polygon().unwrap();
  assert_eq!(poly.paths.len(), 1);
  assert_eq!(poly.paths[0].len(), 8);
  assert_eq!(poly.signed_area_2x(), 2 * 17_500);
}

#[test]
fn intersection_of_triangles_sharing_an_edge() {
  // the triangles touch along (0,0)--(10,0) and lie on opposite sides,
  // so the intersection collapses to that segment: an empty polygon
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 8);
  add_path(&mut s, &[(0, 0), (10, 0), (0, 10)], 1);
  add_path(&mut s, &[(0, 0), (10, 0), (5, -5)], 2);
  assert_ok!(s.intersect());
  assert_ok!(s.reduce(&BoolTable::intersection2()));
  assert!(s.is_empty());
  let poly = s.into_polygon().unwrap();
  assert!(poly.paths.is_empty());
}

#[test]
fn xor_of_a_square_with_its_exact_self() {
  let square = [(0, 0), (100, 0), (100, 100), (0, 100)];
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 8);
  add_path(&mut s, &square, 1);
  add_path(&mut s, &square, 2);
  assert_ok!(s.reduce(&BoolTable::xor2()));
  let tris = s.into_triangles().unwrap();
  assert_eq!(tris.signed_area_2x(), 0);
  assert!(tris.triangles.is_empty());

  // the same under a single mask and the even-odd rule
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 8);
  add_path(&mut s, &square, 1);
  add_path(&mut s, &square, 1);
  assert_ok!(s.reduce(&BoolTable::even_odd(1)));
  assert!(s.into_polygon().unwrap().is_empty());
}

#[test]
fn self_intersecting_bowtie() {
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 4);
  add_path(&mut s, &[(0, 0), (10, 10), (10, 0), (0, 10)], 1);
  assert_ok!(s.intersect());
  assert_ok!(s.reduce(&BoolTable::even_odd(1)));
  let poly = s.into_polygon().unwrap();

  // the crossing vertex lands exactly on the grid
  assert!(poly.points.contains(&Vec2::new(5, 5)));
  assert_eq!(poly.paths.len(), 2);
  for i in 0..2 {
    assert_eq!(poly.paths[i].len(), 3);
    assert_eq!(poly.path_signed_area_2x(i), 50);
  }
}

#[test]
fn collinear_overlap_of_a_subdivided_edge() {
  let square = [(0, 0), (100, 0), (100, 100), (0, 100)];
  let b_points = [
    (0, 0),
    (30, 0),
    (70, 0),
    (100, 0),
    (100, 100),
    (0, 100),
  ];

  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 16);
  add_path(&mut s, &square, 1);
  add_path(&mut s, &b_points, 2);
  assert_ok!(s.reduce(&BoolTable::union2()));
  let poly = s.into_polygon().unwrap();
  assert_eq!(poly.signed_area_2x(), 2 * 100 * 100);
  assert_eq!(poly.paths.len(), 1);

  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 16);
  add_path(&mut s, &square, 1);
  add_path(&mut s, &b_points, 2);
  assert_ok!(s.reduce(&BoolTable::xor2()));
  assert!(s.into_polygon().unwrap().is_empty());
}

#[test]
fn hole_in_a_square() {
  let mut pool = Pool::new();
  let mut s = Sweep::new(&mut pool, Loc::default(), 8);
  // outer counter-clockwise, inner clockwise, both part of polygon 0
  add_path(&mut s, &[(0, 0), (100, 0), (100, 100), (0, 100)], 1);
  add_path(&mut s, &[(20, 20), (20, 80), (80, 80), (80, 20)], 1);
  assert_ok!(s.reduce(&BoolTable::even_odd(1)));
  let tris = s.into_triangles().unwrap();

  // triangles cover exactly the annulus
  assert_eq!(tris.signed_area_2x(), 2 * (100 * 100 - 60 * 60));

  // the outline flags mark exactly the 8 outline edges
  let mut flagged: Vec<(usize, usize)> = Vec::new();
  for t in &tris.triangles {
    for (k, fl) in [
      TriOutline::EDGE_01,
      TriOutline::EDGE_12,
      TriOutline::EDGE_20,
    ]
    .iter()
    .enumerate()
    {
      let a = t.idx[k];
      let b = t.idx[(k + 1) % 3];
      let key = (a.min(b), a.max(b));
      if t.outline.contains(*fl) {
        flagged.push(key);
      }
    }
  }
  flagged.sort_unstable();
  flagged.dedup();
  assert_eq!(flagged.len(), 8);
}

#[test]
fn strict_mode_reports_empty_results() {
  use polybool2d::{Error, SweepOptions};
  let options = SweepOptions {
    strict: true,
    ..SweepOptions::default()
  };

  let mut pool = Pool::new();
  let mut s = Sweep::with_options(&mut pool, Loc::default(), 0, options.clone());
  assert!(matches!(
    s.reduce(&BoolTable::even_odd(1)),
    Err(Error::EmptyInput { .. })
  ));

  let square = [(0, 0), (100, 0), (100, 100), (0, 100)];
  let mut pool = Pool::new();
  let mut s = Sweep::with_options(&mut pool, Loc::default(), 8, options);
  add_path(&mut s, &square, 1);
  add_path(&mut s, &square, 2);
  assert_ok!(s.reduce(&BoolTable::xor2()));
  assert!(matches!(
    s.into_polygon(),
    Err(Error::CollapsedOutput { .. })
  ));
}
