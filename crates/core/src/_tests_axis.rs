#![cfg(test)]

use super::axis::Axis;

#[test]
fn delta_spans_bounds_over_count_minus_one() {
    let axis = Axis::new(16, 0.0, 15.0, 1.0);
    assert!((axis.delta() - 1.0).abs() < 1e-12);

    let axis = Axis::new(11, -1.0, 1.0, 2.5);
    assert!((axis.delta() - 0.2).abs() < 1e-12);
}

#[test]
fn value_walks_from_lower_bound() {
    let axis = Axis::new(5, -2.0, 2.0, 1.0);
    assert!((axis.value(0) - (-2.0)).abs() < 1e-12);
    assert!((axis.value(2) - 0.0).abs() < 1e-12);
    assert!((axis.value(4) - 2.0).abs() < 1e-12);
}

#[test]
fn wake_axis_spacing_matches_mesh_spacing() {
    // a wake axis over 2·cells bins spanning [-delta·cells, delta·(cells-1)]
    // has exactly the mesh spacing between samples
    let cells = 8usize;
    let delta = 0.125;
    let axis = Axis::new(
        2 * cells,
        -delta * cells as f64,
        delta * (cells as f64 - 1.0),
        1.0,
    );
    assert!((axis.delta() - delta).abs() < 1e-12);
    // the sample at index `cells` sits at zero
    assert!(axis.value(cells).abs() < 1e-12);
}

#[test]
#[should_panic(expected = "ordered")]
fn unordered_bounds_are_rejected() {
    let _ = Axis::new(4, 1.0, 1.0, 1.0);
}
